//! Adapters binding SCAN, HSCAN, SSCAN and ZSCAN to the pager.
//!
//! Each adapter knows its command, its argument layout and the shape of the
//! items in its reply, and tags every item accordingly. Nothing downstream
//! guesses an item's kind from its shape.

use crate::error::{ClientError, Result};
use crate::pager::{fetch_one_page, FetchPage, ScanItem, ScanIter, ScanOptions, ScanPage};
use crate::reply::Reply;
use crate::transport::Transport;

/// What to iterate over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTarget {
    /// Every key of the selected database.
    Keyspace,
    /// Field/value pairs of one hash.
    Hash(String),
    /// Members of one set.
    Set(String),
    /// Members of one sorted set, optionally with their scores.
    SortedSet { key: String, with_scores: bool },
}

impl ScanTarget {
    pub fn label(&self) -> &'static str {
        match self {
            ScanTarget::Keyspace => "scan",
            ScanTarget::Hash(_) => "hscan",
            ScanTarget::Set(_) => "sscan",
            ScanTarget::SortedSet { .. } => "zscan",
        }
    }

    pub fn command(&self) -> &'static str {
        match self {
            ScanTarget::Keyspace => "SCAN",
            ScanTarget::Hash(_) => "HSCAN",
            ScanTarget::Set(_) => "SSCAN",
            ScanTarget::SortedSet { .. } => "ZSCAN",
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            ScanTarget::Keyspace => None,
            ScanTarget::Hash(key) | ScanTarget::Set(key) => Some(key),
            ScanTarget::SortedSet { key, .. } => Some(key),
        }
    }

    /// `[key] cursor MATCH pattern COUNT count`
    pub fn args(&self, cursor: u64, options: &ScanOptions) -> Vec<String> {
        let mut args = Vec::with_capacity(6);
        if let Some(key) = self.key() {
            args.push(key.to_string());
        }
        args.push(cursor.to_string());
        args.push("MATCH".to_string());
        args.push(options.pattern.clone());
        args.push("COUNT".to_string());
        args.push(options.count.to_string());
        args
    }

    /// Decode a `[cursor, [items...]]` reply into a tagged page.
    pub fn parse_page(&self, reply: Reply) -> Result<ScanPage> {
        let label = self.label();
        let Reply::Array(parts) = reply else {
            return Err(ClientError::protocol(format!(
                "{} returned {}, expected [cursor, items]",
                label,
                reply.kind()
            )));
        };
        let [cursor, items]: [Reply; 2] = parts.try_into().map_err(|parts: Vec<Reply>| {
            ClientError::protocol(format!(
                "{} returned {} elements, expected [cursor, items]",
                label,
                parts.len()
            ))
        })?;
        let cursor = parse_cursor(cursor)?;
        let Reply::Array(items) = items else {
            return Err(ClientError::protocol(format!(
                "{} items are {}, expected array",
                label,
                items.kind()
            )));
        };

        let items = match self {
            ScanTarget::Keyspace => singles(items, ScanItem::Key)?,
            ScanTarget::Set(_) => singles(items, ScanItem::Member)?,
            ScanTarget::Hash(_) => pairs(label, items)?
                .into_iter()
                .map(|(field, value)| {
                    Ok(ScanItem::Field {
                        field: bytes(field)?,
                        value: bytes(value)?,
                    })
                })
                .collect::<Result<_>>()?,
            ScanTarget::SortedSet { with_scores, .. } => pairs(label, items)?
                .into_iter()
                .map(|(member, score)| {
                    let member = bytes(member)?;
                    let score = parse_score(score)?;
                    Ok(if *with_scores {
                        ScanItem::Scored { member, score }
                    } else {
                        ScanItem::Member(member)
                    })
                })
                .collect::<Result<_>>()?,
        };

        Ok(ScanPage { cursor, items })
    }
}

/// One invocation of a scan command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub options: ScanOptions,
    /// Where a single-page fetch starts. Ignored when `auto` is set.
    pub cursor: u64,
    /// Follow cursors until the store reports the end.
    pub auto: bool,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            options: ScanOptions::default(),
            cursor: 0,
            auto: false,
        }
    }
}

/// Either one page, or a lazy walk over all pages.
pub enum Traversal<I> {
    Page(ScanPage),
    Stream(I),
}

/// A scan target bound to a transport.
pub struct Scanner<T> {
    transport: T,
    target: ScanTarget,
}

impl<T: Transport> Scanner<T> {
    pub fn new(transport: T, target: ScanTarget) -> Result<Self> {
        if let Some(key) = target.key() {
            if key.is_empty() {
                return Err(ClientError::usage(format!("{} requires a key", target.label())));
            }
        }
        if target == ScanTarget::Keyspace && transport.is_cluster() {
            return Err(ClientError::usage(
                "scan covers a single node in cluster mode; connect to a node directly",
            ));
        }
        Ok(Self { transport, target })
    }

    pub fn target(&self) -> &ScanTarget {
        &self.target
    }

    /// Walk every page from cursor 0.
    pub fn traverse(self, options: ScanOptions) -> ScanIter<Self> {
        ScanIter::new(self, options)
    }

    pub fn run(self, request: ScanRequest) -> Result<Traversal<ScanIter<Self>>> {
        if request.auto {
            Ok(Traversal::Stream(self.traverse(request.options)))
        } else {
            fetch_one_page(self, request.cursor, &request.options)
                .map(Traversal::Page)
        }
    }
}

impl<T: Transport> FetchPage for Scanner<T> {
    fn fetch_page(&mut self, cursor: u64, options: &ScanOptions) -> Result<ScanPage> {
        let args = self.target.args(cursor, options);
        let reply = self.transport.send_command(self.target.command(), &args)?;
        self.target.parse_page(reply)
    }
}

fn parse_cursor(reply: Reply) -> Result<u64> {
    match reply {
        Reply::Int(n) if n >= 0 => Ok(n as u64),
        Reply::Bytes(b) => parse_text(&b).ok_or_else(|| invalid("cursor", &b)),
        other => Err(ClientError::protocol(format!("cursor is {}", other.kind()))),
    }
}

fn parse_score(reply: Reply) -> Result<f64> {
    let raw = bytes(reply)?;
    parse_text::<f64>(&raw)
        .filter(|s| !s.is_nan())
        .ok_or_else(|| invalid("score", &raw))
}

fn parse_text<T: std::str::FromStr>(raw: &[u8]) -> Option<T> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

fn invalid(what: &str, raw: &[u8]) -> ClientError {
    let text = String::from_utf8_lossy(raw);
    ClientError::protocol(format!("invalid {} {:?}", what, text))
}

fn bytes(reply: Reply) -> Result<Vec<u8>> {
    match reply {
        Reply::Bytes(b) => Ok(b),
        Reply::Status(s) => Ok(s.into_bytes()),
        Reply::Int(n) => Ok(n.to_string().into_bytes()),
        other => Err(ClientError::protocol(format!(
            "scan item is {}, expected bulk string",
            other.kind()
        ))),
    }
}

fn singles(
    items: Vec<Reply>,
    tag: fn(Vec<u8>) -> ScanItem<Vec<u8>>,
) -> Result<Vec<ScanItem<Vec<u8>>>> {
    items.into_iter().map(|r| bytes(r).map(tag)).collect()
}

fn pairs(label: &str, items: Vec<Reply>) -> Result<Vec<(Reply, Reply)>> {
    if items.len() % 2 != 0 {
        return Err(ClientError::protocol(format!(
            "{} returned an odd number of elements ({})",
            label,
            items.len()
        )));
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(a), Some(b)) = (iter.next(), iter.next()) {
        out.push((a, b));
    }
    Ok(out)
}
