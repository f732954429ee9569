//! In-process keyspace that answers a subset of commands with the same reply
//! shapes a Redis server would send.
//!
//! SCAN-family cursors are offsets into the ordered element list. Each call
//! examines `COUNT` elements and then applies `MATCH` to that window, so a
//! page can come back empty while the cursor is still non-zero, just like on
//! a real server.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::ConnectionOptions;
use crate::error::{ClientError, Result};
use crate::render::format_score;
use crate::reply::Reply;
use crate::session::Connector;
use crate::transport::Transport;

const DEFAULT_SCAN_COUNT: usize = 10;

#[derive(Debug, Clone)]
enum Entry {
    Str(Vec<u8>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
    ZSet(BTreeMap<Vec<u8>, f64>),
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    keys: BTreeMap<Vec<u8>, Entry>,
    sent: usize,
    fail_after: Option<usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every command after the first `commands` fail, as if the
    /// connection dropped.
    pub fn fail_after(mut self, commands: usize) -> Self {
        self.fail_after = Some(commands);
        self
    }

    /// Commands received so far, including failed ones.
    pub fn commands_sent(&self) -> usize {
        self.sent
    }

    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.keys.insert(key.into(), Entry::Str(value.into()));
    }

    pub fn hset(
        &mut self,
        key: impl Into<Vec<u8>>,
        field: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Result<bool> {
        match self.entry_or(key.into(), || Entry::Hash(BTreeMap::new())) {
            Entry::Hash(fields) => Ok(fields.insert(field.into(), value.into()).is_none()),
            _ => Err(wrong_type()),
        }
    }

    pub fn sadd(&mut self, key: impl Into<Vec<u8>>, member: impl Into<Vec<u8>>) -> Result<bool> {
        match self.entry_or(key.into(), || Entry::Set(BTreeSet::new())) {
            Entry::Set(members) => Ok(members.insert(member.into())),
            _ => Err(wrong_type()),
        }
    }

    pub fn zadd(
        &mut self,
        key: impl Into<Vec<u8>>,
        score: f64,
        member: impl Into<Vec<u8>>,
    ) -> Result<bool> {
        match self.entry_or(key.into(), || Entry::ZSet(BTreeMap::new())) {
            Entry::ZSet(members) => Ok(members.insert(member.into(), score).is_none()),
            _ => Err(wrong_type()),
        }
    }

    fn entry_or(&mut self, key: Vec<u8>, empty: impl FnOnce() -> Entry) -> &mut Entry {
        self.keys.entry(key).or_insert_with(empty)
    }

    fn execute(&mut self, cmd: &str, args: &[&[u8]]) -> Result<Reply> {
        match cmd {
            "PING" => Ok(match args.first() {
                Some(msg) => Reply::bulk(msg.to_vec()),
                None => Reply::pong(),
            }),
            "ECHO" => {
                arity(cmd, args, 1)?;
                Ok(Reply::bulk(args[0].to_vec()))
            }
            "SET" => {
                arity(cmd, args, 2)?;
                self.set(args[0], args[1]);
                Ok(Reply::ok())
            }
            "GET" => {
                arity(cmd, args, 1)?;
                match self.keys.get(args[0]) {
                    None => Ok(Reply::Nil),
                    Some(Entry::Str(value)) => Ok(Reply::bulk(value.clone())),
                    Some(_) => Err(wrong_type()),
                }
            }
            "DEL" => {
                min_arity(cmd, args, 1)?;
                let removed = args
                    .iter()
                    .filter(|k| self.keys.remove(**k).is_some())
                    .count();
                Ok(Reply::Int(removed as i64))
            }
            "EXISTS" => {
                min_arity(cmd, args, 1)?;
                let found = args.iter().filter(|k| self.keys.contains_key(**k)).count();
                Ok(Reply::Int(found as i64))
            }
            "DBSIZE" => Ok(Reply::Int(self.keys.len() as i64)),
            "HSET" => {
                if args.len() < 3 || args.len() % 2 == 0 {
                    return Err(wrong_arity(cmd));
                }
                let mut added = 0;
                for pair in args[1..].chunks(2) {
                    if self.hset(args[0], pair[0], pair[1])? {
                        added += 1;
                    }
                }
                Ok(Reply::Int(added))
            }
            "HGETALL" => {
                arity(cmd, args, 1)?;
                match self.keys.get(args[0]) {
                    None => Ok(Reply::Array(Vec::new())),
                    Some(Entry::Hash(fields)) => {
                        let flat = fields.iter().flat_map(|(f, v)| bulk_pair(f, v));
                        Ok(Reply::Array(flat.collect()))
                    }
                    Some(_) => Err(wrong_type()),
                }
            }
            "SADD" => {
                min_arity(cmd, args, 2)?;
                let mut added = 0;
                for member in &args[1..] {
                    if self.sadd(args[0], *member)? {
                        added += 1;
                    }
                }
                Ok(Reply::Int(added))
            }
            "ZADD" => {
                if args.len() < 3 || args.len() % 2 == 0 {
                    return Err(wrong_arity(cmd));
                }
                let mut added = 0;
                for pair in args[1..].chunks(2) {
                    let score = std::str::from_utf8(pair[0])
                        .ok()
                        .and_then(|s| s.parse::<f64>().ok())
                        .filter(|s| !s.is_nan())
                        .ok_or_else(|| command_error("value is not a valid float"))?;
                    if self.zadd(args[0], score, pair[1])? {
                        added += 1;
                    }
                }
                Ok(Reply::Int(added))
            }
            "SCAN" => {
                let scan = ScanArgs::parse(args)?;
                let entries = self
                    .keys
                    .keys()
                    .map(|k| (k.clone(), vec![Reply::bulk(k.clone())]))
                    .collect();
                Ok(scan.page(entries))
            }
            "HSCAN" | "SSCAN" | "ZSCAN" => {
                min_arity(cmd, args, 2)?;
                let scan = ScanArgs::parse(&args[1..])?;
                let entries = match (cmd, self.keys.get(args[0])) {
                    (_, None) => Vec::new(),
                    ("HSCAN", Some(Entry::Hash(fields))) => fields
                        .iter()
                        .map(|(f, v)| (f.clone(), bulk_pair(f, v)))
                        .collect(),
                    ("SSCAN", Some(Entry::Set(members))) => members
                        .iter()
                        .map(|m| (m.clone(), vec![Reply::bulk(m.clone())]))
                        .collect(),
                    ("ZSCAN", Some(Entry::ZSet(members))) => members
                        .iter()
                        .map(|(m, score)| {
                            let score = format_score(*score);
                            (m.clone(), bulk_pair(m, score.as_bytes()))
                        })
                        .collect(),
                    _ => return Err(wrong_type()),
                };
                Ok(scan.page(entries))
            }
            _ => {
                let msg = format!("unknown command '{}'", cmd.to_lowercase());
                Err(command_error(msg))
            }
        }
    }
}

impl Transport for MemoryTransport {
    fn send_command(&mut self, name: &str, args: &[String]) -> Result<Reply> {
        self.sent += 1;
        if let Some(limit) = self.fail_after {
            if self.sent > limit {
                return Err(command_error("connection reset by peer"));
            }
        }

        tracing::trace!(command = name, args = args.len(), "memory transport");
        let cmd = name.to_uppercase();
        let args: Vec<&[u8]> = args.iter().map(|a| a.as_bytes()).collect();
        self.execute(&cmd, &args)
    }
}

/// Each connection gets a snapshot of the keyspace.
impl Connector for MemoryTransport {
    type Transport = MemoryTransport;

    fn connect(&mut self, _options: &ConnectionOptions) -> Result<Self::Transport> {
        Ok(self.clone())
    }
}

struct ScanArgs<'a> {
    cursor: usize,
    pattern: Option<&'a [u8]>,
    count: usize,
}

impl<'a> ScanArgs<'a> {
    fn parse(args: &[&'a [u8]]) -> Result<Self> {
        let cursor = args
            .first()
            .and_then(|c| std::str::from_utf8(c).ok())
            .and_then(|c| c.parse::<usize>().ok())
            .ok_or_else(|| command_error("invalid cursor"))?;

        let mut scan = ScanArgs {
            cursor,
            pattern: None,
            count: DEFAULT_SCAN_COUNT,
        };
        let mut i = 1;
        while i < args.len() {
            let opt = String::from_utf8_lossy(args[i]).to_uppercase();
            let value: &'a [u8] = *args.get(i + 1).ok_or_else(|| command_error("syntax error"))?;
            match opt.as_str() {
                "MATCH" => scan.pattern = Some(value),
                "COUNT" => {
                    scan.count = std::str::from_utf8(value)
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .filter(|c| *c > 0)
                        .ok_or_else(|| command_error("value is not an integer or out of range"))?;
                }
                _ => return Err(command_error("syntax error")),
            }
            i += 2;
        }
        Ok(scan)
    }

    /// `[next_cursor, [items...]]` for the window starting at the cursor.
    fn page(&self, entries: Vec<(Vec<u8>, Vec<Reply>)>) -> Reply {
        let start = self.cursor.min(entries.len());
        let end = start.saturating_add(self.count).min(entries.len());
        let next_cursor = if end >= entries.len() { 0 } else { end };

        let items: Vec<Reply> = entries
            .into_iter()
            .skip(start)
            .take(end - start)
            .filter(|(name, _)| self.matches(name))
            .flat_map(|(_, replies)| replies)
            .collect();

        Reply::Array(vec![
            Reply::bulk(next_cursor.to_string()),
            Reply::Array(items),
        ])
    }

    fn matches(&self, name: &[u8]) -> bool {
        self.pattern.map_or(true, |p| glob_match(p, name))
    }
}

fn bulk_pair(a: &[u8], b: &[u8]) -> Vec<Reply> {
    vec![Reply::bulk(a.to_vec()), Reply::bulk(b.to_vec())]
}

/// Redis-style glob: `*`, `?`, `[abc]`, `[^a-z]` and `\` escapes.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let mut p = 0;
    let mut t = 0;

    while p < pattern.len() {
        match pattern[p] {
            b'*' => {
                while p < pattern.len() && pattern[p] == b'*' {
                    p += 1;
                }
                if p == pattern.len() {
                    return true;
                }
                let rest = &pattern[p..];
                return (t..=text.len()).any(|i| glob_match(rest, &text[i..]));
            }
            b'?' => {
                if t >= text.len() {
                    return false;
                }
                t += 1;
                p += 1;
            }
            b'[' => {
                if t >= text.len() {
                    return false;
                }
                p += 1;
                let negate = p < pattern.len() && pattern[p] == b'^';
                if negate {
                    p += 1;
                }

                let ch = text[t];
                let mut found = false;
                while p < pattern.len() && pattern[p] != b']' {
                    if pattern[p] == b'\\' && p + 1 < pattern.len() {
                        found |= pattern[p + 1] == ch;
                        p += 2;
                    } else if is_range(pattern, p) {
                        let (lo, hi) = if pattern[p] <= pattern[p + 2] {
                            (pattern[p], pattern[p + 2])
                        } else {
                            (pattern[p + 2], pattern[p])
                        };
                        found |= lo <= ch && ch <= hi;
                        p += 3;
                    } else {
                        found |= pattern[p] == ch;
                        p += 1;
                    }
                }
                if found == negate {
                    return false;
                }
                if p < pattern.len() {
                    p += 1;
                }
                t += 1;
            }
            b'\\' if p + 1 < pattern.len() => {
                if t >= text.len() || text[t] != pattern[p + 1] {
                    return false;
                }
                t += 1;
                p += 2;
            }
            c => {
                if t >= text.len() || text[t] != c {
                    return false;
                }
                t += 1;
                p += 1;
            }
        }
    }

    t == text.len()
}

/// `a-z` starting at `p`, where the upper bound is not the closing bracket.
fn is_range(pattern: &[u8], p: usize) -> bool {
    p + 2 < pattern.len() && pattern[p + 1] == b'-' && pattern[p + 2] != b']'
}

fn command_error(msg: impl Into<String>) -> ClientError {
    ClientError::Command(format!("ERR {}", msg.into()))
}

fn wrong_type() -> ClientError {
    ClientError::Command(
        "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    )
}

fn wrong_arity(cmd: &str) -> ClientError {
    command_error(format!(
        "wrong number of arguments for '{}' command",
        cmd.to_lowercase()
    ))
}

fn arity(cmd: &str, args: &[&[u8]], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(wrong_arity(cmd));
    }
    Ok(())
}

fn min_arity(cmd: &str, args: &[&[u8]], n: usize) -> Result<()> {
    if args.len() < n {
        return Err(wrong_arity(cmd));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(t: &mut MemoryTransport, parts: &[&str]) -> Result<Reply> {
        let args: Vec<String> = parts[1..].iter().map(|s| s.to_string()).collect();
        t.send_command(parts[0], &args)
    }

    fn scan_reply(cursor: &str, items: &[&str]) -> Reply {
        let items = Reply::array(items.iter().copied());
        Reply::Array(vec![Reply::bulk(cursor), items])
    }

    #[test]
    fn test_glob_match_exact() {
        assert!(glob_match(b"events", b"events"));
        assert!(!glob_match(b"events", b"other"));
    }

    #[test]
    fn test_glob_match_wildcard() {
        assert!(glob_match(b"events.*", b"events.login"));
        assert!(!glob_match(b"events.*", b"other.login"));
        assert!(glob_match(b"*", b""));
        assert!(glob_match(b"*.*.*", b"a.b.c"));
        assert!(glob_match(b"user:*:name", b"user:42:name"));
        assert!(!glob_match(b"user:*:name", b"user:42:age"));
    }

    #[test]
    fn test_glob_match_question() {
        assert!(glob_match(b"events?", b"events1"));
        assert!(!glob_match(b"events?", b"events12"));
        assert!(!glob_match(b"events?", b"events"));
    }

    #[test]
    fn test_glob_match_classes() {
        assert!(glob_match(b"h[ae]llo", b"hello"));
        assert!(glob_match(b"h[ae]llo", b"hallo"));
        assert!(!glob_match(b"h[ae]llo", b"hillo"));
        assert!(glob_match(b"h[^e]llo", b"hallo"));
        assert!(!glob_match(b"h[^e]llo", b"hello"));
        assert!(glob_match(b"key[0-9]", b"key7"));
        assert!(!glob_match(b"key[0-9]", b"keyx"));
    }

    #[test]
    fn test_glob_match_escape() {
        assert!(glob_match(b"a\\*b", b"a*b"));
        assert!(!glob_match(b"a\\*b", b"axb"));
    }

    #[test]
    fn test_basic_commands() {
        let mut t = MemoryTransport::new();
        assert_eq!(send(&mut t, &["PING"]).unwrap(), Reply::pong());
        assert_eq!(send(&mut t, &["set", "foo", "bar"]).unwrap(), Reply::ok());
        assert_eq!(send(&mut t, &["GET", "foo"]).unwrap(), Reply::bulk("bar"));
        assert_eq!(send(&mut t, &["GET", "nope"]).unwrap(), Reply::Nil);
        assert_eq!(send(&mut t, &["DBSIZE"]).unwrap(), Reply::Int(1));
        assert_eq!(send(&mut t, &["DEL", "foo", "x"]).unwrap(), Reply::Int(1));
        assert_eq!(t.commands_sent(), 6);
    }

    #[test]
    fn test_unknown_command() {
        let mut t = MemoryTransport::new();
        let err = send(&mut t, &["FROB"]).unwrap_err();
        assert_eq!(err.to_string(), "ERR unknown command 'frob'");
    }

    #[test]
    fn test_wrong_type() {
        let mut t = MemoryTransport::new();
        t.set("s", "v");
        let err = send(&mut t, &["HSCAN", "s", "0"]).unwrap_err();
        assert!(err.to_string().starts_with("WRONGTYPE"));
    }

    #[test]
    fn test_scan_windows_then_filters() {
        let mut t = MemoryTransport::new();
        for k in ["a1", "b1", "a2", "b2", "a3"] {
            t.set(k, "v");
        }
        // sorted keyspace: a1 a2 a3 b1 b2
        assert_eq!(
            send(&mut t, &["SCAN", "0", "COUNT", "2"]).unwrap(),
            scan_reply("2", &["a1", "a2"])
        );
        assert_eq!(
            send(&mut t, &["SCAN", "2", "MATCH", "b*", "COUNT", "2"]).unwrap(),
            scan_reply("4", &["b1"])
        );
        assert_eq!(
            send(&mut t, &["SCAN", "0", "MATCH", "b*", "COUNT", "2"]).unwrap(),
            scan_reply("2", &[])
        );
        assert_eq!(
            send(&mut t, &["SCAN", "4", "COUNT", "2"]).unwrap(),
            scan_reply("0", &["b2"])
        );
    }

    #[test]
    fn test_scan_rejects_bad_arguments() {
        let mut t = MemoryTransport::new();
        assert!(send(&mut t, &["SCAN", "abc"]).is_err());
        assert!(send(&mut t, &["SCAN", "0", "COUNT", "0"]).is_err());
        assert!(send(&mut t, &["SCAN", "0", "MATCH"]).is_err());
        assert!(send(&mut t, &["SCAN", "0", "LIMIT", "3"]).is_err());
    }

    #[test]
    fn test_hscan_flat_pairs() {
        let mut t = MemoryTransport::new();
        send(&mut t, &["HSET", "h", "f1", "v1", "f2", "v2"]).unwrap();
        assert_eq!(
            send(&mut t, &["HSCAN", "h", "0"]).unwrap(),
            scan_reply("0", &["f1", "v1", "f2", "v2"])
        );
    }

    #[test]
    fn test_zscan_scores_as_strings() {
        let mut t = MemoryTransport::new();
        send(&mut t, &["ZADD", "z", "1.5", "m1", "20", "m2"]).unwrap();
        assert_eq!(
            send(&mut t, &["ZSCAN", "z", "0", "MATCH", "m*"]).unwrap(),
            scan_reply("0", &["m1", "1.5", "m2", "20"])
        );
    }

    #[test]
    fn test_zscan_large_score_uses_exponent() {
        let mut t = MemoryTransport::new();
        t.zadd("z", 1e21, "big").unwrap();
        assert_eq!(
            send(&mut t, &["ZSCAN", "z", "0"]).unwrap(),
            scan_reply("0", &["big", "1e+21"])
        );
    }

    #[test]
    fn test_scan_missing_key_is_empty() {
        let mut t = MemoryTransport::new();
        assert_eq!(
            send(&mut t, &["SSCAN", "nothing", "0"]).unwrap(),
            scan_reply("0", &[])
        );
    }

    #[test]
    fn test_fail_after() {
        let mut t = MemoryTransport::new().fail_after(1);
        assert!(send(&mut t, &["PING"]).is_ok());
        assert!(send(&mut t, &["PING"]).is_err());
    }
}
