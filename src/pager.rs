//! Cursor-driven pagination shared by every SCAN-family command.
//!
//! A cursor of `0` starts an iteration, and a returned cursor of `0` ends it.
//! Any other value means "call again with this cursor". The store makes no
//! atomicity promise: if the keyspace changes during a traversal, an item may
//! be returned zero, one, or several times. [`ScanIter`] passes that through
//! unchanged rather than deduplicating.

use std::collections::VecDeque;
use std::iter::FusedIterator;

use crate::decode::{decode_bytes, Decoded};
use crate::error::Result;

pub const DEFAULT_PATTERN: &str = "*";
pub const DEFAULT_COUNT: usize = 100;

/// Parameters forwarded to the store on every page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Glob pattern, applied server-side.
    pub pattern: String,
    /// Page size hint. The store may return more or fewer items.
    pub count: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            count: DEFAULT_COUNT,
        }
    }
}

impl ScanOptions {
    pub fn new(pattern: impl Into<String>, count: usize) -> Self {
        Self {
            pattern: pattern.into(),
            count,
        }
    }
}

/// One item of a page, tagged by the adapter that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanItem<V = Decoded> {
    /// A key from a keyspace scan.
    Key(V),
    /// A field and its value from a hash scan.
    Field { field: V, value: V },
    /// A set member, or a sorted-set member listed without its score.
    Member(V),
    /// A sorted-set member with its score.
    Scored { member: V, score: f64 },
}

impl<V> ScanItem<V> {
    pub fn map<U>(self, mut f: impl FnMut(V) -> U) -> ScanItem<U> {
        match self {
            ScanItem::Key(k) => ScanItem::Key(f(k)),
            ScanItem::Field { field, value } => ScanItem::Field {
                field: f(field),
                value: f(value),
            },
            ScanItem::Member(m) => ScanItem::Member(f(m)),
            ScanItem::Scored { member, score } => ScanItem::Scored {
                member: f(member),
                score,
            },
        }
    }
}

impl ScanItem<Vec<u8>> {
    pub fn decode(self) -> ScanItem<Decoded> {
        self.map(|bytes| decode_bytes(&bytes))
    }
}

/// Result of a single fetch: the items plus the cursor to resume from.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage<V = Vec<u8>> {
    pub cursor: u64,
    pub items: Vec<ScanItem<V>>,
}

impl<V> ScanPage<V> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when this page ends the iteration.
    pub fn is_last(&self) -> bool {
        self.cursor == 0
    }
}

impl ScanPage<Vec<u8>> {
    pub fn decode(self) -> ScanPage<Decoded> {
        ScanPage {
            cursor: self.cursor,
            items: self.items.into_iter().map(ScanItem::decode).collect(),
        }
    }
}

/// Something that can fetch one page at a given cursor.
pub trait FetchPage {
    fn fetch_page(&mut self, cursor: u64, options: &ScanOptions) -> Result<ScanPage>;
}

impl<F> FetchPage for F
where
    F: FnMut(u64, &ScanOptions) -> Result<ScanPage>,
{
    fn fetch_page(&mut self, cursor: u64, options: &ScanOptions) -> Result<ScanPage> {
        (*self)(cursor, options)
    }
}

/// Fetch exactly one page and return it as-is.
pub fn fetch_one_page<F: FetchPage>(
    mut source: F,
    cursor: u64,
    options: &ScanOptions,
) -> Result<ScanPage> {
    source.fetch_page(cursor, options)
}

/// Walk every page starting from cursor 0.
pub fn fetch_all<F: FetchPage>(source: F, options: ScanOptions) -> ScanIter<F> {
    ScanIter::new(source, options)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Exhausted,
    Failed,
}

/// Lazy traversal over all pages of a scan.
///
/// A page is only fetched once the items of the previous one have been
/// consumed, so dropping the iterator early skips the remaining round trips.
/// A fetch error is yielded once and ends the iteration; items yielded before
/// it stay valid. The iterator is not restartable.
pub struct ScanIter<F> {
    source: F,
    options: ScanOptions,
    cursor: u64,
    buffer: VecDeque<ScanItem<Vec<u8>>>,
    state: State,
    pages: usize,
}

impl<F: FetchPage> ScanIter<F> {
    pub fn new(source: F, options: ScanOptions) -> Self {
        Self::resume(source, 0, options)
    }

    /// Continue a traversal from a cursor observed earlier. If the keyspace
    /// changed in between, the usual scan guarantees no longer hold.
    pub fn resume(source: F, cursor: u64, options: ScanOptions) -> Self {
        Self {
            source,
            options,
            cursor,
            buffer: VecDeque::new(),
            state: State::Running,
            pages: 0,
        }
    }

    /// Cursor the next fetch will use, or `None` once the store has reported
    /// the end of the iteration (or a fetch failed).
    pub fn next_cursor(&self) -> Option<u64> {
        match self.state {
            State::Running => Some(self.cursor),
            State::Exhausted | State::Failed => None,
        }
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }
}

impl<F: FetchPage> Iterator for ScanIter<F> {
    type Item = Result<ScanItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item.decode()));
            }
            if self.state != State::Running {
                return None;
            }

            match self.source.fetch_page(self.cursor, &self.options) {
                Ok(page) => {
                    self.pages += 1;
                    tracing::debug!(
                        cursor = self.cursor,
                        next_cursor = page.cursor,
                        items = page.items.len(),
                        "fetched scan page"
                    );
                    self.cursor = page.cursor;
                    if page.is_last() {
                        self.state = State::Exhausted;
                    }
                    self.buffer.extend(page.items);
                }
                Err(e) => {
                    self.state = State::Failed;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<F: FetchPage> FusedIterator for ScanIter<F> {}
