//! Text output for scan pages, scan streams and `exec` replies.

use std::io::{self, Write};

use crate::decode::{Decode, Decoded};
use crate::error::Result;
use crate::pager::{ScanItem, ScanPage};
use crate::reply::Reply;

pub const NO_RESULTS: &str = "(no results)";

pub fn write_item<W: Write>(out: &mut W, index: usize, item: &ScanItem) -> io::Result<()> {
    match item {
        ScanItem::Key(value) | ScanItem::Member(value) => writeln!(out, "{}) {}", index, value),
        ScanItem::Field { field, value } => writeln!(out, "{}) {} => {}", index, field, value),
        ScanItem::Scored { member, score } => {
            writeln!(out, "{}) {} (score={})", index, member, format_score(*score))
        }
    }
}

/// Scores the way the server prints them: shortest round-trip digits, with
/// an exponent (`1e+21`, `1e-7`) outside `[1e-6, 1e21)`.
pub fn format_score(score: f64) -> String {
    let magnitude = score.abs();
    if !score.is_finite() || magnitude == 0.0 || (1e-6..1e21).contains(&magnitude) {
        return score.to_string();
    }
    let sci = format!("{:e}", score);
    match sci.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
        _ => sci,
    }
}

/// `[label] cursor=N` followed by the numbered items, or [`NO_RESULTS`].
pub fn write_page<W: Write>(
    out: &mut W,
    label: &str,
    page: &ScanPage<Decoded>,
) -> io::Result<()> {
    writeln!(out, "[{}] cursor={}", label, page.cursor)?;
    if page.items.is_empty() {
        return writeln!(out, "{}", NO_RESULTS);
    }
    for (i, item) in page.items.iter().enumerate() {
        write_item(out, i + 1, item)?;
    }
    Ok(())
}

/// Print items as the traversal produces them. On a failed fetch the items
/// already printed stay on the output and the error is returned. A reader
/// that closes the pipe ends the traversal without error.
///
/// Returns the number of items written.
pub fn write_stream<W, I>(out: &mut W, items: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = Result<ScanItem>>,
{
    let mut written = 0;
    for item in items {
        let item = item?;
        let shown = write_item(out, written + 1, &item);
        match shown.and_then(|()| out.flush()) {
            Ok(()) => written += 1,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!(items = written, "output closed, stopping traversal");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(written)
}

/// Arrays print one numbered line per element, anything else on one line.
pub fn write_reply<W: Write>(out: &mut W, reply: &Reply) -> io::Result<()> {
    match reply.decode() {
        Decoded::List(items) => {
            for (i, item) in items.iter().enumerate() {
                writeln!(out, "{}) {}", i + 1, item)?;
            }
            Ok(())
        }
        other => writeln!(out, "{}", other),
    }
}
