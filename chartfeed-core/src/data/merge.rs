//! Bar merge and de-duplication.
//!
//! A loaded window is strictly ascending by timestamp. Fetched batches arrive
//! unordered and may overlap what is already loaded; the existing entry
//! always wins so re-fetching the same range is idempotent.

use super::provider::RawBar;
use super::range::TimeBounds;
use crate::domain::Bar;
use std::cmp::Ordering;

/// Result of merging a batch into a window.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub bars: Vec<Bar>,
    /// Bars in `bars` that were not already in the window.
    pub added: usize,
}

impl MergeOutcome {
    /// Zero new unique bars: the consumer has reached the end of history.
    pub fn is_exhausted(&self) -> bool {
        self.added == 0
    }
}

/// Parse raw bars, dropping bad timestamps and malformed OHLC, then bound,
/// sort and de-dup.
pub fn normalize(raw: &[RawBar], bounds: &TimeBounds) -> Vec<Bar> {
    let bars: Vec<Bar> = raw
        .iter()
        .filter_map(RawBar::parse)
        .filter(Bar::is_sane)
        .collect();
    sort_dedup(bars, bounds)
}

/// Bound, sort ascending and de-dup an unordered batch (first occurrence wins).
pub fn sort_dedup(mut bars: Vec<Bar>, bounds: &TimeBounds) -> Vec<Bar> {
    bounds.retain(&mut bars);
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    bars
}

/// Build a fresh window from an initial batch.
pub fn merge_initial(batch: Vec<Bar>, bounds: &TimeBounds) -> Vec<Bar> {
    sort_dedup(batch, bounds)
}

/// Union `batch` into the ascending `existing` window by timestamp.
///
/// In the backward-scroll case every new bar is older than the window and the
/// result is the new bars prepended; overlapping or interleaved batches are
/// handled by a two-way merge.
pub fn merge_bars(existing: &[Bar], batch: Vec<Bar>, bounds: &TimeBounds) -> MergeOutcome {
    let fresh: Vec<Bar> = sort_dedup(batch, bounds)
        .into_iter()
        .filter(|b| {
            existing
                .binary_search_by_key(&b.timestamp, |e| e.timestamp)
                .is_err()
        })
        .collect();
    let added = fresh.len();

    let mut bars = Vec::with_capacity(existing.len() + added);
    let mut old = existing
        .iter()
        .filter(|b| bounds.contains(b.timestamp))
        .peekable();
    let mut new = fresh.into_iter().peekable();

    loop {
        let take_old = match (old.peek(), new.peek()) {
            (None, None) => break,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(o), Some(n)) => o.timestamp.cmp(&n.timestamp) != Ordering::Greater,
        };
        if take_old {
            if let Some(b) = old.next() {
                bars.push(b.clone());
            }
        } else if let Some(b) = new.next() {
            bars.push(b);
        }
    }

    MergeOutcome { bars, added }
}

/// True when every adjacent pair is strictly ascending.
pub fn is_strictly_ascending(bars: &[Bar]) -> bool {
    bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}
