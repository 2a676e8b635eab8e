//! Gap-skipping retry loop.
//!
//! Weekends, holidays and halted sessions leave stretches with no bars. When
//! a chunk comes back empty the query window is shifted back by one chunk and
//! retried, sequentially, until data shows up, the window would start below
//! the caller's lower bound, or the retry budget is spent.

use super::merge;
use super::provider::{BarQuery, BarSource, DataError};
use crate::domain::Bar;
use crate::window::LoadRequest;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Consecutive empty chunks tolerated before history is declared exhausted.
pub const MAX_EMPTY_RETRIES: u32 = 5;

/// Upper bound on bars requested per fetch.
pub const DEFAULT_PAGE_LIMIT: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapSkipPolicy {
    pub max_retries: u32,
    pub page_limit: u32,
}

impl Default for GapSkipPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_EMPTY_RETRIES,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Result of one gap-skipping load.
#[derive(Debug, Clone, PartialEq)]
pub struct GapSkipOutcome {
    /// Bars from the first non-empty chunk, bounded, ascending, unique.
    pub bars: Vec<Bar>,
    /// Fetches issued, including the first.
    pub fetches: u32,
    /// Chunk shifts performed after empty fetches.
    pub retries: u32,
    /// No data found before the budget or the lower bound ran out.
    pub exhausted: bool,
}

/// Run one load: query `[end - chunk, end]`, walking back over empty chunks.
///
/// Fetch errors abort the loop and are returned as-is.
pub fn fetch_with_gap_skip(
    source: &dyn BarSource,
    request: &LoadRequest,
    policy: &GapSkipPolicy,
) -> Result<GapSkipOutcome, DataError> {
    let chunk = request.key.timeframe.chunk();
    let bounds = request.bounds;
    let mut end = request.end;
    let mut fetches = 0;
    let mut retries = 0;

    loop {
        let start = bounds.clamp_start(end - chunk);
        let query = BarQuery {
            symbol: request.key.symbol.clone(),
            timeframe: request.key.timeframe,
            start: Some(start),
            end: Some(end),
            limit: policy.page_limit,
        };

        fetches += 1;
        debug!(
            source = source.name(),
            key = %request.key,
            %start,
            %end,
            attempt = fetches,
            "fetching bars"
        );
        let raw = source.fetch_bars(&query)?;
        let bars = merge::normalize(&raw, &bounds);

        if !bars.is_empty() {
            return Ok(GapSkipOutcome {
                bars,
                fetches,
                retries,
                exhausted: false,
            });
        }

        if retries >= policy.max_retries {
            debug!(key = %request.key, retries, "retry budget spent, no more history");
            break;
        }

        let next_end = end - chunk;
        if bounds.is_below_min(next_end) {
            debug!(key = %request.key, "gap skip reached the lower bound");
            break;
        }

        retries += 1;
        end = next_end;
    }

    Ok(GapSkipOutcome {
        bars: Vec::new(),
        fetches,
        retries,
        exhausted: true,
    })
}
