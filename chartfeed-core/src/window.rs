//! Loaded window state machine.
//!
//! A [`BarWindow`] owns the ascending bars currently materialized for one
//! (symbol, timeframe) pair and the earliest-loaded cursor. Loads are split in
//! two halves so the fetch itself can run wherever the caller likes:
//!
//! 1. `begin_initial` / `begin_load_more` check the re-entrancy guard and hand
//!    out a [`LoadRequest`] carrying a [`LoadTicket`].
//! 2. `apply` takes the ticket back with the fetch result. A ticket issued
//!    before a `reset` (symbol, timeframe or range change) no longer matches
//!    and its result is discarded.
//!
//! At most one load is in flight per window.

use crate::data::gap_skip::GapSkipOutcome;
use crate::data::merge;
use crate::data::provider::DataError;
use crate::data::range::TimeBounds;
use crate::domain::{Bar, Timeframe};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Identity of a window: which bars it holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl WindowKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadKind {
    /// Replace the window (first load or explicit refresh).
    Initial,
    /// Extend the window backward in time.
    More,
}

/// Proof that a load was started against a particular window session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    session: u64,
    seq: u64,
    kind: LoadKind,
}

impl LoadTicket {
    pub fn kind(&self) -> LoadKind {
        self.kind
    }
}

/// Everything the gap-skipping loop needs to run one load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub ticket: LoadTicket,
    pub key: WindowKey,
    /// Inclusive end of the first query.
    pub end: DateTime<Utc>,
    pub bounds: TimeBounds,
}

impl LoadRequest {
    pub fn kind(&self) -> LoadKind {
        self.ticket.kind
    }
}

/// What `apply` did with a load result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The window was reset after the load started; the result was dropped.
    Stale,
    /// Bars were loaded (initial) or prepended (more).
    Loaded { added: usize },
    /// No further history: retries ran out or nothing new came back.
    Exhausted,
    /// The fetch failed; see the snapshot's `error`.
    Failed,
}

/// User-facing state of the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WindowStatus {
    Idle,
    LoadingChart,
    LoadingMore,
    Ready,
    NoData,
}

impl fmt::Display for WindowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowStatus::Idle => f.write_str("idle"),
            WindowStatus::LoadingChart => f.write_str("loading chart data…"),
            WindowStatus::LoadingMore => f.write_str("loading more…"),
            WindowStatus::Ready => f.write_str("ready"),
            WindowStatus::NoData => f.write_str("no price data available"),
        }
    }
}

/// Immutable copy of the window handed to the rendering side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSnapshot {
    pub key: WindowKey,
    pub bars: Vec<Bar>,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    pub has_more: bool,
    pub loading: bool,
    pub loading_more: bool,
    pub status: WindowStatus,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct BarWindow {
    key: WindowKey,
    bounds: TimeBounds,
    bars: Vec<Bar>,
    earliest: Option<DateTime<Utc>>,
    has_more: bool,
    loaded_once: bool,
    pending: Option<LoadTicket>,
    last_error: Option<String>,
    session: u64,
    next_seq: u64,
}

impl BarWindow {
    pub fn new(key: WindowKey, bounds: TimeBounds) -> Self {
        Self {
            key,
            bounds,
            bars: Vec::new(),
            earliest: None,
            has_more: true,
            loaded_once: false,
            pending: None,
            last_error: None,
            session: 0,
            next_seq: 0,
        }
    }

    pub fn key(&self) -> &WindowKey {
        &self.key
    }

    pub fn bounds(&self) -> &TimeBounds {
        &self.bounds
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.earliest
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether a backward-scroll trigger should currently be honoured.
    pub fn can_load_more(&self) -> bool {
        self.pending.is_none() && self.has_more && !self.bars.is_empty()
    }

    /// Discard everything and start a new session for `key`.
    ///
    /// Any load still in flight becomes stale.
    pub fn reset(&mut self, key: WindowKey, bounds: TimeBounds) {
        info!(from = %self.key, to = %key, "resetting bar window");
        self.key = key;
        self.bounds = bounds;
        self.bars.clear();
        self.earliest = None;
        self.has_more = true;
        self.loaded_once = false;
        self.pending = None;
        self.last_error = None;
        self.session += 1;
    }

    /// Start an initial load ending at `end` (defaults to the upper bound, or now).
    ///
    /// Returns `None` while another load is in flight.
    pub fn begin_initial(&mut self, end: Option<DateTime<Utc>>) -> Option<LoadRequest> {
        if self.pending.is_some() {
            debug!(key = %self.key, "initial load ignored: load already in flight");
            return None;
        }
        let end = end.or(self.bounds.max).unwrap_or_else(Utc::now);
        let end = self.bounds.clamp_end(end);
        Some(self.issue(LoadKind::Initial, end))
    }

    /// Start a backward extension anchored just before the earliest loaded bar.
    ///
    /// Returns `None` while another load is in flight, when nothing is loaded
    /// yet, or when history is exhausted.
    pub fn begin_load_more(&mut self) -> Option<LoadRequest> {
        if self.pending.is_some() {
            debug!(key = %self.key, "load more ignored: load already in flight");
            return None;
        }
        if !self.has_more {
            return None;
        }
        let earliest = self.earliest?;
        let end = earliest - Duration::seconds(1);
        if self.bounds.is_below_min(end) {
            debug!(key = %self.key, "load more reached the lower bound");
            self.has_more = false;
            return None;
        }
        Some(self.issue(LoadKind::More, end))
    }

    fn issue(&mut self, kind: LoadKind, end: DateTime<Utc>) -> LoadRequest {
        self.next_seq += 1;
        let ticket = LoadTicket {
            session: self.session,
            seq: self.next_seq,
            kind,
        };
        self.pending = Some(ticket.clone());
        self.last_error = None;
        LoadRequest {
            ticket,
            key: self.key.clone(),
            end,
            bounds: self.bounds,
        }
    }

    /// Fold a load result back into the window.
    pub fn apply(
        &mut self,
        ticket: &LoadTicket,
        result: Result<GapSkipOutcome, DataError>,
    ) -> ApplyOutcome {
        if self.pending.as_ref() != Some(ticket) {
            debug!(key = %self.key, ?ticket, "discarding stale load result");
            return ApplyOutcome::Stale;
        }
        self.pending = None;

        match (ticket.kind, result) {
            (LoadKind::Initial, Err(e)) => {
                warn!(key = %self.key, error = %e, "initial bar load failed");
                self.bars.clear();
                self.earliest = None;
                self.has_more = false;
                self.loaded_once = true;
                self.last_error = Some(e.to_string());
                ApplyOutcome::Failed
            }
            (LoadKind::More, Err(e)) => {
                warn!(key = %self.key, error = %e, "loading older bars failed");
                self.last_error = Some(e.to_string());
                ApplyOutcome::Failed
            }
            (LoadKind::Initial, Ok(outcome)) => {
                self.loaded_once = true;
                self.bars = merge::merge_initial(outcome.bars, &self.bounds);
                self.earliest = self.bars.first().map(|b| b.timestamp);
                self.has_more = !outcome.exhausted && !self.earliest_at_lower_bound();
                info!(
                    key = %self.key,
                    bars = self.bars.len(),
                    fetches = outcome.fetches,
                    "initial bars loaded"
                );
                if self.bars.is_empty() {
                    self.has_more = false;
                    ApplyOutcome::Exhausted
                } else {
                    ApplyOutcome::Loaded {
                        added: self.bars.len(),
                    }
                }
            }
            (LoadKind::More, Ok(outcome)) => {
                if outcome.bars.is_empty() {
                    self.has_more = false;
                    return ApplyOutcome::Exhausted;
                }
                let merged = merge::merge_bars(&self.bars, outcome.bars, &self.bounds);
                if merged.is_exhausted() {
                    debug!(key = %self.key, "older batch held nothing new");
                    self.has_more = false;
                    return ApplyOutcome::Exhausted;
                }
                self.bars = merged.bars;
                self.earliest = self.bars.first().map(|b| b.timestamp);
                self.has_more = !self.earliest_at_lower_bound();
                info!(
                    key = %self.key,
                    added = merged.added,
                    total = self.bars.len(),
                    "older bars loaded"
                );
                ApplyOutcome::Loaded {
                    added: merged.added,
                }
            }
        }
    }

    fn earliest_at_lower_bound(&self) -> bool {
        match (self.earliest, self.bounds.min) {
            (Some(earliest), Some(min)) => earliest <= min,
            _ => false,
        }
    }

    pub fn status(&self) -> WindowStatus {
        match &self.pending {
            Some(t) if t.kind == LoadKind::Initial => WindowStatus::LoadingChart,
            Some(_) => WindowStatus::LoadingMore,
            None if !self.loaded_once => WindowStatus::Idle,
            None if self.bars.is_empty() => WindowStatus::NoData,
            None => WindowStatus::Ready,
        }
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        let pending_kind = self.pending.as_ref().map(|t| t.kind);
        WindowSnapshot {
            key: self.key.clone(),
            bars: self.bars.clone(),
            earliest: self.earliest,
            latest: self.bars.last().map(|b| b.timestamp),
            has_more: self.has_more,
            loading: pending_kind == Some(LoadKind::Initial),
            loading_more: pending_kind == Some(LoadKind::More),
            status: self.status(),
            error: self.last_error.clone(),
        }
    }
}
