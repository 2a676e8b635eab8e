//! Chart session: one window, its source, its fills and its scroll trigger.
//!
//! Drives the [`BarWindow`] synchronously on the caller's thread. Callers that
//! fetch elsewhere use the window's ticket API directly via [`ChartSession::window_mut`].

use crate::data::gap_skip::{fetch_with_gap_skip, GapSkipPolicy};
use crate::data::provider::{parse_fills, BarSource, DataError, FillScope, FillSource};
use crate::data::range::TimeBounds;
use crate::debounce::Debouncer;
use crate::domain::FillEvent;
use crate::markers::{recompute_markers, ChartMarker};
use crate::window::{ApplyOutcome, BarWindow, LoadRequest, WindowKey, WindowSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Everything the chart surface needs for one render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub window: WindowSnapshot,
    pub markers: Vec<ChartMarker>,
}

pub struct ChartSession {
    source: Arc<dyn BarSource>,
    window: BarWindow,
    fills: Vec<FillEvent>,
    policy: GapSkipPolicy,
    debouncer: Debouncer,
}

impl ChartSession {
    pub fn new(
        source: Arc<dyn BarSource>,
        key: WindowKey,
        bounds: TimeBounds,
        policy: GapSkipPolicy,
        debounce: Duration,
    ) -> Self {
        Self {
            source,
            window: BarWindow::new(key, bounds),
            fills: Vec::new(),
            policy,
            debouncer: Debouncer::new(debounce),
        }
    }

    pub fn window(&self) -> &BarWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut BarWindow {
        &mut self.window
    }

    pub fn fills(&self) -> &[FillEvent] {
        &self.fills
    }

    /// Switch to another symbol, timeframe or range. Pending loads go stale.
    pub fn open(&mut self, key: WindowKey, bounds: TimeBounds) {
        self.debouncer.cancel();
        self.window.reset(key, bounds);
    }

    /// Load the initial window ending at `end`.
    ///
    /// Returns `None` if a load is already in flight.
    pub fn load_initial(&mut self, end: Option<DateTime<Utc>>) -> Option<ApplyOutcome> {
        let request = self.window.begin_initial(end)?;
        Some(self.run(request))
    }

    /// Extend the window one chunk further back.
    ///
    /// Returns `None` if a load is in flight or there is no more history.
    pub fn load_more(&mut self) -> Option<ApplyOutcome> {
        let request = self.window.begin_load_more()?;
        Some(self.run(request))
    }

    fn run(&mut self, request: LoadRequest) -> ApplyOutcome {
        let result = fetch_with_gap_skip(self.source.as_ref(), &request, &self.policy);
        self.window.apply(&request.ticket, result)
    }

    /// Replace the fill list; markers follow on the next snapshot.
    pub fn set_fills(&mut self, fills: Vec<FillEvent>) {
        debug!(count = fills.len(), "fills replaced");
        self.fills = fills;
    }

    /// Fetch and install the fills for a backtest or strategy.
    pub fn load_fills(
        &mut self,
        source: &dyn FillSource,
        scope: &FillScope,
    ) -> Result<usize, DataError> {
        let raw = source.fetch_fills(scope)?;
        let fills = parse_fills(&raw);
        info!(?scope, raw = raw.len(), usable = fills.len(), "fills loaded");
        let count = fills.len();
        self.set_fills(fills);
        Ok(count)
    }

    /// The chart reached its left edge. Ignored unless a load would be allowed.
    pub fn on_scroll_to_start(&mut self, now: Instant) {
        if self.window.can_load_more() {
            self.debouncer.trigger(now);
        }
    }

    /// Advance the session clock; runs a debounced load-more when due.
    pub fn tick(&mut self, now: Instant) -> Option<ApplyOutcome> {
        if self.debouncer.poll(now) {
            self.load_more()
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let key = self.window.key();
        SessionSnapshot {
            window: self.window.snapshot(),
            markers: recompute_markers(self.window.bars(), &self.fills, &key.symbol, key.timeframe),
        }
    }
}
