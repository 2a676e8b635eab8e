//! Optional `[min, max]` time clamp shared by the loader, merge and window.
//!
//! Backtest charts clamp to their fixed testing window; live strategy and
//! order charts run unbounded. The clamp is always caller-supplied.

use crate::domain::Bar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBounds {
    pub min: Option<DateTime<Utc>>,
    pub max: Option<DateTime<Utc>>,
}

impl TimeBounds {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn between(min: DateTime<Utc>, max: DateTime<Utc>) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.min.map_or(true, |min| t >= min) && self.max.map_or(true, |max| t <= max)
    }

    /// True when `t` lies strictly before the lower bound.
    pub fn is_below_min(&self, t: DateTime<Utc>) -> bool {
        self.min.is_some_and(|min| t < min)
    }

    /// Raise a query start to the lower bound.
    pub fn clamp_start(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self.min {
            Some(min) if start < min => min,
            _ => start,
        }
    }

    /// Lower a query end to the upper bound.
    pub fn clamp_end(&self, end: DateTime<Utc>) -> DateTime<Utc> {
        match self.max {
            Some(max) if end > max => max,
            _ => end,
        }
    }

    /// Drop bars outside the bounds, in place.
    pub fn retain(&self, bars: &mut Vec<Bar>) {
        if self.min.is_none() && self.max.is_none() {
            return;
        }
        bars.retain(|b| self.contains(b.timestamp));
    }
}
