//! Timeframe: the bar resolution bucket.
//!
//! A timeframe fixes two things: the bucket width used to snap fills onto
//! bars, and the calendar-day chunk by which the loader walks backward when
//! it extends a window or skips over a gap with no trading data.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bar resolution, named the way the bars endpoint names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1Min")]
    OneMinute,
    #[serde(rename = "5Min")]
    FiveMinutes,
    #[serde(rename = "15Min")]
    FifteenMinutes,
    #[serde(rename = "30Min")]
    ThirtyMinutes,
    #[serde(rename = "1Hour")]
    OneHour,
    #[serde(rename = "4Hour")]
    FourHours,
    #[serde(rename = "1Day")]
    OneDay,
    #[serde(rename = "1Week")]
    OneWeek,
}

impl Timeframe {
    /// All timeframes, finest first.
    pub fn all() -> [Timeframe; 8] {
        [
            Timeframe::OneMinute,
            Timeframe::FiveMinutes,
            Timeframe::FifteenMinutes,
            Timeframe::ThirtyMinutes,
            Timeframe::OneHour,
            Timeframe::FourHours,
            Timeframe::OneDay,
            Timeframe::OneWeek,
        ]
    }

    /// Wire name used by the bars endpoint (`1Min`, `1Day`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1Min",
            Timeframe::FiveMinutes => "5Min",
            Timeframe::FifteenMinutes => "15Min",
            Timeframe::ThirtyMinutes => "30Min",
            Timeframe::OneHour => "1Hour",
            Timeframe::FourHours => "4Hour",
            Timeframe::OneDay => "1Day",
            Timeframe::OneWeek => "1Week",
        }
    }

    /// Width of one bar bucket in seconds.
    pub fn bucket_secs(&self) -> i64 {
        match self {
            Timeframe::OneMinute => 60,
            Timeframe::FiveMinutes => 5 * 60,
            Timeframe::FifteenMinutes => 15 * 60,
            Timeframe::ThirtyMinutes => 30 * 60,
            Timeframe::OneHour => 60 * 60,
            Timeframe::FourHours => 4 * 60 * 60,
            Timeframe::OneDay => 24 * 60 * 60,
            Timeframe::OneWeek => 7 * 24 * 60 * 60,
        }
    }

    /// Calendar days covered by one backward load step.
    ///
    /// Coarser bars get larger chunks so that the fixed retry budget spans
    /// multi-week gaps for intraday bars and multi-year gaps for weekly ones.
    pub fn chunk_days(&self) -> i64 {
        match self {
            Timeframe::OneMinute | Timeframe::FiveMinutes => 3,
            Timeframe::FifteenMinutes => 7,
            Timeframe::ThirtyMinutes => 14,
            Timeframe::OneHour => 30,
            Timeframe::FourHours => 90,
            Timeframe::OneDay => 365,
            Timeframe::OneWeek => 730,
        }
    }

    pub fn chunk(&self) -> chrono::Duration {
        chrono::Duration::days(self.chunk_days())
    }

    pub fn bucket(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.bucket_secs())
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised timeframe name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown timeframe '{0}' (expected one of 1Min, 5Min, 15Min, 30Min, 1Hour, 4Hour, 1Day, 1Week)")]
pub struct ParseTimeframeError(pub String);

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::all()
            .into_iter()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseTimeframeError(s.to_string()))
    }
}
