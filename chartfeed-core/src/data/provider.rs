//! Source traits, wire types and structured error types.
//!
//! The source traits abstract over where bars, fills and the symbol list come
//! from (the REST backend, an in-memory replay) so the loader can be driven
//! and tested without a network. Sources never retry: retry policy lives in
//! the gap-skipping loop one layer up.

use crate::domain::{Bar, FillEvent, Side, Timeframe};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bounded historical-bar request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarQuery {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: u32,
}

/// A timestamp as it appears on the wire: RFC 3339 / ISO date text, or unix
/// seconds (milliseconds are detected by magnitude).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTime {
    Unix(i64),
    Text(String),
}

impl RawTime {
    pub fn parse(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTime::Unix(n) => {
                if n.abs() >= 100_000_000_000 {
                    DateTime::from_timestamp_millis(*n)
                } else {
                    DateTime::from_timestamp(*n, 0)
                }
            }
            RawTime::Text(s) => {
                let s = s.trim();
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Some(dt.with_timezone(&Utc));
                }
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc())
            }
        }
    }
}

/// A number that may arrive as JSON text (`"qty": "10"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Num(f64),
    Text(String),
}

impl RawNumber {
    pub fn value(&self) -> Option<f64> {
        match self {
            RawNumber::Num(n) => Some(*n),
            RawNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Bar as returned by the bars endpoint, before validation.
///
/// Accepts the short keys (`t`, `o`, `h`, ...) and the long names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    #[serde(rename = "t", alias = "timestamp", default)]
    pub timestamp: Option<RawTime>,
    #[serde(rename = "o", alias = "open")]
    pub open: f64,
    #[serde(rename = "h", alias = "high")]
    pub high: f64,
    #[serde(rename = "l", alias = "low")]
    pub low: f64,
    #[serde(rename = "c", alias = "close")]
    pub close: f64,
    #[serde(rename = "v", alias = "volume", default)]
    pub volume: f64,
    #[serde(rename = "n", alias = "trade_count", alias = "tradeCount", default)]
    pub trade_count: Option<u64>,
    #[serde(rename = "vw", alias = "vwap", default)]
    pub vwap: Option<f64>,
}

impl RawBar {
    /// Validate into a [`Bar`]. A missing or unparsable timestamp yields `None`.
    pub fn parse(&self) -> Option<Bar> {
        let timestamp = self.timestamp.as_ref()?.parse()?;
        Some(Bar {
            timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume.max(0.0).round() as u64,
            trade_count: self.trade_count,
            vwap: self.vwap,
        })
    }

    /// Build the wire form of an already-validated bar.
    pub fn from_bar(bar: &Bar) -> Self {
        Self {
            timestamp: Some(RawTime::Text(bar.timestamp.to_rfc3339())),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume as f64,
            trade_count: bar.trade_count,
            vwap: bar.vwap,
        }
    }
}

/// Order or trade as returned by the order/trade listing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFill {
    pub symbol: String,
    pub side: String,
    #[serde(alias = "qty")]
    pub quantity: Option<RawNumber>,
    #[serde(
        alias = "executedAt",
        alias = "filled_at",
        alias = "filledAt",
        alias = "timestamp",
        default
    )]
    pub executed_at: Option<RawTime>,
}

impl RawFill {
    /// Validate into a [`FillEvent`]. Unfilled orders (no execution time),
    /// unknown sides and non-positive quantities yield `None`.
    pub fn parse(&self) -> Option<FillEvent> {
        let executed_at = self.executed_at.as_ref()?.parse()?;
        let side: Side = self.side.parse().ok()?;
        let quantity = self.quantity.as_ref()?.value()?;
        if quantity.is_nan() || quantity <= 0.0 {
            return None;
        }
        Some(FillEvent {
            symbol: self.symbol.clone(),
            side,
            quantity,
            executed_at,
        })
    }
}

/// Which order/trade listing to read fills from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillScope {
    Backtest(String),
    Strategy(String),
}

/// Structured error types for data operations.
///
/// Displayable as a single human-readable message in CLI and chart contexts.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by backend (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Historical-bar range fetcher.
pub trait BarSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch up to `query.limit` bars within `[start, end]` (inclusive).
    /// Ordering is not guaranteed; an empty list means no trading data.
    fn fetch_bars(&self, query: &BarQuery) -> Result<Vec<RawBar>, DataError>;
}

/// Order/trade listing for a strategy or backtest.
pub trait FillSource: Send + Sync {
    fn fetch_fills(&self, scope: &FillScope) -> Result<Vec<RawFill>, DataError>;
}

/// Tradable-symbol reference list.
pub trait AssetSource: Send + Sync {
    fn fetch_symbols(&self) -> Result<Vec<String>, DataError>;
}

/// Parse raw fills, dropping the ones that cannot be placed on a chart.
pub fn parse_fills(raw: &[RawFill]) -> Vec<FillEvent> {
    raw.iter().filter_map(RawFill::parse).collect()
}
