//! In-memory bar source.
//!
//! Serves pre-loaded series with the same range and limit semantics as the
//! bars endpoint, and records every query it receives. Backs the CLI's
//! synthetic mode and the loader tests.

use super::provider::{BarQuery, BarSource, DataError, RawBar};
use crate::domain::{Bar, Timeframe};
use chrono::{DateTime, Datelike, Utc, Weekday};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct InMemoryBarSource {
    series: HashMap<(String, Timeframe), Vec<Bar>>,
    queries: Mutex<Vec<BarQuery>>,
}

impl InMemoryBarSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_bars(mut self, symbol: &str, timeframe: Timeframe, bars: Vec<Bar>) -> Self {
        self.insert(symbol, timeframe, bars);
        self
    }

    /// Add bars for a series, keeping it sorted.
    pub fn insert(&mut self, symbol: &str, timeframe: Timeframe, bars: Vec<Bar>) {
        let series = self
            .series
            .entry((symbol.to_string(), timeframe))
            .or_default();
        series.extend(bars);
        series.sort_by_key(|b| b.timestamp);
    }

    /// Every query received so far, oldest first.
    pub fn queries(&self) -> Vec<BarQuery> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Deterministic bar series over `[start, end]` at `timeframe` spacing.
    ///
    /// Saturdays and Sundays are skipped for intraday and daily bars.
    pub fn synthetic_series(
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        base_price: f64,
    ) -> Vec<Bar> {
        let step = timeframe.bucket();
        let skip_weekends = timeframe != Timeframe::OneWeek;
        let mut bars = Vec::new();
        let mut t = start;
        let mut i = 0u64;

        while t <= end {
            let weekend = matches!(t.weekday(), Weekday::Sat | Weekday::Sun);
            if !(skip_weekends && weekend) {
                let phase = i as f64 / 12.0;
                let close = base_price * (1.0 + 0.03 * phase.sin());
                let open = base_price * (1.0 + 0.03 * (phase - 0.08).sin());
                let spread = base_price * 0.004;
                bars.push(Bar {
                    timestamp: t,
                    open,
                    high: open.max(close) + spread,
                    low: open.min(close) - spread,
                    close,
                    volume: 10_000 + (i % 17) * 1_250,
                    trade_count: Some(100 + i % 31),
                    vwap: Some((open + close) / 2.0),
                });
                i += 1;
            }
            t += step;
        }
        bars
    }
}

impl BarSource for InMemoryBarSource {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn fetch_bars(&self, query: &BarQuery) -> Result<Vec<RawBar>, DataError> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.clone());

        let Some(series) = self.series.get(&(query.symbol.clone(), query.timeframe)) else {
            return Ok(Vec::new());
        };

        let in_range: Vec<&Bar> = series
            .iter()
            .filter(|b| query.start.map_or(true, |s| b.timestamp >= s))
            .filter(|b| query.end.map_or(true, |e| b.timestamp <= e))
            .collect();

        // Keep the most recent `limit` bars: charts load from the right edge.
        let skip = in_range.len().saturating_sub(query.limit as usize);
        Ok(in_range[skip..].iter().map(|b| RawBar::from_bar(b)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn synthetic_daily_series_skips_weekends() {
        // 2024-01-01 is a Monday.
        let bars = InMemoryBarSource::synthetic_series(Timeframe::OneDay, t(1), t(14), 100.0);
        assert_eq!(bars.len(), 10);
        assert!(bars.iter().all(|b| b.is_sane()));
    }

    #[test]
    fn fetch_honours_range_and_keeps_latest_on_limit() {
        let bars = InMemoryBarSource::synthetic_series(Timeframe::OneDay, t(1), t(31), 100.0);
        let source = InMemoryBarSource::new().with_bars("SPY", Timeframe::OneDay, bars);

        let query = BarQuery {
            symbol: "SPY".into(),
            timeframe: Timeframe::OneDay,
            start: Some(t(8)),
            end: Some(t(19)),
            limit: 3,
        };
        let raw = source.fetch_bars(&query).unwrap();
        let got: Vec<_> = raw.iter().filter_map(RawBar::parse).map(|b| b.timestamp).collect();
        assert_eq!(got, vec![t(17), t(18), t(19)]);
        assert_eq!(source.query_count(), 1);
    }

    #[test]
    fn unknown_series_is_empty() {
        let source = InMemoryBarSource::new();
        let query = BarQuery {
            symbol: "NOPE".into(),
            timeframe: Timeframe::OneHour,
            start: None,
            end: None,
            limit: 10,
        };
        assert!(source.fetch_bars(&query).unwrap().is_empty());
    }
}
