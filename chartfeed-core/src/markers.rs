//! Marker alignment: snap fills onto loaded bars.
//!
//! Execution times rarely land on a bar boundary, and the chart surface drops
//! markers whose time is not a known bar. Fills are grouped into timeframe
//! buckets, each bucket is snapped to the nearest loaded bar within one bucket
//! width, and same-side quantities on the same bar are summed into a single
//! marker. Buckets with no bar close enough produce nothing; that is expected
//! while history is still loading.

use crate::domain::{Bar, FillEvent, Side, Timeframe};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerPosition {
    AboveBar,
    BelowBar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerShape {
    ArrowUp,
    ArrowDown,
}

pub const BUY_COLOR: &str = "#26a69a";
pub const SELL_COLOR: &str = "#ef5350";

/// One chart annotation, keyed by an existing bar's unix-seconds time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartMarker {
    pub time: i64,
    pub side: Side,
    pub quantity: f64,
    pub text: String,
    pub position: MarkerPosition,
    pub shape: MarkerShape,
    pub color: &'static str,
}

impl ChartMarker {
    fn new(time: i64, side: Side, quantity: f64) -> Self {
        let (position, shape, color) = match side {
            Side::Buy => (MarkerPosition::BelowBar, MarkerShape::ArrowUp, BUY_COLOR),
            Side::Sell => (MarkerPosition::AboveBar, MarkerShape::ArrowDown, SELL_COLOR),
        };
        Self {
            time,
            side,
            quantity,
            text: format!("{quantity:.1}"),
            position,
            shape,
            color,
        }
    }
}

/// Start of the bucket containing `t` (floor, also for pre-epoch times).
pub fn bucket_start(t: i64, width: i64) -> i64 {
    t.div_euclid(width) * width
}

/// Nearest value in ascending `times` to `target`, if within `tolerance`.
///
/// Ties go to the earlier bar.
pub fn nearest_within(times: &[i64], target: i64, tolerance: i64) -> Option<i64> {
    let idx = times.partition_point(|&t| t < target);
    let after = times.get(idx).copied();
    let before = idx.checked_sub(1).and_then(|i| times.get(i)).copied();

    let best = match (before, after) {
        (Some(b), Some(a)) => {
            if target - b <= a - target {
                b
            } else {
                a
            }
        }
        (Some(b), None) => b,
        (None, Some(a)) => a,
        (None, None) => return None,
    };
    ((best - target).abs() <= tolerance).then_some(best)
}

/// Rebuild the full marker list for `symbol` from the window and the fills.
///
/// Output is ascending by time, buy before sell on the same bar.
pub fn recompute_markers(
    bars: &[Bar],
    fills: &[FillEvent],
    symbol: &str,
    timeframe: Timeframe,
) -> Vec<ChartMarker> {
    if bars.is_empty() || fills.is_empty() {
        return Vec::new();
    }

    let width = timeframe.bucket_secs();
    let mut times: Vec<i64> = bars.iter().map(Bar::unix).collect();
    times.sort_unstable();
    times.dedup();

    let mut buckets: BTreeMap<(i64, Side), f64> = BTreeMap::new();
    for fill in fills.iter().filter(|f| f.symbol == symbol) {
        let bucket = bucket_start(fill.executed_at.timestamp(), width);
        *buckets.entry((bucket, fill.side)).or_insert(0.0) += fill.quantity;
    }

    let mut snapped: BTreeMap<(i64, Side), f64> = BTreeMap::new();
    for ((bucket, side), quantity) in buckets {
        if let Some(time) = nearest_within(&times, bucket, width) {
            *snapped.entry((time, side)).or_insert(0.0) += quantity;
        }
    }

    snapped
        .into_iter()
        .map(|((time, side), quantity)| ChartMarker::new(time, side, quantity))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap()
    }

    fn bar(t: DateTime<Utc>) -> Bar {
        Bar {
            timestamp: t,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1,
            trade_count: None,
            vwap: None,
        }
    }

    fn fill(symbol: &str, side: Side, quantity: f64, t: DateTime<Utc>) -> FillEvent {
        FillEvent {
            symbol: symbol.into(),
            side,
            quantity,
            executed_at: t,
        }
    }

    #[test]
    fn bucket_start_floors() {
        assert_eq!(bucket_start(125, 60), 120);
        assert_eq!(bucket_start(120, 60), 120);
        assert_eq!(bucket_start(-1, 60), -60);
    }

    #[test]
    fn nearest_picks_closer_neighbour() {
        let times = [100, 200, 300];
        assert_eq!(nearest_within(&times, 240, 100), Some(200));
        assert_eq!(nearest_within(&times, 260, 100), Some(300));
        assert_eq!(nearest_within(&times, 250, 100), Some(200));
        assert_eq!(nearest_within(&times, 0, 100), Some(100));
        assert_eq!(nearest_within(&times, 450, 100), None);
        assert_eq!(nearest_within(&[], 450, 100), None);
    }

    #[test]
    fn same_bucket_buys_aggregate() {
        let bars = vec![bar(at(2, 14, 0)), bar(at(2, 15, 0))];
        let fills = vec![
            fill("AAPL", Side::Buy, 3.0, at(2, 14, 5)),
            fill("AAPL", Side::Buy, 2.0, at(2, 14, 50)),
        ];
        let markers = recompute_markers(&bars, &fills, "AAPL", Timeframe::OneHour);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].text, "5.0");
        assert_eq!(markers[0].time, at(2, 14, 0).timestamp());
        assert_eq!(markers[0].position, MarkerPosition::BelowBar);
        assert_eq!(markers[0].shape, MarkerShape::ArrowUp);
    }

    #[test]
    fn buy_and_sell_in_same_bucket_stay_separate() {
        let bars = vec![bar(at(2, 14, 0))];
        let fills = vec![
            fill("AAPL", Side::Sell, 1.0, at(2, 14, 30)),
            fill("AAPL", Side::Buy, 4.0, at(2, 14, 10)),
        ];
        let markers = recompute_markers(&bars, &fills, "AAPL", Timeframe::OneHour);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].side, Side::Buy);
        assert_eq!(markers[0].position, MarkerPosition::BelowBar);
        assert_eq!(markers[1].side, Side::Sell);
        assert_eq!(markers[1].position, MarkerPosition::AboveBar);
        assert_eq!(markers[1].shape, MarkerShape::ArrowDown);
        assert_eq!(markers[1].text, "1.0");
    }

    #[test]
    fn daily_fill_snaps_to_offset_bar() {
        // Daily bars stamped at 05:00 UTC; fill mid-session.
        let bars = vec![bar(at(9, 5, 0)), bar(at(10, 5, 0))];
        let fills = vec![fill("SPY", Side::Buy, 10.0, at(10, 15, 45))];
        let markers = recompute_markers(&bars, &fills, "SPY", Timeframe::OneDay);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].time, at(10, 5, 0).timestamp());
    }

    #[test]
    fn distant_fill_is_dropped() {
        let bars = vec![bar(at(2, 14, 0))];
        let fills = vec![fill("AAPL", Side::Buy, 1.0, at(2, 17, 0))];
        assert!(recompute_markers(&bars, &fills, "AAPL", Timeframe::OneHour).is_empty());
    }

    #[test]
    fn other_symbols_are_ignored() {
        let bars = vec![bar(at(2, 14, 0))];
        let fills = vec![fill("MSFT", Side::Buy, 1.0, at(2, 14, 0))];
        assert!(recompute_markers(&bars, &fills, "AAPL", Timeframe::OneHour).is_empty());
    }

    #[test]
    fn buckets_snapping_to_one_bar_merge() {
        // Sparse window: only a 14:00 bar; 13:xx and 14:xx fills both land on it.
        let bars = vec![bar(at(2, 14, 0))];
        let fills = vec![
            fill("AAPL", Side::Sell, 1.5, at(2, 13, 20)),
            fill("AAPL", Side::Sell, 2.0, at(2, 14, 20)),
        ];
        let markers = recompute_markers(&bars, &fills, "AAPL", Timeframe::OneHour);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].text, "3.5");
    }
}
