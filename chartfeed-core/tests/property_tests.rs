//! Property tests for window invariants.
//!
//! Uses proptest to verify:
//! 1. Idempotent merge: merging the same batch twice changes nothing
//! 2. Monotonic ordering: merged windows are strictly ascending and unique
//! 3. Retry bound: an empty source is queried at most `max_retries + 1` times
//! 4. Marker aggregation: every fill lands on one marker, quantities are conserved

use chartfeed_core::data::merge::{is_strictly_ascending, merge_bars, merge_initial};
use chartfeed_core::data::{fetch_with_gap_skip, GapSkipPolicy, InMemoryBarSource, TimeBounds};
use chartfeed_core::domain::{Bar, FillEvent, Side, Timeframe};
use chartfeed_core::markers::recompute_markers;
use chartfeed_core::window::{BarWindow, WindowKey};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashSet};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

fn bar_at(minute: i64, close: f64) -> Bar {
    Bar {
        timestamp: base() + Duration::minutes(minute),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 100,
        trade_count: None,
        vwap: None,
    }
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_window() -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::btree_set(0i64..5_000, 0..80)
        .prop_map(|mins| mins.into_iter().map(|m| bar_at(m, 1.0)).collect())
}

fn arb_batch() -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec(0i64..5_000, 0..80)
        .prop_map(|mins| mins.into_iter().map(|m| bar_at(m, 2.0)).collect())
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

fn arb_timeframe() -> impl Strategy<Value = Timeframe> {
    prop::sample::select(Timeframe::all().to_vec())
}

fn arb_quantity() -> impl Strategy<Value = f64> {
    (1u32..1_000).prop_map(|q| f64::from(q) / 10.0)
}

// ── 1. Idempotent merge ──────────────────────────────────────────────

proptest! {
    #[test]
    fn merging_a_batch_twice_equals_merging_it_once(
        existing in arb_window(),
        batch in arb_batch(),
    ) {
        let bounds = TimeBounds::unbounded();
        let once = merge_bars(&existing, batch.clone(), &bounds);
        let twice = merge_bars(&once.bars, batch, &bounds);

        prop_assert_eq!(&twice.bars, &once.bars);
        prop_assert_eq!(twice.added, 0);
        prop_assert!(twice.is_exhausted());
    }

    #[test]
    fn existing_bars_win_over_refetched_ones(
        existing in arb_window(),
        batch in arb_batch(),
    ) {
        let merged = merge_bars(&existing, batch, &TimeBounds::unbounded());
        for bar in &existing {
            let kept = merged.bars.iter().find(|b| b.timestamp == bar.timestamp);
            prop_assert_eq!(kept.map(|b| b.close), Some(1.0));
        }
    }
}

// ── 2. Monotonic ordering ────────────────────────────────────────────

proptest! {
    #[test]
    fn merged_window_is_strictly_ascending_union(
        existing in arb_window(),
        batch in arb_batch(),
    ) {
        let expected: BTreeSet<_> = existing
            .iter()
            .chain(batch.iter())
            .map(|b| b.timestamp)
            .collect();
        let merged = merge_bars(&existing, batch, &TimeBounds::unbounded());

        prop_assert!(is_strictly_ascending(&merged.bars));
        prop_assert_eq!(merged.bars.len(), expected.len());
        prop_assert_eq!(merged.added, expected.len() - existing.len());
    }

    #[test]
    fn bounded_merge_stays_inside_bounds(
        existing in arb_window(),
        batch in arb_batch(),
        lo in 0i64..2_500,
        span in 0i64..2_500,
    ) {
        let bounds = TimeBounds::between(
            base() + Duration::minutes(lo),
            base() + Duration::minutes(lo + span),
        );
        let initial = merge_initial(existing, &bounds);
        let merged = merge_bars(&initial, batch, &bounds);

        prop_assert!(is_strictly_ascending(&merged.bars));
        prop_assert!(merged.bars.iter().all(|b| bounds.contains(b.timestamp)));
    }
}

// ── 3. Retry bound ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn empty_source_respects_retry_budget_and_lower_bound(
        timeframe in arb_timeframe(),
        max_retries in 0u32..8,
        lower_days in prop::option::of(0i64..3_000),
    ) {
        let end = Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap();
        let bounds = TimeBounds {
            min: lower_days.map(|d| end - Duration::days(d)),
            max: None,
        };
        let source = InMemoryBarSource::new();
        let mut window = BarWindow::new(WindowKey::new("NONE", timeframe), bounds);
        let req = window.begin_initial(Some(end)).unwrap();
        let policy = GapSkipPolicy { max_retries, ..GapSkipPolicy::default() };

        let out = fetch_with_gap_skip(&source, &req, &policy).unwrap();
        prop_assert!(out.exhausted);
        prop_assert!(out.retries <= max_retries);
        prop_assert_eq!(out.fetches, out.retries + 1);
        prop_assert_eq!(source.query_count(), out.fetches as usize);
        if bounds.min.is_none() {
            prop_assert_eq!(out.retries, max_retries);
        }
        for query in source.queries() {
            if let (Some(min), Some(start)) = (bounds.min, query.start) {
                prop_assert!(start >= min);
            }
        }
    }
}

// ── 4. Marker aggregation ────────────────────────────────────────────

proptest! {
    /// With a bar in every hour, each fill maps onto exactly one marker.
    #[test]
    fn dense_window_conserves_fill_quantities(
        fills in prop::collection::vec((0i64..48 * 60, arb_side(), arb_quantity()), 1..40),
    ) {
        let bars: Vec<Bar> = (0..48).map(|h| bar_at(h * 60, 1.0)).collect();
        let events: Vec<FillEvent> = fills
            .iter()
            .map(|(minute, side, quantity)| FillEvent {
                symbol: "AAPL".into(),
                side: *side,
                quantity: *quantity,
                executed_at: base() + Duration::minutes(*minute),
            })
            .collect();

        let markers = recompute_markers(&bars, &events, "AAPL", Timeframe::OneHour);

        let bar_times: HashSet<i64> = bars.iter().map(Bar::unix).collect();
        let mut seen = HashSet::new();
        for m in &markers {
            prop_assert!(bar_times.contains(&m.time));
            prop_assert!(seen.insert((m.time, m.side)));
            prop_assert_eq!(&m.text, &format!("{:.1}", m.quantity));
        }

        for side in [Side::Buy, Side::Sell] {
            let filled: f64 = events.iter().filter(|e| e.side == side).map(|e| e.quantity).sum();
            let marked: f64 = markers.iter().filter(|m| m.side == side).map(|m| m.quantity).sum();
            prop_assert!((filled - marked).abs() < 1e-6);
        }
    }

    /// Fills far from every loaded bar produce nothing.
    #[test]
    fn fills_beyond_one_bucket_are_dropped(
        offset_hours in 3i64..500,
        side in arb_side(),
        quantity in arb_quantity(),
    ) {
        let bars = vec![bar_at(0, 1.0)];
        let fill = FillEvent {
            symbol: "AAPL".into(),
            side,
            quantity,
            executed_at: base() + Duration::hours(offset_hours),
        };
        prop_assert!(recompute_markers(&bars, &[fill], "AAPL", Timeframe::OneHour).is_empty());
    }
}
