//! Integration tests for chart pattern detection.
//!
//! These tests drive the public API with caller-defined bar types.

use chartpat::prelude::*;
use chrono::{Duration, TimeZone, Utc};

/// Caller-side bar structure
#[derive(Debug, Clone, Copy)]
struct TestBar {
    ts: Timestamp,
    c: f64,
}

impl OHLCV for TestBar {
    fn timestamp(&self) -> Timestamp {
        self.ts
    }

    fn open(&self) -> f64 {
        self.c
    }

    fn high(&self) -> f64 {
        self.c
    }

    fn low(&self) -> f64 {
        self.c
    }

    fn close(&self) -> f64 {
        self.c
    }

    fn volume(&self) -> f64 {
        1000.0
    }
}

fn day(i: usize) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i as i64)
}

fn bars(closes: &[f64]) -> Vec<TestBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| TestBar { ts: day(i), c })
        .collect()
}

/// Zigzag between two straight lines: `swings` peaks, `swings + 1` troughs,
/// `leg` bars per leg. Window 1 extrema land exactly on the turning points.
fn channel(swings: usize, leg: usize, top: (f64, f64), bottom: (f64, f64)) -> Vec<f64> {
    let turns: Vec<f64> = (0..=2 * swings)
        .map(|t| {
            let k = (t / 2) as f64;
            if t % 2 == 0 {
                bottom.0 + bottom.1 * k
            } else {
                top.0 + top.1 * k
            }
        })
        .collect();
    let mut closes: Vec<f64> = turns
        .windows(2)
        .flat_map(|w| (0..leg).map(move |k| w[0] + (w[1] - w[0]) * k as f64 / leg as f64))
        .collect();
    closes.extend(turns.last());
    closes
}

fn engine_with(detector: BuiltinDetector) -> PatternEngine {
    EngineBuilder::new().add(detector).build().unwrap()
}

#[test]
fn test_reference_double_top() {
    let engine = engine_with(BuiltinDetector::Doubles(DoublesDetector {
        window: Period::new(1).unwrap(),
        tolerance: Ratio::new(0.02).unwrap(),
        ..Default::default()
    }));

    let patterns = engine.scan(&bars(&[10.0, 12.0, 11.0, 12.0, 10.0])).unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].kind, PatternKind::DoubleTop);
    assert_eq!(patterns[0].confidence, 1.0);
    assert_eq!(patterns[0].start, day(1));
    assert_eq!(patterns[0].end, day(3));
    assert!(patterns[0].midpoint.is_none());
}

#[test]
fn test_bad_closes_are_filtered_not_fatal() {
    let engine = engine_with(BuiltinDetector::Doubles(DoublesDetector {
        window: Period::new(1).unwrap(),
        ..Default::default()
    }));

    let mut input = bars(&[10.0, 12.0, 0.0, 11.0, 12.0, 10.0]);
    input[2].c = f64::NAN;
    let patterns = engine.scan(&input).unwrap();
    assert_eq!(patterns.len(), 1);
    // indices refer to the caller's bars
    assert_eq!((patterns[0].start_index, patterns[0].end_index), (1, 4));
}

#[test]
fn test_head_and_shoulders_midpoint() {
    let engine = engine_with(BuiltinDetector::HeadAndShoulders(HeadShouldersDetector {
        window: Period::new(1).unwrap(),
        ..Default::default()
    }));

    let patterns = engine
        .scan(&bars(&[10.0, 12.0, 11.0, 14.0, 11.0, 12.0, 10.0]))
        .unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].kind, PatternKind::HeadAndShoulders);
    assert_eq!(patterns[0].midpoint, Some(day(3)));
    assert_eq!(patterns[0].confidence, 1.0);
}

#[test]
fn test_descending_triangle_on_channel() {
    // flat floor at 50, ceiling falling 0.03 per swing; the fitted slopes are
    // per extremum, not per bar
    let closes = channel(4, 3, (60.0, -0.03), (50.0, 0.0));
    let engine = EngineBuilder::new()
        .add(BuiltinDetector::Triangles(TriangleDetector {
            window: Period::new(1).unwrap(),
            ..Default::default()
        }))
        .build()
        .unwrap();

    let patterns = engine.scan(&bars(&closes)).unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].kind, PatternKind::DescendingTriangle);
    assert!(patterns[0].confidence >= 0.4);
}

#[test]
fn test_falling_wedge_on_channel() {
    // ceiling falls 2 per swing, floor falls 1
    let closes = channel(4, 3, (60.0, -2.0), (40.0, -1.0));
    let engine = EngineBuilder::new()
        .add(BuiltinDetector::Wedges(WedgeDetector {
            window: Period::new(1).unwrap(),
            ..Default::default()
        }))
        .build()
        .unwrap();

    let patterns = engine.scan(&bars(&closes)).unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].kind, PatternKind::FallingWedge);
    assert_eq!(patterns[0].confidence, 0.5);
    assert!(patterns[0].kind.is_bullish());
}

#[test]
fn test_all_defaults_on_short_series() {
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
    let patterns = engine.scan(&bars(&[10.0, 12.0, 11.0, 12.0, 10.0])).unwrap();
    assert!(patterns.is_empty());
}

#[test]
fn test_every_pattern_meets_its_threshold() {
    let closes: Vec<f64> = (0..400)
        .map(|i| 100.0 + 10.0 * ((i as f64) * 0.21).sin() + 3.0 * ((i as f64) * 0.05).cos())
        .collect();
    let detectors = [
        (BuiltinDetector::Doubles(DoublesDetector::with_defaults()), 0.2),
        (BuiltinDetector::HeadAndShoulders(HeadShouldersDetector::with_defaults()), 0.2),
        (BuiltinDetector::Triangles(TriangleDetector::with_defaults()), 0.4),
        (BuiltinDetector::Wedges(WedgeDetector::with_defaults()), 0.2),
    ];
    for (detector, threshold) in detectors {
        let engine = engine_with(detector);
        for p in engine.scan(&bars(&closes)).unwrap() {
            assert!(p.confidence >= threshold && p.confidence <= 1.0, "{p:?}");
        }
    }
}

#[test]
fn test_pattern_serializes_flat() {
    let engine = engine_with(BuiltinDetector::Doubles(DoublesDetector {
        window: Period::new(1).unwrap(),
        ..Default::default()
    }));
    let patterns = engine.scan(&bars(&[10.0, 12.0, 11.0, 12.0, 10.0])).unwrap();
    let json = serde_json::to_value(&patterns[0]).unwrap();
    assert_eq!(json["kind"], "Double Top");
    assert_eq!(json["confidence"], 1.0);
    assert!(json.get("midpoint").is_none());
    assert!(json.get("start_index").is_none());
}

#[test]
fn test_parameterized_grid() {
    let tolerance = DoublesDetector::param_meta()
        .iter()
        .find(|m| m.name == "tolerance")
        .unwrap();
    for value in tolerance.generate_grid() {
        let mut params = std::collections::HashMap::new();
        params.insert("tolerance", value);
        let detector = DoublesDetector::with_params(&params).unwrap();
        assert!((detector.tolerance.get() - value).abs() < 1e-12);
    }
    assert_eq!(TriangleDetector::detector_name(), "triangles");
}

#[test]
fn test_parallel_scan_mixed_results() {
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
    let good = bars(&[10.0, 11.0, 12.0]);
    let mut bad = bars(&[10.0, 11.0, 12.0]);
    bad.swap(0, 2);

    let instruments: Vec<(&str, &[TestBar])> = vec![("GOOD", &good), ("BAD", &bad)];
    let (results, errors) = scan_parallel(&engine, instruments);
    assert_eq!(results.len(), 1);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0].error, PatternError::UnorderedSeries { index: 1 }));
}

#[test]
fn test_with_params_output_always_validates() {
    fn check<D: ParameterizedDetector + PatternDetector>() {
        let defaults = std::collections::HashMap::new();
        assert!(D::with_params(&defaults).unwrap().validate_config().is_ok());

        let mut bad = std::collections::HashMap::new();
        bad.insert("confidence_scale", f64::NAN);
        assert!(D::with_params(&bad).is_err(), "{}", D::detector_name());
    }
    check::<DoublesDetector>();
    check::<HeadShouldersDetector>();
    check::<TriangleDetector>();
    check::<WedgeDetector>();
}
