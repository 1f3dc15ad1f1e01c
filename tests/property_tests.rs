use plancheck::blocks::{EffortBlock, EffortBlockDetector, LabeledStream};
use plancheck::smoothing::{StreamSmoother, DEFAULT_MAX_GAP_S};
use plancheck::{
    ActivityStreams, Channel, ComplianceAnalyzer, Grade, PlannedSegment, PlannedWorkout, SegmentType,
    ThresholdProfile, ZoneClassifier,
};
use proptest::prelude::*;
use rust_decimal_macros::dec;

/// Property tests over randomly generated rides and plans

const FTP: f64 = 250.0;

/// Steps of (seconds, watts) with an occasional recording pause after a step
fn ride() -> impl Strategy<Value = Vec<(u32, f64, bool)>> {
    prop::collection::vec((1u32..240, 0.0f64..400.0, prop::bool::weighted(0.1)), 1..16)
}

fn streams_from(steps: &[(u32, f64, bool)]) -> ActivityStreams {
    let mut time_s = Vec::new();
    let mut watts = Vec::new();
    let mut t = 0.0;
    for &(seconds, value, pause_after) in steps {
        for _ in 0..seconds {
            time_s.push(t);
            watts.push(value);
            t += 1.0;
        }
        if pause_after {
            t += 120.0;
        }
    }
    ActivityStreams::new(time_s).with_watts(watts)
}

fn segment_type() -> impl Strategy<Value = SegmentType> {
    prop_oneof![
        Just(SegmentType::Warmup),
        Just(SegmentType::Cooldown),
        Just(SegmentType::Steady),
        Just(SegmentType::Interval),
        Just(SegmentType::Recovery),
    ]
}

fn plan() -> impl Strategy<Value = PlannedWorkout> {
    prop::collection::vec((segment_type(), 30.0f64..130.0, 0.0f64..25.0, 30.0f64..900.0), 1..9).prop_map(
        |segments| {
            PlannedWorkout::from_segments(
                segments
                    .into_iter()
                    .map(|(kind, min, width, duration)| PlannedSegment::new(kind, min, min + width, duration))
                    .collect(),
            )
        },
    )
}

fn detect(streams: &ActivityStreams) -> (LabeledStream, Vec<EffortBlock>) {
    let raw = streams.stream(Channel::Power).unwrap();
    let smoothed = StreamSmoother::default().smooth(&raw).unwrap();
    let labeled = LabeledStream::new(&raw, &smoothed, &ZoneClassifier::power(FTP), DEFAULT_MAX_GAP_S);
    let blocks = EffortBlockDetector::default().detect(&labeled).iter().collect();
    (labeled, blocks)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_blocks_partition_stream(steps in ride()) {
        let (labeled, blocks) = detect(&streams_from(&steps));

        prop_assert!(!blocks.is_empty());
        prop_assert_eq!(blocks[0].samples().start, 0);
        prop_assert_eq!(blocks[blocks.len() - 1].samples().end, labeled.len());

        for pair in blocks.windows(2) {
            prop_assert_eq!(pair[0].samples().end, pair[1].samples().start);
            prop_assert!(pair[0].start_s() < pair[1].start_s());
            prop_assert!(pair[0].zone != pair[1].zone);
        }

        let active: f64 = blocks.iter().map(|b| b.duration_s()).sum();
        prop_assert!((active - labeled.active_s()).abs() < 1e-6);

        if blocks.len() > 1 {
            for block in &blocks {
                prop_assert!(block.duration_s() >= 20.0);
            }
        }
    }

    #[test]
    fn prop_matches_follow_plan_order(steps in ride(), workout in plan()) {
        let outcome = ComplianceAnalyzer::default()
            .analyze_detailed(&ThresholdProfile::new(FTP), &workout, &streams_from(&steps), Channel::Power)
            .unwrap();

        let efforts: Vec<_> = outcome
            .scores
            .iter()
            .filter_map(|s| s.match_result.effort.as_ref())
            .collect();

        for pair in efforts.windows(2) {
            prop_assert!(pair[0].window.start_s <= pair[1].window.start_s);
            prop_assert!(pair[0].window.end_index <= pair[1].window.start_index);
            prop_assert!(pair[0].blocks.start <= pair[1].blocks.start);
        }
    }

    #[test]
    fn prop_scores_within_bounds(steps in ride(), workout in plan()) {
        let report = ComplianceAnalyzer::default()
            .analyze(&ThresholdProfile::new(FTP), &workout, &streams_from(&steps), Channel::Power)
            .unwrap();

        for row in &report.segments {
            for score in [row.power_score, row.zone_score, row.duration_score, row.weighted_total] {
                prop_assert!(score >= dec!(0) && score <= dec!(100));
            }
            if !row.matched {
                prop_assert_eq!(row.weighted_total, dec!(0));
            }
        }

        prop_assert!(report.overall_score >= dec!(0) && report.overall_score <= dec!(100));
        prop_assert_eq!(report.grade, Grade::from_score(report.overall_score));
        prop_assert_eq!(report.segments.len(), workout.validated_segments().unwrap().len());
    }

    #[test]
    fn prop_analysis_is_idempotent(steps in ride(), workout in plan()) {
        let analyzer = ComplianceAnalyzer::default();
        let streams = streams_from(&steps);
        let profile = ThresholdProfile::new(FTP);

        let first = analyzer.analyze(&profile, &workout, &streams, Channel::Power).unwrap();
        let second = analyzer.analyze(&profile, &workout, &streams, Channel::Power).unwrap();

        prop_assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
