use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blocks::WindowStats;
use crate::matching::MatchResult;
use crate::models::SegmentType;
use crate::zones::ZoneSet;

/// Relative importance of the three sub-scores for one segment type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub power: f64,
    pub zone: f64,
    pub duration: f64,
}

impl ScoreWeights {
    /// Completing the intended duration matters most
    pub const WARMUP_COOLDOWN: ScoreWeights = ScoreWeights {
        power: 0.25,
        zone: 0.35,
        duration: 0.40,
    };

    /// Hitting the target intensity is the point of the segment
    pub const INTERVAL: ScoreWeights = ScoreWeights {
        power: 0.45,
        zone: 0.40,
        duration: 0.15,
    };

    pub const RECOVERY: ScoreWeights = ScoreWeights {
        power: 0.20,
        zone: 0.30,
        duration: 0.50,
    };

    pub const STEADY: ScoreWeights = ScoreWeights {
        power: 0.40,
        zone: 0.40,
        duration: 0.20,
    };

    pub const fn for_type(segment_type: SegmentType) -> ScoreWeights {
        match segment_type {
            SegmentType::Warmup | SegmentType::Cooldown => Self::WARMUP_COOLDOWN,
            SegmentType::Interval => Self::INTERVAL,
            SegmentType::Recovery => Self::RECOVERY,
            SegmentType::Steady => Self::STEADY,
        }
    }

    pub fn combine(&self, power: f64, zone: f64, duration: f64) -> f64 {
        clamp_score(self.power * power + self.zone * zone + self.duration * duration)
    }
}

/// Verbal bucket of the zone score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneDiscipline {
    /// 90% or more of the time in the target zones
    Excellent,
    /// 75-89%
    Good,
    /// 50-74%
    Inconsistent,
    Poor,
}

impl ZoneDiscipline {
    pub fn from_score(zone_score: f64) -> Self {
        if zone_score >= 90.0 {
            ZoneDiscipline::Excellent
        } else if zone_score >= 75.0 {
            ZoneDiscipline::Good
        } else if zone_score >= 50.0 {
            ZoneDiscipline::Inconsistent
        } else {
            ZoneDiscipline::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneDiscipline::Excellent => "excellent",
            ZoneDiscipline::Good => "good",
            ZoneDiscipline::Inconsistent => "inconsistent",
            ZoneDiscipline::Poor => "poor",
        }
    }
}

/// Scorer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Score given on every axis to a segment that was not executed
    pub unmatched_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            unmatched_score: 0.0,
        }
    }
}

/// Sub-scores and weighted total for one planned segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentScore {
    pub power_score: f64,
    pub zone_score: f64,
    pub duration_score: f64,
    pub weighted_total: f64,
    pub weights: ScoreWeights,
    pub zone_discipline: ZoneDiscipline,
    pub match_result: MatchResult,
}

impl SegmentScore {
    pub fn is_matched(&self) -> bool {
        self.match_result.is_matched()
    }

    pub fn planned_duration_s(&self) -> f64 {
        self.match_result.segment.planned_duration_s
    }
}

/// Computes compliance sub-scores for matched segments
#[derive(Debug, Clone, Default)]
pub struct SegmentScorer {
    config: ScoringConfig,
}

impl SegmentScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, result: &MatchResult) -> SegmentScore {
        let segment = &result.segment;
        let weights = ScoreWeights::for_type(segment.segment_type);

        let (power, zone, duration) = match &result.effort {
            Some(effort) => (
                power_score(
                    effort.window.avg_pct,
                    segment.target_min_pct,
                    segment.target_max_pct,
                ),
                zone_score(&effort.window, result.target_zones),
                duration_score(effort.window.active_s, segment.planned_duration_s),
            ),
            None => {
                let floor = clamp_score(self.config.unmatched_score);
                (floor, floor, floor)
            }
        };

        SegmentScore {
            power_score: power,
            zone_score: zone,
            duration_score: duration,
            weighted_total: weights.combine(power, zone, duration),
            weights,
            zone_discipline: ZoneDiscipline::from_score(zone),
            match_result: result.clone(),
        }
    }

    pub fn score_all(&self, results: &[MatchResult]) -> Vec<SegmentScore> {
        let scores: Vec<SegmentScore> = results.iter().map(|r| self.score(r)).collect();

        debug!(
            segments = scores.len(),
            unmatched = scores.iter().filter(|s| !s.is_matched()).count(),
            "scored segments"
        );

        scores
    }
}

/// Intensity accuracy in percentage points of threshold
///
/// Undershooting costs 2 points per percentage point below the range,
/// overshooting 1 point per percentage point above.
pub fn power_score(avg_pct: f64, min_pct: f64, max_pct: f64) -> f64 {
    if !avg_pct.is_finite() {
        return 0.0;
    }

    if avg_pct < min_pct {
        clamp_score(100.0 - 2.0 * (min_pct - avg_pct))
    } else if avg_pct > max_pct {
        clamp_score(100.0 - (avg_pct - max_pct))
    } else {
        100.0
    }
}

/// Percent of the window's active time spent inside the target zones
pub fn zone_score(window: &WindowStats, targets: ZoneSet) -> f64 {
    clamp_score(100.0 * window.fraction_in(targets))
}

/// Duration accuracy, symmetric in the relative deviation from plan
pub fn duration_score(actual_s: f64, planned_s: f64) -> f64 {
    if planned_s <= 0.0 || !actual_s.is_finite() {
        return 0.0;
    }

    let deviation = (actual_s / planned_s - 1.0).abs();

    let score = if deviation <= 0.05 {
        100.0
    } else if deviation <= 0.20 {
        interpolate(deviation, 0.05, 0.20, 100.0, 80.0)
    } else if deviation <= 0.40 {
        interpolate(deviation, 0.20, 0.40, 80.0, 50.0)
    } else if deviation <= 0.60 {
        interpolate(deviation, 0.40, 0.60, 50.0, 0.0)
    } else {
        0.0
    };

    clamp_score(score)
}

fn interpolate(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    y0 + (x - x0) / (x1 - x0) * (y1 - y0)
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{MatchKind, MatchQuality, MatchedEffort};
    use crate::models::PlannedSegment;
    use crate::zones::{Zone, ZoneClassifier};
    use proptest::prelude::*;

    fn window(active_s: f64, avg_pct: f64, zone_seconds: [f64; 5]) -> WindowStats {
        WindowStats {
            start_index: 0,
            end_index: active_s as usize,
            start_s: 0.0,
            end_s: active_s,
            active_s,
            avg_value: avg_pct * 2.5,
            avg_pct,
            zone_seconds,
        }
    }

    fn result(segment: PlannedSegment, effort: Option<WindowStats>) -> MatchResult {
        let targets = ZoneClassifier::power(250.0).target_zones(&segment);
        MatchResult {
            segment_index: 0,
            segment,
            target_zones: targets,
            planned_start_s: 0.0,
            actual_start_s: effort.map(|w| w.start_s),
            effort: effort.map(|window| MatchedEffort {
                kind: MatchKind::Single,
                blocks: 0..1,
                zone: window.majority_zone(),
                window,
            }),
            dissimilarity: 0.0,
            confidence: 1.0,
            quality: MatchQuality::Strong,
        }
    }

    #[test]
    fn test_power_score_asymmetry() {
        assert_eq!(power_score(90.0, 88.0, 93.0), 100.0);
        assert_eq!(power_score(88.0, 88.0, 93.0), 100.0);
        assert_eq!(power_score(93.0, 88.0, 93.0), 100.0);
        // 5 points under costs 10, 5 points over costs 5
        assert_eq!(power_score(83.0, 88.0, 93.0), 90.0);
        assert_eq!(power_score(98.0, 88.0, 93.0), 95.0);
        assert_eq!(power_score(20.0, 88.0, 93.0), 0.0);
        assert_eq!(power_score(400.0, 88.0, 93.0), 0.0);
        assert_eq!(power_score(f64::NAN, 88.0, 93.0), 0.0);
    }

    #[test]
    fn test_duration_bands() {
        assert_eq!(duration_score(600.0, 600.0), 100.0);
        assert_eq!(duration_score(630.0, 600.0), 100.0);
        assert_eq!(duration_score(570.0, 600.0), 100.0);
        assert!((duration_score(720.0, 600.0) - 80.0).abs() < 1e-9);
        assert!((duration_score(480.0, 600.0) - 80.0).abs() < 1e-9);
        assert!((duration_score(840.0, 600.0) - 50.0).abs() < 1e-9);
        assert!((duration_score(360.0, 600.0) - 50.0).abs() < 1e-9);
        assert!((duration_score(660.0, 600.0) - 93.333_333_333).abs() < 1e-6);
        assert_eq!(duration_score(960.0, 600.0), 0.0);
        assert_eq!(duration_score(0.0, 600.0), 0.0);
        assert_eq!(duration_score(600.0, 0.0), 0.0);
    }

    #[test]
    fn test_zone_score_uses_target_zones() {
        let stats = window(600.0, 90.0, [0.0, 0.0, 300.0, 150.0, 150.0]);
        assert_eq!(zone_score(&stats, ZoneSet::new(Zone::Z3, Zone::Z4)), 75.0);
        assert_eq!(zone_score(&stats, ZoneSet::single(Zone::Z1)), 0.0);
        assert_eq!(ZoneDiscipline::from_score(75.0), ZoneDiscipline::Good);
        assert_eq!(ZoneDiscipline::from_score(49.9), ZoneDiscipline::Poor);
    }

    #[test]
    fn test_weight_table() {
        for weights in [
            ScoreWeights::WARMUP_COOLDOWN,
            ScoreWeights::INTERVAL,
            ScoreWeights::RECOVERY,
            ScoreWeights::STEADY,
        ] {
            assert!((weights.power + weights.zone + weights.duration - 1.0).abs() < 1e-12);
        }
        assert_eq!(ScoreWeights::for_type(SegmentType::Cooldown), ScoreWeights::WARMUP_COOLDOWN);
        assert_eq!(ScoreWeights::for_type(SegmentType::Interval).power, 0.45);
    }

    #[test]
    fn test_interval_weighted_total() {
        // 10' @ 88-93%, ridden for 11' at 91.2% with 72.5% of the time in zone
        let segment = PlannedSegment::new(SegmentType::Interval, 88.0, 93.0, 600.0);
        let stats = window(660.0, 91.2, [0.0, 0.0, 300.0, 178.5, 181.5]);
        let score = SegmentScorer::default().score(&result(segment, Some(stats)));

        assert_eq!(score.power_score, 100.0);
        assert!((score.zone_score - 72.5).abs() < 1e-9);
        assert!((score.weighted_total - 88.0).abs() < 1e-6);
        assert!(score.is_matched());
    }

    #[test]
    fn test_unmatched_segment_floor() {
        let segment = PlannedSegment::new(SegmentType::Recovery, 50.0, 55.0, 300.0);
        let score = SegmentScorer::default().score(&result(segment.clone(), None));

        assert_eq!(score.power_score, 0.0);
        assert_eq!(score.zone_score, 0.0);
        assert_eq!(score.duration_score, 0.0);
        assert_eq!(score.weighted_total, 0.0);
        assert!(!score.is_matched());

        let lenient = SegmentScorer::new(ScoringConfig {
            unmatched_score: 20.0,
        });
        assert!((lenient.score(&result(segment, None)).weighted_total - 20.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_scores_within_bounds(
            avg_pct in -50.0f64..400.0,
            min_pct in 30.0f64..120.0,
            width in 0.0f64..30.0,
            actual in 0.0f64..7200.0,
            planned in 1.0f64..3600.0,
        ) {
            let power = power_score(avg_pct, min_pct, min_pct + width);
            let duration = duration_score(actual, planned);
            prop_assert!((0.0..=100.0).contains(&power));
            prop_assert!((0.0..=100.0).contains(&duration));

            for weights in [ScoreWeights::INTERVAL, ScoreWeights::RECOVERY] {
                let total = weights.combine(power, 50.0, duration);
                prop_assert!((0.0..=100.0).contains(&total));
            }
        }

        #[test]
        fn prop_duration_symmetric(deviation in 0.0f64..0.9) {
            let over = duration_score(600.0 * (1.0 + deviation), 600.0);
            let under = duration_score(600.0 * (1.0 - deviation), 600.0);
            prop_assert!((over - under).abs() < 1e-6);
        }
    }
}
