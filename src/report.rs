//! Compliance report aggregation
//!
//! The overall score weights each segment by its *planned* duration, so a
//! skipped or shortened segment costs in proportion to its intended
//! importance. Every number in the report is rounded to one decimal place;
//! the grade is read from the rounded score.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::matching::MatchQuality;
use crate::models::{Channel, Repetition, SegmentType};
use crate::scoring::{SegmentScore, ZoneDiscipline};

/// Letter grade of the overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// A 90-100, B 80-89, C 70-79, D 60-69, F below 60
    pub fn from_score(score: Decimal) -> Self {
        if score >= dec!(90) {
            Grade::A
        } else if score >= dec!(80) {
            Grade::B
        } else if score >= dec!(70) {
            Grade::C
        } else if score >= dec!(60) {
            Grade::D
        } else {
            Grade::F
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Grade::A => "Excellent execution",
            Grade::B => "Good execution",
            Grade::C => "Fair execution",
            Grade::D => "Poor execution",
            Grade::F => "Workout not completed as planned",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(letter)
    }
}

/// One row of the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentReport {
    #[serde(rename = "type")]
    pub segment_type: SegmentType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition: Option<Repetition>,

    pub matched: bool,

    #[serde(with = "rust_decimal::serde::float")]
    pub power_score: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub zone_score: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub duration_score: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub weighted_total: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub planned_duration_s: Decimal,

    #[serde(with = "rust_decimal::serde::float_option")]
    pub actual_duration_s: Option<Decimal>,

    /// Offset of the matched effort from the start of the activity
    #[serde(with = "rust_decimal::serde::float_option")]
    pub actual_start_s: Option<Decimal>,

    /// Average raw intensity of the matched effort, percent of threshold
    #[serde(with = "rust_decimal::serde::float_option")]
    pub avg_intensity_pct: Option<Decimal>,

    pub match_quality: MatchQuality,

    #[serde(with = "rust_decimal::serde::float")]
    pub confidence: Decimal,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_discipline: Option<ZoneDiscipline>,
}

/// Final output of one analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workout_name: Option<String>,
    pub channel: Channel,
    pub segments: Vec<SegmentReport>,
    #[serde(with = "rust_decimal::serde::float")]
    pub overall_score: Decimal,
    pub grade: Grade,
    pub matched_segments: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_planned_s: Decimal,
}

impl ComplianceReport {
    pub fn unmatched_segments(&self) -> usize {
        self.segments.len() - self.matched_segments
    }

    pub fn overall_score_f64(&self) -> f64 {
        self.overall_score.to_f64().unwrap_or(0.0)
    }

    pub fn to_json_pretty(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Folds segment scores into a report
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAggregator;

impl ReportAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Planned-duration weighted mean of the segment totals, 0 for an empty list
    pub fn overall_score(scores: &[SegmentScore]) -> f64 {
        let total_planned: f64 = scores.iter().map(|s| s.planned_duration_s()).sum();
        if total_planned <= 0.0 {
            return 0.0;
        }

        let weighted: f64 = scores
            .iter()
            .map(|s| s.weighted_total * s.planned_duration_s())
            .sum();

        (weighted / total_planned).clamp(0.0, 100.0)
    }

    pub fn aggregate(
        &self,
        scores: &[SegmentScore],
        channel: Channel,
        workout_name: Option<String>,
    ) -> ComplianceReport {
        let overall_score = round1(Self::overall_score(scores));
        let grade = Grade::from_score(overall_score);
        let total_planned: f64 = scores.iter().map(|s| s.planned_duration_s()).sum();

        let segments: Vec<SegmentReport> = scores.iter().map(segment_row).collect();
        let matched_segments = segments.iter().filter(|s| s.matched).count();

        debug!(
            segments = segments.len(),
            matched = matched_segments,
            overall_score = %overall_score,
            grade = %grade,
            "aggregated compliance report"
        );

        ComplianceReport {
            workout_name,
            channel,
            segments,
            overall_score,
            grade,
            matched_segments,
            total_planned_s: round1(total_planned),
        }
    }
}

fn segment_row(score: &SegmentScore) -> SegmentReport {
    let result = &score.match_result;
    let segment = &result.segment;
    let effort = result.effort.as_ref();

    SegmentReport {
        segment_type: segment.segment_type,
        name: segment.name.clone(),
        repetition: segment.repetition,
        matched: effort.is_some(),
        power_score: round1(score.power_score),
        zone_score: round1(score.zone_score),
        duration_score: round1(score.duration_score),
        weighted_total: round1(score.weighted_total),
        planned_duration_s: round1(segment.planned_duration_s),
        actual_duration_s: effort.map(|e| round1(e.window.active_s)),
        actual_start_s: result.actual_start_s.map(round1),
        avg_intensity_pct: effort.map(|e| round1(e.window.avg_pct)),
        match_quality: result.quality,
        confidence: round_dp(result.confidence, 2),
        zone_discipline: effort.map(|_| score.zone_discipline),
    }
}

pub(crate) fn round1(value: f64) -> Decimal {
    round_dp(value, 1)
}

fn round_dp(value: f64, dp: u32) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or_default()
        .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::MatchResult;
    use crate::models::PlannedSegment;
    use crate::scoring::ScoreWeights;
    use crate::zones::{Zone, ZoneSet};

    fn score(segment_type: SegmentType, planned_s: f64, total: f64) -> SegmentScore {
        let segment = PlannedSegment::new(segment_type, 50.0, 60.0, planned_s);
        SegmentScore {
            power_score: total,
            zone_score: total,
            duration_score: total,
            weighted_total: total,
            weights: ScoreWeights::for_type(segment_type),
            zone_discipline: ZoneDiscipline::from_score(total),
            match_result: MatchResult {
                segment_index: 0,
                segment,
                target_zones: ZoneSet::new(Zone::Z1, Zone::Z2),
                planned_start_s: 0.0,
                actual_start_s: None,
                effort: None,
                dissimilarity: 0.6,
                confidence: 0.0,
                quality: MatchQuality::Unmatched,
            },
        }
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(Grade::from_score(dec!(100)), Grade::A);
        assert_eq!(Grade::from_score(dec!(90.0)), Grade::A);
        assert_eq!(Grade::from_score(dec!(89.9)), Grade::B);
        assert_eq!(Grade::from_score(dec!(80)), Grade::B);
        assert_eq!(Grade::from_score(dec!(79.9)), Grade::C);
        assert_eq!(Grade::from_score(dec!(70)), Grade::C);
        assert_eq!(Grade::from_score(dec!(69.9)), Grade::D);
        assert_eq!(Grade::from_score(dec!(60)), Grade::D);
        assert_eq!(Grade::from_score(dec!(59.9)), Grade::F);
        assert_eq!(Grade::from_score(Decimal::ZERO), Grade::F);
        assert_eq!(Grade::B.to_string(), "B");
    }

    #[test]
    fn test_overall_uses_planned_duration() {
        // 10' at 100 and 30' at 60 -> (600*100 + 1800*60) / 2400 = 70
        let scores = vec![
            score(SegmentType::Interval, 600.0, 100.0),
            score(SegmentType::Steady, 1800.0, 60.0),
        ];
        let report = ReportAggregator::new().aggregate(&scores, Channel::Power, None);

        assert_eq!(report.overall_score, dec!(70.0));
        assert_eq!(report.grade, Grade::C);
        assert_eq!(report.total_planned_s, dec!(2400));
    }

    #[test]
    fn test_grade_reads_rounded_score() {
        let scores = vec![score(SegmentType::Interval, 600.0, 89.96)];
        let report = ReportAggregator::new().aggregate(&scores, Channel::Power, None);

        assert_eq!(report.overall_score, dec!(90.0));
        assert_eq!(report.grade, Grade::A);
    }

    #[test]
    fn test_all_unmatched_scores_zero() {
        let scores = vec![
            score(SegmentType::Warmup, 600.0, 0.0),
            score(SegmentType::Interval, 300.0, 0.0),
        ];
        let report = ReportAggregator::new().aggregate(&scores, Channel::Power, Some("Empty".into()));

        assert_eq!(report.overall_score, Decimal::ZERO);
        assert_eq!(report.grade, Grade::F);
        assert_eq!(report.matched_segments, 0);
        assert_eq!(report.unmatched_segments(), 2);
        assert!(report.segments.iter().all(|s| s.zone_discipline.is_none()));
    }

    #[test]
    fn test_empty_score_list() {
        assert_eq!(ReportAggregator::overall_score(&[]), 0.0);
    }

    #[test]
    fn test_json_output_shape() {
        let scores = vec![score(SegmentType::Recovery, 300.0, 0.0)];
        let report = ReportAggregator::new().aggregate(&scores, Channel::HeartRate, None);
        let json: serde_json::Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();

        assert_eq!(json["grade"], "F");
        assert_eq!(json["channel"], "heart_rate");
        assert_eq!(json["overall_score"], 0.0);
        let row = &json["segments"][0];
        assert_eq!(row["type"], "recovery");
        assert_eq!(row["matched"], false);
        assert_eq!(row["weighted_total"], 0.0);
        assert_eq!(row["match_quality"], "unmatched");
        assert!(row["actual_duration_s"].is_null());
        assert!(json.get("workout_name").is_none());
    }
}
