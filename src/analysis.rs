//! End-to-end compliance analysis
//!
//! Validation runs first and rejects bad input before any computation; the
//! stages after it cannot fail.

use tracing::{debug, info};

use crate::blocks::{EffortBlock, EffortBlockDetector, LabeledStream};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::matching::SegmentMatcher;
use crate::models::{ActivityStreams, Channel, PlannedWorkout, ThresholdProfile};
use crate::report::{ComplianceReport, ReportAggregator};
use crate::scoring::{SegmentScore, SegmentScorer};
use crate::smoothing::StreamSmoother;
use crate::zones::ZoneClassifier;

/// Report plus the intermediate results it was built from
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub report: ComplianceReport,
    pub blocks: Vec<EffortBlock>,
    pub scores: Vec<SegmentScore>,
}

/// Runs classifier, smoother, detector, matcher, scorer and aggregator
#[derive(Debug, Clone, Default)]
pub struct ComplianceAnalyzer {
    config: AnalysisConfig,
}

impl ComplianceAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Score how closely `streams` followed `workout` on `channel`
    pub fn analyze(
        &self,
        profile: &ThresholdProfile,
        workout: &PlannedWorkout,
        streams: &ActivityStreams,
        channel: Channel,
    ) -> Result<ComplianceReport> {
        self.analyze_detailed(profile, workout, streams, channel)
            .map(|outcome| outcome.report)
    }

    pub fn analyze_detailed(
        &self,
        profile: &ThresholdProfile,
        workout: &PlannedWorkout,
        streams: &ActivityStreams,
        channel: Channel,
    ) -> Result<AnalysisOutcome> {
        profile.validate()?;
        let segments = workout.validated_segments()?;
        let classifier = ZoneClassifier::for_channel(profile, channel)?;
        let raw = streams.stream(channel)?;

        debug!(
            channel = %channel,
            threshold = classifier.threshold,
            segments = segments.len(),
            samples = raw.len(),
            "inputs validated"
        );

        let smoothed = StreamSmoother::new(self.config.smoothing.window_s).smooth(&raw)?;
        let labeled = LabeledStream::new(&raw, &smoothed, &classifier, self.config.smoothing.max_gap_s);

        let detected = EffortBlockDetector::new(self.config.blocks.min_block_s).detect(&labeled);
        let blocks: Vec<EffortBlock> = detected.iter().collect();

        let matches = SegmentMatcher::new(&labeled, classifier, self.config.matcher)
            .align(&segments, &blocks);
        let scores = SegmentScorer::new(self.config.scoring).score_all(&matches);
        let report = ReportAggregator::new().aggregate(&scores, channel, workout.name.clone());

        info!(
            channel = %channel,
            blocks = blocks.len(),
            matched = report.matched_segments,
            segments = report.segments.len(),
            overall_score = %report.overall_score,
            grade = %report.grade,
            "workout compliance analyzed"
        );

        Ok(AnalysisOutcome {
            report,
            blocks,
            scores,
        })
    }
}
