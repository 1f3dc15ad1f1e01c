// Library interface for plancheck
// The binary and integration tests use the pipeline through these modules

pub mod analysis;
pub mod batch;
pub mod blocks;
pub mod config;
pub mod error;
pub mod logging;
pub mod matching;
pub mod models;
pub mod report;
pub mod scoring;
pub mod smoothing;
pub mod zones;

// Re-export commonly used types for convenience
pub use analysis::{AnalysisOutcome, ComplianceAnalyzer};
pub use batch::{AnalysisJob, BatchAnalyzer, BatchConfig, BatchSummary};
pub use blocks::{EffortBlock, EffortBlockDetector, LabeledStream};
pub use config::AnalysisConfig;
pub use error::{ComplianceError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use matching::{MatchQuality, MatchResult, SegmentMatcher};
pub use models::*;
pub use report::{ComplianceReport, Grade, ReportAggregator, SegmentReport};
pub use scoring::{SegmentScore, SegmentScorer};
pub use smoothing::StreamSmoother;
pub use zones::{Zone, ZoneClassifier};
