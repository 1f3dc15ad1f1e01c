//! Unified error hierarchy for plancheck
//!
//! Every failure the engine can report is a validation-time failure raised
//! before the pipeline runs. The analysis itself is a pure computation, so the
//! same input always fails the same way.

use thiserror::Error;

use crate::models::Channel;

/// Top-level error type for all plancheck operations
#[derive(Debug, Error)]
pub enum ComplianceError {
    /// The sample stream cannot be analyzed
    #[error("Insufficient data: {0}")]
    InsufficientData(#[from] InsufficientDataError),

    /// The planned workout is malformed
    #[error("Invalid plan: {0}")]
    InvalidPlan(#[from] InvalidPlanError),

    /// The requested channel has no data or no threshold to classify against
    #[error("Channel mismatch: {0}")]
    ChannelMismatch(#[from] ChannelMismatchError),

    /// Threshold profile values are unusable
    #[error("Invalid threshold profile: {0}")]
    InvalidProfile(String),

    /// Activity streams are structurally broken
    #[error("Invalid activity stream: {0}")]
    InvalidStream(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON input/output errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reasons a stream holds too little data to analyze
#[derive(Debug, Error)]
pub enum InsufficientDataError {
    /// No samples at all
    #[error("{channel} stream is empty")]
    EmptyStream { channel: Channel },

    /// Samples exist but none carries a usable value
    #[error("{channel} stream has no usable samples ({dropped} dropped)")]
    NoUsableSamples { channel: Channel, dropped: usize },
}

/// Reasons a planned workout is rejected
#[derive(Debug, Error)]
pub enum InvalidPlanError {
    /// The plan has nothing to compare against
    #[error("plan has no segments")]
    NoSegments,

    /// A segment lasts zero or negative time
    #[error("segment {index} has non-positive duration {duration_s}s")]
    NonPositiveDuration { index: usize, duration_s: f64 },

    /// A target range whose upper bound is below its lower bound
    #[error("segment {index} has target range {min_pct}%..{max_pct}% with max < min")]
    InvertedRange {
        index: usize,
        min_pct: f64,
        max_pct: f64,
    },

    /// Negative or non-finite target percentages
    #[error("segment {index} has invalid target {value}%")]
    InvalidTarget { index: usize, value: f64 },

    /// A repeat structure that repeats nothing
    #[error("entry {index} repeats zero times")]
    ZeroRepeat { index: usize },
}

/// Reasons the requested channel cannot be analyzed
#[derive(Debug, Error)]
pub enum ChannelMismatchError {
    /// The activity carries no stream for the channel
    #[error("activity has no {channel} stream")]
    MissingStream { channel: Channel },

    /// The athlete profile carries no threshold for the channel
    #[error("athlete profile has no {channel} threshold")]
    MissingThreshold { channel: Channel },
}

/// Result type alias for plancheck operations
pub type Result<T> = std::result::Result<T, ComplianceError>;

impl ComplianceError {
    /// Check if error is retryable
    ///
    /// Analysis failures are deterministic; only I/O around them can succeed
    /// on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ComplianceError::Io(_))
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ComplianceError::InsufficientData(_) => ErrorSeverity::Warning,
            ComplianceError::ChannelMismatch(_) => ErrorSeverity::Warning,
            ComplianceError::InvalidPlan(_) => ErrorSeverity::Error,
            ComplianceError::InvalidProfile(_) => ErrorSeverity::Error,
            ComplianceError::InvalidStream(_) => ErrorSeverity::Error,
            ComplianceError::Configuration(_) => ErrorSeverity::Error,
            ComplianceError::Io(_) | ComplianceError::Serialization(_) => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ComplianceError::InsufficientData(_) => "Cannot analyze: no data".to_string(),
            ComplianceError::ChannelMismatch(ChannelMismatchError::MissingStream { channel }) => {
                format!("Activity has no {} data available for analysis", channel)
            }
            ComplianceError::ChannelMismatch(ChannelMismatchError::MissingThreshold {
                channel,
            }) => {
                format!(
                    "Set your {} threshold in your profile before analyzing this channel",
                    channel
                )
            }
            ComplianceError::InvalidPlan(reason) => {
                format!("The planned workout cannot be analyzed: {}", reason)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Error that prevents the analysis
    Error,
    /// The input simply has nothing to analyze
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}
