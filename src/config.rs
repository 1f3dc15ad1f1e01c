use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::blocks::DEFAULT_MIN_BLOCK_S;
use crate::error::ComplianceError;
use crate::logging::LogConfig;
use crate::matching::MatcherConfig;
use crate::scoring::ScoringConfig;
use crate::smoothing::{DEFAULT_MAX_GAP_S, DEFAULT_WINDOW_S};

/// Engine and application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Stream smoothing and gap handling
    pub smoothing: SmoothingSettings,

    /// Effort block detection
    pub blocks: BlockSettings,

    /// Segment alignment tuning
    pub matcher: MatcherConfig,

    /// Scoring settings
    pub scoring: ScoringConfig,

    /// Logging output
    pub logging: LogConfig,
}

/// Stream smoothing settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingSettings {
    /// Trailing rolling-average window in seconds
    pub window_s: f64,

    /// Longest sample spacing still treated as continuous recording
    pub max_gap_s: f64,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            window_s: DEFAULT_WINDOW_S,
            max_gap_s: DEFAULT_MAX_GAP_S,
        }
    }
}

/// Effort block detection settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockSettings {
    /// Blocks shorter than this are merged into a neighbour
    pub min_block_s: f64,
}

impl Default for BlockSettings {
    fn default() -> Self {
        Self {
            min_block_s: DEFAULT_MIN_BLOCK_S,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AnalysisConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("plancheck")
            .join("config.toml")
    }

    /// Load the default configuration file, or defaults when there is none
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> crate::error::Result<()> {
        let positive = [
            ("smoothing.window_s", self.smoothing.window_s),
            ("smoothing.max_gap_s", self.smoothing.max_gap_s),
            ("matcher.unmatched_penalty", self.matcher.unmatched_penalty),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ComplianceError::Configuration(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        let non_negative = [
            ("blocks.min_block_s", self.blocks.min_block_s),
            ("matcher.zone_weight", self.matcher.zone_weight),
            ("matcher.duration_weight", self.matcher.duration_weight),
            ("matcher.combine_penalty", self.matcher.combine_penalty),
            ("matcher.share_penalty", self.matcher.share_penalty),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ComplianceError::Configuration(format!(
                    "{} must not be negative, got {}",
                    name, value
                )));
            }
        }

        if self.matcher.max_combined_blocks == 0 {
            return Err(ComplianceError::Configuration(
                "matcher.max_combined_blocks must be at least 1".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.scoring.unmatched_score) {
            return Err(ComplianceError::Configuration(format!(
                "scoring.unmatched_score must be within 0-100, got {}",
                self.scoring.unmatched_score
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use tempfile::tempdir;

    #[test]
    fn test_config_serialization() {
        let config = AnalysisConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: AnalysisConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            [smoothing]
            window_s = 10.0

            [matcher]
            max_shared_segments = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.smoothing.window_s, 10.0);
        assert_eq!(config.smoothing.max_gap_s, DEFAULT_MAX_GAP_S);
        assert_eq!(config.matcher.max_shared_segments, 2);
        assert_eq!(config.matcher.unmatched_penalty, 0.6);
        assert_eq!(config.blocks.min_block_s, DEFAULT_MIN_BLOCK_S);
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = AnalysisConfig::default();
        original.blocks.min_block_s = 30.0;
        original.logging.level = LogLevel::Debug;

        original.save_to_file(&config_path).unwrap();
        let loaded = AnalysisConfig::load_from_file(&config_path).unwrap();

        assert_eq!(loaded, original);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AnalysisConfig::default();
        assert!(config.validate().is_ok());

        config.smoothing.window_s = 0.0;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.scoring.unmatched_score = 150.0;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.matcher.max_combined_blocks = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[blocks]\nmin_block_s = -5.0\n").unwrap();

        let err = AnalysisConfig::load_from_file(&config_path).unwrap_err();
        assert!(format!("{:#}", err).contains("min_block_s"));
    }

    #[test]
    fn test_missing_file_fails() {
        let temp_dir = tempdir().unwrap();
        assert!(AnalysisConfig::load_from_file(temp_dir.path().join("absent.toml")).is_err());
    }
}
