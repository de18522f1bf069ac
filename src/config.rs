// THEORY:
// Every heuristic constant the engine uses lives here, in one explicit
// structure handed to the pipeline at construction. Nothing in the algorithms
// reads a module-level threshold. The structure deserializes from YAML with
// every field optional, so a config file only needs to name what it changes.

use crate::core_modules::frame_summary::SpreadMetric;
use crate::core_modules::identity::IdentityStrategy;
use crate::core_modules::kinematics::OutlierCaps;
use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which detector rows participate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Detections must be strictly above this confidence.
    pub confidence_threshold: f64,
    /// Class label that marks a player. Compared case-insensitively.
    pub person_label: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            person_label: "person".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub strategy: IdentityStrategy,
    /// Modulus used by the naive identity strategy.
    pub naive_player_count: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            strategy: IdentityStrategy::Tracker,
            naive_player_count: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsConfig {
    /// Samples at or above this speed (pixels/frame) are outliers.
    pub max_speed: f64,
    /// Samples whose |acceleration| is at or above this are outliers.
    pub max_abs_acceleration: f64,
    /// Speed above which a sample is labelled `fast`.
    pub fast_speed_threshold: f64,
    /// Worker count for the parallel pipeline.
    pub workers: usize,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            max_speed: 100.0,
            max_abs_acceleration: 100.0,
            fast_speed_threshold: 4.0,
            workers: num_cpus::get(),
        }
    }
}

impl KinematicsConfig {
    pub fn outlier_caps(&self) -> OutlierCaps {
        OutlierCaps {
            max_speed: self.max_speed,
            max_abs_acceleration: self.max_abs_acceleration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub frame_gap_threshold: u64,
    /// `None` uses the default calibrated for the configured spread metric.
    pub spacing_change_threshold: Option<f64>,
    pub speed_drop_threshold: f64,
    pub min_possession_length: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            frame_gap_threshold: 30,
            spacing_change_threshold: None,
            speed_drop_threshold: 0.8,
            min_possession_length: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub clusters: usize,
    pub max_iterations: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            clusters: 4,
            max_iterations: 300,
        }
    }
}

/// Complete configuration of an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    pub ingest: IngestConfig,
    pub identity: IdentityConfig,
    pub kinematics: KinematicsConfig,
    pub spread_metric: SpreadMetric,
    pub segmenter: SegmenterConfig,
    pub clustering: ClusterConfig,
}

impl AnalysisConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Rejects thresholds the algorithms cannot work with.
    pub fn validate(&self) -> Result<()> {
        let non_negative = |name: &str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(AnalysisError::InvalidConfig(format!(
                    "{name} must be a finite, non-negative number (got {value})"
                )))
            }
        };

        non_negative("ingest.confidence_threshold", self.ingest.confidence_threshold)?;
        non_negative("kinematics.max_speed", self.kinematics.max_speed)?;
        non_negative("kinematics.max_abs_acceleration", self.kinematics.max_abs_acceleration)?;
        non_negative("kinematics.fast_speed_threshold", self.kinematics.fast_speed_threshold)?;
        if let Some(threshold) = self.segmenter.spacing_change_threshold {
            non_negative("segmenter.spacing_change_threshold", threshold)?;
        }

        if !(0.0..=1.0).contains(&self.segmenter.speed_drop_threshold) {
            return Err(AnalysisError::InvalidConfig(format!(
                "segmenter.speed_drop_threshold must lie in [0, 1] (got {})",
                self.segmenter.speed_drop_threshold
            )));
        }
        if self.identity.naive_player_count == 0 {
            return Err(AnalysisError::InvalidConfig(
                "identity.naive_player_count must be at least 1".to_string(),
            ));
        }
        if self.kinematics.workers == 0 {
            return Err(AnalysisError::InvalidConfig(
                "kinematics.workers must be at least 1".to_string(),
            ));
        }
        if self.clustering.clusters == 0 {
            return Err(AnalysisError::InvalidConfig(
                "clustering.clusters must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AnalysisConfig::default();
        assert_eq!(config.ingest.confidence_threshold, 0.6);
        assert_eq!(config.segmenter.frame_gap_threshold, 30);
        assert_eq!(config.segmenter.speed_drop_threshold, 0.8);
        assert_eq!(config.segmenter.min_possession_length, 10);
        assert_eq!(config.segmenter.spacing_change_threshold, None);
        assert_eq!(config.kinematics.outlier_caps(), OutlierCaps::default());
        assert_eq!(config.spread_metric, SpreadMetric::MeanDistance);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn shipped_sample_config_matches_defaults() {
        let config = AnalysisConfig::from_yaml_str(include_str!("../court_vision.yaml")).unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = "
spread_metric: bounding_box_area
segmenter:
  min_possession_length: 3
identity:
  strategy: naive
";
        let config = AnalysisConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.spread_metric, SpreadMetric::BoundingBoxArea);
        assert_eq!(config.segmenter.min_possession_length, 3);
        assert_eq!(config.segmenter.frame_gap_threshold, 30);
        assert_eq!(config.identity.strategy, IdentityStrategy::Naive);
        assert_eq!(config.identity.naive_player_count, 10);
    }

    #[test]
    fn nonsensical_thresholds_are_rejected() {
        let mut config = AnalysisConfig::default();
        config.segmenter.speed_drop_threshold = 1.5;
        assert!(matches!(config.validate(), Err(AnalysisError::InvalidConfig(_))));

        let mut config = AnalysisConfig::default();
        config.segmenter.spacing_change_threshold = Some(-1.0);
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.kinematics.max_speed = f64::NAN;
        assert!(config.validate().is_err());

        assert!(AnalysisConfig::from_yaml_str("clustering:\n  clusters: 0\n").is_err());
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(matches!(
            AnalysisConfig::from_yaml_str("segmenter: [1, 2"),
            Err(AnalysisError::Yaml(_))
        ));
    }
}
