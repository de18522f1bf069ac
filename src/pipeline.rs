// THEORY:
// The `pipeline` module is the top-level API of the motion-analytics engine.
// It wires the layered stages into a single call:
//
//   Ingest → Identity → Trajectories → Kinematics → Frame summaries → Possessions
//
// Data flows strictly forward; no stage looks back at an earlier one. Nothing
// in here is fatal once the input has been read: empty inputs produce empty
// reports, and every record dropped along the way shows up in `PipelineStats`.

use crate::core_modules::detection::RawDetection;
use crate::core_modules::frame_summary::{Aggregation, FrameAggregator};
use crate::core_modules::identity::{IdentityResolver, resolver_for};
use crate::core_modules::ingest::{self, IngestStats};
use crate::core_modules::kinematics;
use crate::core_modules::possession::{self, BreakRule, SegmentationStats};
use crate::core_modules::trajectory::{self, TrajectorySet};
use crate::error::Result;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

// Re-export key data structures for the public API.
pub use crate::config::AnalysisConfig;
pub use crate::core_modules::frame_summary::{FrameSummary, SpreadMetric};
pub use crate::core_modules::kinematics::KinematicSample;
pub use crate::core_modules::possession::Possession;

/// Counters describing what happened to the input at every stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub ingest: IngestStats,
    pub duplicate_detections: usize,
    pub players: usize,
    pub samples_extracted: usize,
    pub outlier_samples: usize,
    pub frames_summarized: usize,
    pub segmentation: SegmentationStats,
}

/// Everything one analysis run produced.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Raw kinematic samples, including outliers, ordered by `(frame, player)`.
    pub samples: Vec<KinematicSample>,
    pub summaries: Vec<FrameSummary>,
    /// Emitted possessions, ordered by start frame.
    pub possessions: Vec<Possession>,
    pub stats: PipelineStats,
}

/// The main, top-level struct for the analytics engine.
pub struct PossessionPipeline {
    config: AnalysisConfig,
    resolver: Box<dyn IdentityResolver>,
}

impl PossessionPipeline {
    /// Validates the configuration and builds the identity resolver it names.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let resolver = resolver_for(config.identity.strategy, config.identity.naive_player_count);
        Ok(Self { config, resolver })
    }

    /// Substitutes a custom identity resolver, e.g. a real multi-object tracker.
    pub fn with_resolver(config: AnalysisConfig, resolver: Box<dyn IdentityResolver>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, resolver })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Reads a detection table and runs the full analysis on it.
    pub fn run_file(&self, path: &Path) -> Result<PipelineReport> {
        let (detections, ingest_stats) = ingest::read_detections_path(path)?;
        Ok(self.run_with_stats(detections, ingest_stats))
    }

    /// Runs the full analysis on in-memory detector output.
    pub fn run(&self, detections: Vec<RawDetection>) -> PipelineReport {
        let stats = IngestStats {
            rows_read: detections.len(),
            ..IngestStats::default()
        };
        self.run_with_stats(detections, stats)
    }

    fn run_with_stats(&self, detections: Vec<RawDetection>, ingest_stats: IngestStats) -> PipelineReport {
        let (trajectories, stats) = self.build_trajectories(detections, ingest_stats);

        // Stage 3: Kinematics
        let samples = kinematics::extract_all(&trajectories.trajectories);

        self.summarize_and_segment(samples, stats)
    }

    /// Stages 1 and 2: filtering, identity resolution and trajectory building.
    pub(crate) fn build_trajectories(
        &self,
        detections: Vec<RawDetection>,
        mut ingest_stats: IngestStats,
    ) -> (TrajectorySet, PipelineStats) {
        // Stage 1: Ingest filtering & identity
        let kept = ingest::filter_detections(detections, &self.config.ingest, &mut ingest_stats);
        info!(
            kept = ingest_stats.kept,
            dropped = ingest_stats.dropped(),
            "Filtered detections"
        );
        let resolved = self.resolver.resolve(kept);

        // Stage 2: Trajectories
        let trajectories = trajectory::build_trajectories(&resolved);

        let stats = PipelineStats {
            ingest: ingest_stats,
            duplicate_detections: trajectories.duplicates_dropped,
            players: trajectories.trajectories.len(),
            ..PipelineStats::default()
        };
        (trajectories, stats)
    }

    /// Stages 4 and 5: frame aggregation and possession segmentation.
    pub(crate) fn summarize_and_segment(
        &self,
        samples: Vec<KinematicSample>,
        mut stats: PipelineStats,
    ) -> PipelineReport {
        stats.samples_extracted = samples.len();

        // Stage 4: Frame aggregation
        let aggregator = FrameAggregator::new(self.config.spread_metric, self.config.kinematics.outlier_caps());
        let Aggregation {
            summaries,
            outliers_rejected,
        } = aggregator.aggregate(&samples);
        stats.outlier_samples = outliers_rejected;
        stats.frames_summarized = summaries.len();

        if summaries.is_empty() {
            warn!("No usable frame summaries; returning an empty possession list");
        }

        // Stage 5: Possession segmentation
        let rule = BreakRule::new(&self.config.segmenter, self.config.spread_metric);
        let (possessions, segmentation) = possession::segment(rule, &summaries);
        stats.segmentation = segmentation;

        info!(
            players = stats.players,
            samples = stats.samples_extracted,
            frames = stats.frames_summarized,
            possessions = segmentation.possessions_emitted,
            discarded = segmentation.possessions_discarded,
            "Analysis complete"
        );

        PipelineReport {
            samples,
            summaries,
            possessions,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::BoundingBox;
    use crate::core_modules::identity::IdentityStrategy;

    fn person(frame_index: u64, player_id: u32, x: f64, y: f64) -> RawDetection {
        RawDetection {
            frame_index,
            player_id: Some(player_id),
            bbox: BoundingBox::new(x - 1.0, y - 1.0, x + 1.0, y + 1.0),
            confidence: 0.9,
            label: "person".to_string(),
        }
    }

    fn config(min_possession_length: usize) -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.segmenter.min_possession_length = min_possession_length;
        config.kinematics.workers = 2;
        config
    }

    #[test]
    fn empty_input_produces_an_empty_report() {
        let pipeline = PossessionPipeline::new(config(1)).unwrap();
        let report = pipeline.run(Vec::new());

        assert!(report.samples.is_empty());
        assert!(report.summaries.is_empty());
        assert!(report.possessions.is_empty());
        assert_eq!(report.stats, PipelineStats::default());
    }

    #[test]
    fn two_players_walking_form_one_possession() {
        let mut detections = Vec::new();
        for frame in 0..12 {
            detections.push(person(frame, 1, 100.0 + frame as f64, 100.0));
            detections.push(person(frame, 2, 200.0 + frame as f64, 100.0));
        }

        let report = PossessionPipeline::new(config(5)).unwrap().run(detections);

        assert_eq!(report.stats.players, 2);
        assert_eq!(report.stats.samples_extracted, 22);
        assert_eq!(report.summaries.len(), 11);
        assert_eq!(report.possessions.len(), 1);

        let p = &report.possessions[0];
        assert_eq!((p.start_frame, p.end_frame), (1, 11));
        assert_eq!(p.avg_speed, 1.0);
        assert_eq!(p.avg_spread, 50.0);
    }

    #[test]
    fn low_confidence_and_foreign_labels_never_reach_trajectories() {
        let mut ball = person(0, 9, 0.0, 0.0);
        ball.label = "sports ball".to_string();
        let mut blurry = person(1, 9, 0.0, 0.0);
        blurry.confidence = 0.3;

        let report = PossessionPipeline::new(config(1)).unwrap().run(vec![ball, blurry]);
        assert_eq!(report.stats.ingest.non_person, 1);
        assert_eq!(report.stats.ingest.low_confidence, 1);
        assert_eq!(report.stats.players, 0);
        assert!(report.possessions.is_empty());
    }

    #[test]
    fn naive_identity_is_selected_from_config() {
        let mut cfg = config(1);
        cfg.identity.strategy = IdentityStrategy::Naive;
        cfg.identity.naive_player_count = 1;

        let detections: Vec<RawDetection> = (0..3)
            .map(|frame| RawDetection {
                player_id: None,
                ..person(frame, 0, 10.0, 10.0)
            })
            .collect();
        let report = PossessionPipeline::new(cfg).unwrap().run(detections);
        assert_eq!(report.stats.players, 1);
        assert_eq!(report.stats.samples_extracted, 2);
    }

    #[test]
    fn invalid_configuration_is_rejected_up_front() {
        let mut cfg = config(1);
        cfg.segmenter.speed_drop_threshold = -0.1;
        assert!(PossessionPipeline::new(cfg).is_err());
    }
}
