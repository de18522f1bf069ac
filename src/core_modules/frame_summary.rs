// THEORY:
// The frame aggregator collapses everything known about one frame into a
// handful of scalars: how fast the players move on average, how much they
// accelerate, and how spread out they are. It plays the same role for
// kinematic samples that region growing plays for anomalous chunks: many small
// per-entity readings in, one summary of the whole scene out.
//
// Spread has two historical definitions that are *not* interchangeable:
// -   `MeanDistance`: the mean Euclidean distance of every centroid from the
//     centroid-of-centroids, in pixels. This is the canonical metric.
// -   `BoundingBoxArea`: the area of the axis-aligned box enclosing all
//     centroids, in square pixels.
// Because their magnitudes differ by orders, each metric carries its own
// default spacing-change threshold for the segmenter.

use crate::core_modules::detection::Centroid;
use crate::core_modules::kinematics::{KinematicSample, OutlierCaps};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpreadMetric {
    #[default]
    MeanDistance,
    BoundingBoxArea,
}

impl SpreadMetric {
    /// Measures the dispersion of a set of centroids. An empty set has zero spread.
    pub fn measure(&self, centroids: &[Centroid]) -> f64 {
        match self {
            SpreadMetric::MeanDistance => match Centroid::mean_of(centroids) {
                Some(center) => {
                    centroids.iter().map(|c| c.distance(&center)).sum::<f64>() / centroids.len() as f64
                }
                None => 0.0,
            },
            SpreadMetric::BoundingBoxArea => {
                if centroids.is_empty() {
                    return 0.0;
                }
                let (min_x, max_x, min_y, max_y) = centroids.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
                    |(min_x, max_x, min_y, max_y), c| {
                        (min_x.min(c.x), max_x.max(c.x), min_y.min(c.y), max_y.max(c.y))
                    },
                );
                (max_x - min_x) * (max_y - min_y)
            }
        }
    }

    /// Spacing-change threshold calibrated for this metric's magnitude.
    pub fn default_spacing_threshold(&self) -> f64 {
        match self {
            SpreadMetric::MeanDistance => 100.0,
            SpreadMetric::BoundingBoxArea => 50_000.0,
        }
    }
}

/// Scalar description of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameSummary {
    pub frame_index: u64,
    pub spread: f64,
    pub mean_speed: f64,
    pub mean_acceleration: f64,
    /// Number of players whose samples contributed to this frame.
    pub player_count: usize,
}

/// Result of aggregating a sample set.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub summaries: Vec<FrameSummary>,
    pub outliers_rejected: usize,
}

/// Sanitizes kinematic samples and summarises them frame by frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameAggregator {
    metric: SpreadMetric,
    caps: OutlierCaps,
}

impl FrameAggregator {
    pub fn new(metric: SpreadMetric, caps: OutlierCaps) -> Self {
        Self { metric, caps }
    }

    /// Produces one summary per frame that has at least one admissible
    /// sample, ordered by ascending frame index. Input order does not matter.
    pub fn aggregate(&self, samples: &[KinematicSample]) -> Aggregation {
        let (mut admitted, outliers_rejected) = self.caps.sanitize(samples);
        admitted.sort_by_key(|s| (s.frame_index, s.player_id));

        let summaries: Vec<FrameSummary> = admitted
            .chunk_by(|a, b| a.frame_index == b.frame_index)
            .map(|frame| self.summarize(frame))
            .collect();

        debug!(
            frames = summaries.len(),
            outliers_rejected,
            metric = ?self.metric,
            "Aggregated kinematic samples into frame summaries"
        );

        Aggregation {
            summaries,
            outliers_rejected,
        }
    }

    fn summarize(&self, frame: &[KinematicSample]) -> FrameSummary {
        let n = frame.len() as f64;
        let centroids: Vec<Centroid> = frame.iter().map(|s| s.position).collect();
        FrameSummary {
            frame_index: frame[0].frame_index,
            spread: self.metric.measure(&centroids),
            mean_speed: frame.iter().map(|s| s.speed).sum::<f64>() / n,
            mean_acceleration: frame.iter().map(|s| s.acceleration).sum::<f64>() / n,
            player_count: frame.len(),
        }
    }
}
