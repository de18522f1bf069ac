// THEORY:
// The `possession` module is the highest layer of the motion-analytics engine.
// It turns the continuous stream of frame summaries into a discrete narrative
// of possessions: contiguous runs of frames that belong to one phase of play.
//
// The segmenter is a two-state machine. Either a possession is OPEN and
// accumulating frames, or the machine sits between segments. Every incoming
// summary is compared with the previous one and a boundary is declared when
// any of three signals fires:
// 1.  **Frame gap**: the detector lost the scene for too long.
// 2.  **Spacing change**: the spread of the players jumped (collapse or reset).
// 3.  **Speed drop**: mean speed fell by more than a given fraction at once.
// On a boundary the open accumulator is closed and emitted if it is long
// enough, or discarded silently otherwise. The summary that triggered the
// boundary always becomes the first frame of the next possession.
//
// The accumulator is the only mutable state in the pipeline and it is owned
// exclusively by the segmenter.

use crate::config::SegmenterConfig;
use crate::core_modules::frame_summary::{FrameSummary, SpreadMetric};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A closed possession segment with its aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Possession {
    pub start_frame: u64,
    pub end_frame: u64,
    /// Number of distinct frame indexes in the segment.
    pub duration: usize,
    pub avg_speed: f64,
    pub avg_acceleration: f64,
    /// Tables produced with the bounding-box metric name this column `bbox_area`.
    #[serde(alias = "bbox_area")]
    pub avg_spread: f64,
    /// Number of frame summaries accumulated.
    pub frame_count: usize,
}

/// The signal that ended a possession.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    FrameGap,
    SpacingChange,
    SpeedDrop,
}

/// Break thresholds resolved against the spread metric in use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakRule {
    pub frame_gap_threshold: u64,
    pub spacing_change_threshold: f64,
    pub speed_drop_threshold: f64,
    pub min_possession_length: usize,
}

impl BreakRule {
    pub fn new(config: &SegmenterConfig, metric: SpreadMetric) -> Self {
        Self {
            frame_gap_threshold: config.frame_gap_threshold,
            spacing_change_threshold: config
                .spacing_change_threshold
                .unwrap_or_else(|| metric.default_spacing_threshold()),
            speed_drop_threshold: config.speed_drop_threshold,
            min_possession_length: config.min_possession_length,
        }
    }

    /// Checks the transition from `previous` to `current` against each signal in turn.
    pub fn evaluate(&self, previous: &FrameSummary, current: &FrameSummary) -> Option<BreakReason> {
        let frame_gap = current.frame_index.saturating_sub(previous.frame_index);
        let spread_delta = (current.spread - previous.spread).abs();
        let speed_drop_ratio = if previous.mean_speed > 0.0 {
            (previous.mean_speed - current.mean_speed) / previous.mean_speed
        } else {
            0.0
        };

        if frame_gap > self.frame_gap_threshold {
            Some(BreakReason::FrameGap)
        } else if spread_delta > self.spacing_change_threshold {
            Some(BreakReason::SpacingChange)
        } else if speed_drop_ratio > self.speed_drop_threshold {
            Some(BreakReason::SpeedDrop)
        } else {
            None
        }
    }
}

/// The open possession being assembled.
#[derive(Debug, Clone, Default)]
struct Accumulator {
    summaries: Vec<FrameSummary>,
}

impl Accumulator {
    fn push(&mut self, summary: FrameSummary) {
        self.summaries.push(summary);
    }

    fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// Consumes the accumulator, producing a possession when it holds at least `min_length` frames.
    fn close(self, min_length: usize) -> Option<Possession> {
        let frames = &self.summaries;
        if frames.is_empty() || frames.len() < min_length {
            return None;
        }

        let n = frames.len() as f64;
        let mut distinct: Vec<u64> = frames.iter().map(|s| s.frame_index).collect();
        distinct.sort_unstable();
        distinct.dedup();

        Some(Possession {
            start_frame: distinct[0],
            end_frame: distinct[distinct.len() - 1],
            duration: distinct.len(),
            avg_speed: frames.iter().map(|s| s.mean_speed).sum::<f64>() / n,
            avg_acceleration: frames.iter().map(|s| s.mean_acceleration).sum::<f64>() / n,
            avg_spread: frames.iter().map(|s| s.spread).sum::<f64>() / n,
            frame_count: frames.len(),
        })
    }
}

/// Outcome counters for one segmentation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SegmentationStats {
    pub frames_consumed: usize,
    pub out_of_order_skipped: usize,
    pub possessions_emitted: usize,
    pub possessions_discarded: usize,
}

/// Streaming possession segmenter.
#[derive(Debug, Clone)]
pub struct PossessionSegmenter {
    rule: BreakRule,
    open: Accumulator,
    previous: Option<FrameSummary>,
    stats: SegmentationStats,
}

impl PossessionSegmenter {
    pub fn new(rule: BreakRule) -> Self {
        Self {
            rule,
            open: Accumulator::default(),
            previous: None,
            stats: SegmentationStats::default(),
        }
    }

    pub fn from_config(config: &SegmenterConfig, metric: SpreadMetric) -> Self {
        Self::new(BreakRule::new(config, metric))
    }

    pub fn rule(&self) -> &BreakRule {
        &self.rule
    }

    /// Feeds the next frame summary. Returns the possession closed by this
    /// frame, if a break fired and the closed segment was long enough.
    pub fn push(&mut self, summary: FrameSummary) -> Option<Possession> {
        if let Some(previous) = &self.previous {
            if summary.frame_index <= previous.frame_index {
                warn!(
                    frame = summary.frame_index,
                    previous = previous.frame_index,
                    "Ignoring frame summary that does not advance the frame index"
                );
                self.stats.out_of_order_skipped += 1;
                return None;
            }
        }
        self.stats.frames_consumed += 1;

        let mut emitted = None;
        let reason = self
            .previous
            .as_ref()
            .and_then(|previous| self.rule.evaluate(previous, &summary));
        if let Some(reason) = reason {
            debug!(frame = summary.frame_index, ?reason, "Possession break");
            emitted = self.close_open();
        }

        self.open.push(summary);
        self.previous = Some(summary);
        emitted
    }

    /// Closes the final accumulator at end of stream.
    pub fn finish(&mut self) -> Option<Possession> {
        let last = self.close_open();
        self.previous = None;
        last
    }

    pub fn stats(&self) -> SegmentationStats {
        self.stats
    }

    fn close_open(&mut self) -> Option<Possession> {
        let accumulator = std::mem::take(&mut self.open);
        if accumulator.is_empty() {
            return None;
        }
        match accumulator.close(self.rule.min_possession_length) {
            Some(possession) => {
                self.stats.possessions_emitted += 1;
                Some(possession)
            }
            None => {
                self.stats.possessions_discarded += 1;
                None
            }
        }
    }
}

/// Segments a complete sequence of summaries. The sequence is ordered by
/// frame index first; repeated frame indexes keep their first occurrence.
pub fn segment(rule: BreakRule, summaries: &[FrameSummary]) -> (Vec<Possession>, SegmentationStats) {
    let mut ordered = summaries.to_vec();
    ordered.sort_by_key(|s| s.frame_index);
    ordered.dedup_by_key(|s| s.frame_index);

    let (mut segmenter, mut possessions) = ordered.into_iter().fold(
        (PossessionSegmenter::new(rule), Vec::new()),
        |(mut segmenter, mut possessions), summary| {
            possessions.extend(segmenter.push(summary));
            (segmenter, possessions)
        },
    );
    possessions.extend(segmenter.finish());

    if possessions.is_empty() {
        warn!(frames = summaries.len(), "Segmentation produced no possessions");
    }
    (possessions, segmenter.stats())
}
