// THEORY:
// The `trajectory` module adds memory to the engine. It takes the stateless,
// per-frame detections and regroups them by player, producing for each player
// an ordered journey through the frames in which they were seen.
//
// Key rules:
// 1.  **Ordering**: every trajectory is sorted by ascending frame index.
// 2.  **One point per frame**: the assumed detector contract is one detection
//     per player per frame. When it is violated, the detection with the highest
//     confidence wins; on a tie the one that arrived first is kept.
// 3.  **Gaps are gaps**: a frame without a detection for a player leaves a hole
//     in the trajectory. Nothing is interpolated.
// Trajectories are rebuilt on every analysis run; nothing persists.

use crate::core_modules::detection::{Centroid, Detection, PlayerId};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryPoint {
    pub frame_index: u64,
    pub centroid: Centroid,
}

/// The ordered position history of one player.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub player_id: PlayerId,
    pub points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Result of grouping detections into trajectories.
#[derive(Debug, Clone, Default)]
pub struct TrajectorySet {
    pub trajectories: BTreeMap<PlayerId, Trajectory>,
    /// Detections discarded because another detection of the same player in
    /// the same frame had higher (or equal, earlier) confidence.
    pub duplicates_dropped: usize,
}

/// Groups detections by player and orders each group by frame.
pub fn build_trajectories(detections: &[Detection]) -> TrajectorySet {
    let mut grouped: BTreeMap<PlayerId, BTreeMap<u64, (f64, Centroid)>> = BTreeMap::new();
    let mut duplicates_dropped = 0;

    for detection in detections {
        let frames = grouped.entry(detection.player_id).or_default();
        match frames.entry(detection.frame_index) {
            Entry::Vacant(slot) => {
                slot.insert((detection.confidence, detection.centroid()));
            }
            Entry::Occupied(mut slot) => {
                duplicates_dropped += 1;
                if detection.confidence > slot.get().0 {
                    slot.insert((detection.confidence, detection.centroid()));
                }
            }
        }
    }

    if duplicates_dropped > 0 {
        debug!(duplicates_dropped, "Resolved duplicate player detections within frames");
    }

    let trajectories = grouped
        .into_iter()
        .map(|(player_id, frames)| {
            let points = frames
                .into_iter()
                .map(|(frame_index, (_, centroid))| TrajectoryPoint { frame_index, centroid })
                .collect();
            (player_id, Trajectory { player_id, points })
        })
        .collect();

    TrajectorySet {
        trajectories,
        duplicates_dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::BoundingBox;

    fn detection(frame_index: u64, player_id: PlayerId, x: f64, confidence: f64) -> Detection {
        Detection {
            frame_index,
            player_id,
            bbox: BoundingBox::new(x, 0.0, x, 0.0),
            confidence,
        }
    }

    #[test]
    fn groups_by_player_and_sorts_by_frame() {
        let set = build_trajectories(&[
            detection(5, 1, 50.0, 0.9),
            detection(2, 0, 20.0, 0.9),
            detection(1, 1, 10.0, 0.9),
            detection(0, 0, 0.0, 0.9),
        ]);

        assert_eq!(set.trajectories.len(), 2);
        let frames: Vec<u64> = set.trajectories[&1].points.iter().map(|p| p.frame_index).collect();
        assert_eq!(frames, vec![1, 5]);
        let frames: Vec<u64> = set.trajectories[&0].points.iter().map(|p| p.frame_index).collect();
        assert_eq!(frames, vec![0, 2]);
        assert_eq!(set.duplicates_dropped, 0);
    }

    #[test]
    fn duplicate_frames_keep_the_most_confident_detection() {
        let set = build_trajectories(&[
            detection(3, 7, 1.0, 0.7),
            detection(3, 7, 2.0, 0.9),
            detection(3, 7, 3.0, 0.9),
        ]);

        let trajectory = &set.trajectories[&7];
        assert_eq!(trajectory.len(), 1);
        assert_eq!(trajectory.points[0].centroid.x, 2.0);
        assert_eq!(set.duplicates_dropped, 2);
    }

    #[test]
    fn empty_input_builds_no_trajectories() {
        let set = build_trajectories(&[]);
        assert!(set.trajectories.is_empty());
        assert_eq!(set.duplicates_dropped, 0);
    }
}
