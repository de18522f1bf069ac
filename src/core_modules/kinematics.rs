// THEORY:
// The kinematics extractor turns each trajectory into a stream of motion
// measurements. It walks consecutive pairs of trajectory points and derives a
// velocity vector, its magnitude (speed), and the finite-difference derivative
// of that *scalar* speed (acceleration).
//
// Key rules:
// 1.  **Keyed to the later frame**: a pair `(a, b)` produces one sample at frame `b`.
//     The first point of a trajectory never has a sample of its own.
// 2.  **Zero-delta guard**: a pair whose frame delta is zero is skipped.
// 3.  **Acceleration convention**: the first sample of a trajectory has zero
//     acceleration; every later sample uses the speed of the previous pair.
// 4.  **Sanitization at consumption**: extraction never drops outliers. The
//     `OutlierCaps` filter is applied by whatever consumes the samples
//     (frame aggregation, feature export), so the raw measurements stay
//     available for inspection.

use crate::core_modules::detection::{Centroid, PlayerId};
use crate::core_modules::trajectory::Trajectory;
use serde::Serialize;
use std::collections::BTreeMap;

/// A per-frame, per-player motion measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KinematicSample {
    pub frame_index: u64,
    pub player_id: PlayerId,
    /// Centroid of the player at `frame_index`.
    pub position: Centroid,
    /// Displacement per frame, `(vx, vy)`.
    pub velocity: (f64, f64),
    pub speed: f64,
    pub acceleration: f64,
}

/// Sanity limits beyond which a sample is treated as a detection glitch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierCaps {
    pub max_speed: f64,
    pub max_abs_acceleration: f64,
}

impl Default for OutlierCaps {
    fn default() -> Self {
        Self {
            max_speed: 100.0,
            max_abs_acceleration: 100.0,
        }
    }
}

impl OutlierCaps {
    /// A sample is admissible when all its values are finite and strictly below the caps.
    pub fn admits(&self, sample: &KinematicSample) -> bool {
        sample.velocity.0.is_finite()
            && sample.velocity.1.is_finite()
            && sample.speed.is_finite()
            && sample.acceleration.is_finite()
            && sample.speed < self.max_speed
            && sample.acceleration.abs() < self.max_abs_acceleration
    }

    /// Splits off the admissible samples, returning them with the number rejected.
    pub fn sanitize(&self, samples: &[KinematicSample]) -> (Vec<KinematicSample>, usize) {
        let kept: Vec<KinematicSample> = samples.iter().copied().filter(|s| self.admits(s)).collect();
        let rejected = samples.len() - kept.len();
        (kept, rejected)
    }
}

/// Coarse movement label used as a training target for an external classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementClass {
    Slow,
    Fast,
}

impl MovementClass {
    pub fn of(sample: &KinematicSample, fast_speed_threshold: f64) -> Self {
        if sample.speed > fast_speed_threshold {
            MovementClass::Fast
        } else {
            MovementClass::Slow
        }
    }
}

/// Computes the kinematic samples of one trajectory.
pub fn extract(trajectory: &Trajectory) -> Vec<KinematicSample> {
    let mut samples = Vec::with_capacity(trajectory.len().saturating_sub(1));
    let mut previous_speed: Option<f64> = None;

    for pair in trajectory.points.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.frame_index <= a.frame_index {
            continue;
        }
        let dt = (b.frame_index - a.frame_index) as f64;

        let velocity = (
            (b.centroid.x - a.centroid.x) / dt,
            (b.centroid.y - a.centroid.y) / dt,
        );
        let speed = velocity.0.hypot(velocity.1);
        let acceleration = match previous_speed {
            Some(prev) => (speed - prev) / dt,
            None => 0.0,
        };
        previous_speed = Some(speed);

        samples.push(KinematicSample {
            frame_index: b.frame_index,
            player_id: trajectory.player_id,
            position: b.centroid,
            velocity,
            speed,
            acceleration,
        });
    }

    samples
}

/// Extracts every trajectory and returns the merged samples ordered by
/// `(frame_index, player_id)`.
pub fn extract_all(trajectories: &BTreeMap<PlayerId, Trajectory>) -> Vec<KinematicSample> {
    let mut samples: Vec<KinematicSample> = trajectories.values().flat_map(extract).collect();
    sort_samples(&mut samples);
    samples
}

pub(crate) fn sort_samples(samples: &mut [KinematicSample]) {
    samples.sort_by_key(|s| (s.frame_index, s.player_id));
}
