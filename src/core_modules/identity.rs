// THEORY:
// Identity resolution answers "which player is this box?". A real answer needs
// a multi-object tracker that survives occlusions; this engine deliberately
// does not have one. Instead it exposes the `IdentityResolver` seam and ships
// two simple strategies:
// -   **Naive modulo identity**: detections are sorted by frame and position and
//     the sorted index, modulo a fixed player count, becomes the identity. This
//     is a placeholder, not a tracker; it exists so the rest of the pipeline can
//     run on untracked detector output.
// -   **Tracker identity**: trust the identifier the detector already attached,
//     falling back to the naive strategy for rows that carry none.
// A real tracker can be plugged in behind the trait without touching any
// downstream stage.

use crate::core_modules::detection::{Detection, PlayerId, RawDetection};
use serde::{Deserialize, Serialize};

/// Turns filtered detector output into detections with a resolved player identity.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, detections: Vec<RawDetection>) -> Vec<Detection>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStrategy {
    #[default]
    Tracker,
    Naive,
}

/// Identity = position in `(frame, cx, cy)` order modulo `player_count`.
#[derive(Debug, Clone, Copy)]
pub struct NaiveModuloIdentity {
    player_count: u32,
}

impl NaiveModuloIdentity {
    pub fn new(player_count: u32) -> Self {
        Self {
            player_count: player_count.max(1),
        }
    }
}

impl IdentityResolver for NaiveModuloIdentity {
    fn resolve(&self, mut detections: Vec<RawDetection>) -> Vec<Detection> {
        // Stable sort, so equal keys keep input order.
        detections.sort_by(|a, b| {
            let (ca, cb) = (a.bbox.centroid(), b.bbox.centroid());
            a.frame_index
                .cmp(&b.frame_index)
                .then(ca.x.total_cmp(&cb.x))
                .then(ca.y.total_cmp(&cb.y))
        });

        detections
            .into_iter()
            .enumerate()
            .map(|(index, raw)| Detection {
                frame_index: raw.frame_index,
                player_id: (index as u64 % self.player_count as u64) as PlayerId,
                bbox: raw.bbox,
                confidence: raw.confidence,
            })
            .collect()
    }
}

/// Uses detector-assigned ids; untracked rows go through the naive fallback,
/// numbered above the largest supplied id.
#[derive(Debug, Clone, Copy)]
pub struct TrackerIdentity {
    fallback: NaiveModuloIdentity,
}

impl TrackerIdentity {
    pub fn new(fallback: NaiveModuloIdentity) -> Self {
        Self { fallback }
    }
}

impl IdentityResolver for TrackerIdentity {
    fn resolve(&self, detections: Vec<RawDetection>) -> Vec<Detection> {
        let (tracked, untracked): (Vec<_>, Vec<_>) =
            detections.into_iter().partition(|d| d.player_id.is_some());

        // Fallback ids start above every supplied id so untracked rows never
        // merge into a real track.
        let offset = tracked
            .iter()
            .filter_map(|d| d.player_id)
            .max()
            .map_or(0, |max| max.saturating_add(1));

        let mut resolved: Vec<Detection> = tracked
            .into_iter()
            .filter_map(|raw| {
                Some(Detection {
                    frame_index: raw.frame_index,
                    player_id: raw.player_id?,
                    bbox: raw.bbox,
                    confidence: raw.confidence,
                })
            })
            .collect();
        resolved.extend(self.fallback.resolve(untracked).into_iter().map(|mut d| {
            d.player_id = d.player_id.saturating_add(offset);
            d
        }));
        resolved
    }
}

/// Builds the resolver named by the configuration.
pub fn resolver_for(strategy: IdentityStrategy, player_count: u32) -> Box<dyn IdentityResolver> {
    let naive = NaiveModuloIdentity::new(player_count);
    match strategy {
        IdentityStrategy::Naive => Box::new(naive),
        IdentityStrategy::Tracker => Box::new(TrackerIdentity::new(naive)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::BoundingBox;

    fn raw(frame_index: u64, x: f64, player_id: Option<PlayerId>) -> RawDetection {
        RawDetection {
            frame_index,
            player_id,
            bbox: BoundingBox::new(x, 0.0, x + 2.0, 2.0),
            confidence: 0.9,
            label: "person".to_string(),
        }
    }

    #[test]
    fn naive_identity_cycles_over_sorted_detections() {
        let resolver = NaiveModuloIdentity::new(2);
        let resolved = resolver.resolve(vec![
            raw(1, 50.0, None),
            raw(0, 10.0, None),
            raw(0, 5.0, None),
            raw(1, 0.0, None),
        ]);

        let summary: Vec<(u64, f64, PlayerId)> = resolved
            .iter()
            .map(|d| (d.frame_index, d.bbox.x1, d.player_id))
            .collect();
        assert_eq!(
            summary,
            vec![(0, 5.0, 0), (0, 10.0, 1), (1, 0.0, 0), (1, 50.0, 1)]
        );
    }

    #[test]
    fn tracker_identity_keeps_supplied_ids() {
        let resolver = resolver_for(IdentityStrategy::Tracker, 10);
        let resolved = resolver.resolve(vec![raw(0, 0.0, Some(42)), raw(0, 5.0, None)]);

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].player_id, 42);
        assert_eq!(resolved[1].player_id, 43);
    }

    #[test]
    fn fallback_ids_never_collide_with_tracked_ids() {
        let resolver = resolver_for(IdentityStrategy::Tracker, 3);
        let resolved = resolver.resolve(vec![
            raw(0, 0.0, Some(0)),
            raw(0, 10.0, Some(2)),
            raw(0, 20.0, None),
            raw(0, 30.0, None),
            raw(1, 0.0, Some(1)),
        ]);

        let tracked: Vec<PlayerId> = resolved.iter().take(3).map(|d| d.player_id).collect();
        let fallback: Vec<PlayerId> = resolved.iter().skip(3).map(|d| d.player_id).collect();
        assert_eq!(tracked, vec![0, 2, 1]);
        assert_eq!(fallback, vec![3, 4]);
    }

    #[test]
    fn untracked_input_keeps_plain_naive_ids() {
        let resolved = resolver_for(IdentityStrategy::Tracker, 2).resolve(vec![raw(0, 0.0, None), raw(0, 5.0, None)]);
        let ids: Vec<PlayerId> = resolved.iter().map(|d| d.player_id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn zero_player_count_is_clamped() {
        let resolved = NaiveModuloIdentity::new(0).resolve(vec![raw(0, 0.0, None), raw(1, 0.0, None)]);
        assert!(resolved.iter().all(|d| d.player_id == 0));
    }
}
