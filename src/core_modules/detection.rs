// THEORY:
// The `detection` module holds the "dumb" value records that enter the
// motion-analytics engine. A detector upstream of us has already turned video
// frames into bounding boxes; everything here is a plain, immutable snapshot of
// one box in one frame. No record in this module knows anything about the past
// or the future of the player it describes. Memory across frames is added by
// the `trajectory` layer.

use serde::{Deserialize, Serialize};

/// Identifier of a player, either assigned by an upstream tracker or
/// synthesized by an identity resolution strategy.
pub type PlayerId = u32;

/// A point in pixel space, used for player centroids.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
}

impl Centroid {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Centroid) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// The centroid-of-centroids of a set of points. `None` for an empty set.
    pub fn mean_of(points: &[Centroid]) -> Option<Centroid> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Centroid::new(sx / n, sy / n))
    }
}

/// Axis-aligned box in pixel coordinates, top-left `(x1, y1)` to bottom-right `(x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// A box is usable when every coordinate is finite and it is not inverted.
    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2].iter().all(|v| v.is_finite())
            && self.x2 >= self.x1
            && self.y2 >= self.y1
    }

    pub fn centroid(&self) -> Centroid {
        Centroid::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// A detection exactly as the detector reported it. The player identifier is
/// optional because most detectors do not track.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub frame_index: u64,
    pub player_id: Option<PlayerId>,
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub label: String,
}

/// A filtered detection with a resolved player identity. This is what the
/// trajectory builder consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub frame_index: u64,
    pub player_id: PlayerId,
    pub bbox: BoundingBox,
    pub confidence: f64,
}

impl Detection {
    pub fn centroid(&self) -> Centroid {
        self.bbox.centroid()
    }
}
