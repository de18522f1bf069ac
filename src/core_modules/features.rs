// THEORY:
// The pipeline's responsibility ends at a clean numeric description of each
// possession. This module builds that description and hands it to a
// clusterer:
// 1.  **Feature vector**: `(avg_speed, avg_acceleration, avg_spread, duration)`,
//     with every non-finite value replaced by zero before handoff.
// 2.  **Standardisation**: each column is shifted to zero mean and scaled to
//     unit variance so that spread (hundreds of pixels) does not drown out
//     acceleration (fractions of a pixel).
// 3.  **Clustering**: the `PossessionClusterer` trait is the seam to any
//     external numeric library. A small deterministic k-means is provided so
//     the engine can label possession types on its own.

use crate::core_modules::possession::Possession;
use tracing::debug;

pub const FEATURE_COUNT: usize = 4;
pub type FeatureVector = [f64; FEATURE_COUNT];

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// The sanitized vector a classifier sees for one possession.
pub fn feature_vector(possession: &Possession) -> FeatureVector {
    [
        finite_or_zero(possession.avg_speed),
        finite_or_zero(possession.avg_acceleration),
        finite_or_zero(possession.avg_spread),
        possession.duration as f64,
    ]
}

pub fn feature_matrix(possessions: &[Possession]) -> Vec<FeatureVector> {
    possessions.iter().map(feature_vector).collect()
}

/// Per-column standardisation fitted on a feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    means: FeatureVector,
    std_devs: FeatureVector,
}

impl StandardScaler {
    /// Fits population mean and standard deviation per column.
    pub fn fit(rows: &[FeatureVector]) -> Self {
        let mut means = [0.0; FEATURE_COUNT];
        let mut std_devs = [0.0; FEATURE_COUNT];
        if rows.is_empty() {
            return Self { means, std_devs };
        }

        let n = rows.len() as f64;
        for col in 0..FEATURE_COUNT {
            let mean = rows.iter().map(|r| r[col]).sum::<f64>() / n;
            let variance = rows.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n;
            means[col] = mean;
            std_devs[col] = variance.sqrt();
        }
        Self { means, std_devs }
    }

    /// Columns without variance map to zero.
    pub fn transform(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter()
            .map(|row| {
                let mut scaled = [0.0; FEATURE_COUNT];
                for col in 0..FEATURE_COUNT {
                    if self.std_devs[col] > 0.0 {
                        scaled[col] = (row[col] - self.means[col]) / self.std_devs[col];
                    }
                }
                scaled
            })
            .collect()
    }

    pub fn fit_transform(rows: &[FeatureVector]) -> Vec<FeatureVector> {
        Self::fit(rows).transform(rows)
    }
}

/// Assigns a cluster label to every feature vector.
pub trait PossessionClusterer {
    fn fit_predict(&self, rows: &[FeatureVector]) -> Vec<usize>;
}

/// Lloyd's k-means with deterministic farthest-point seeding.
#[derive(Debug, Clone, Copy)]
pub struct KMeans {
    clusters: usize,
    max_iterations: usize,
}

impl KMeans {
    pub fn new(clusters: usize, max_iterations: usize) -> Self {
        Self {
            clusters: clusters.max(1),
            max_iterations: max_iterations.max(1),
        }
    }

    fn squared_distance(a: &FeatureVector, b: &FeatureVector) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
    }

    fn nearest(centers: &[FeatureVector], row: &FeatureVector) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (idx, center) in centers.iter().enumerate() {
            let dist = Self::squared_distance(center, row);
            if dist < best_dist {
                best_dist = dist;
                best = idx;
            }
        }
        best
    }

    /// First row seeds the first center; each further center is the row
    /// farthest from every center chosen so far (lowest index on ties).
    fn seed(&self, rows: &[FeatureVector], k: usize) -> Vec<FeatureVector> {
        let mut centers = vec![rows[0]];
        while centers.len() < k {
            let mut farthest = 0;
            let mut farthest_dist = -1.0;
            for (idx, row) in rows.iter().enumerate() {
                let dist = centers
                    .iter()
                    .map(|c| Self::squared_distance(c, row))
                    .fold(f64::INFINITY, f64::min);
                if dist > farthest_dist {
                    farthest_dist = dist;
                    farthest = idx;
                }
            }
            centers.push(rows[farthest]);
        }
        centers
    }
}

impl PossessionClusterer for KMeans {
    fn fit_predict(&self, rows: &[FeatureVector]) -> Vec<usize> {
        if rows.is_empty() {
            return Vec::new();
        }
        let k = self.clusters.min(rows.len());
        let mut centers = self.seed(rows, k);
        let mut labels: Vec<usize> = rows.iter().map(|r| Self::nearest(&centers, r)).collect();

        for iteration in 0..self.max_iterations {
            let mut sums = vec![[0.0; FEATURE_COUNT]; k];
            let mut counts = vec![0usize; k];
            for (row, &label) in rows.iter().zip(&labels) {
                counts[label] += 1;
                for col in 0..FEATURE_COUNT {
                    sums[label][col] += row[col];
                }
            }
            for cluster in 0..k {
                // An emptied cluster keeps its previous center.
                if counts[cluster] > 0 {
                    for col in 0..FEATURE_COUNT {
                        centers[cluster][col] = sums[cluster][col] / counts[cluster] as f64;
                    }
                }
            }

            let next: Vec<usize> = rows.iter().map(|r| Self::nearest(&centers, r)).collect();
            if next == labels {
                debug!(iterations = iteration + 1, clusters = k, "k-means converged");
                break;
            }
            labels = next;
        }

        labels
    }
}

/// Sanitizes, standardises and clusters a set of possessions.
pub fn cluster_possessions(possessions: &[Possession], clusterer: &dyn PossessionClusterer) -> Vec<usize> {
    let scaled = StandardScaler::fit_transform(&feature_matrix(possessions));
    clusterer.fit_predict(&scaled)
}
