//! K-means clustering for the inverted-file index.
//!
//! Partitions vectors into regions under squared Euclidean distance, the
//! same metric the index searches with. Centroids are seeded with
//! K-means++ from a deterministic RNG so the same training batch and seed
//! always produce the same regions.
//!
//! # Algorithm Details
//! - Distance metric: squared L2
//! - Initialization: K-means++
//! - Assignment step runs in parallel with rayon
//! - Stops when assignments are stable, centroids stop moving, or the
//!   iteration cap is hit

use crate::vector::types::RegionId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

/// Default cap on Lloyd iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Convergence tolerance on mean centroid movement.
const CONVERGENCE_TOLERANCE: f32 = 1e-4;

/// Epsilon for floating-point comparisons.
const EPSILON: f32 = 1e-10;

/// Tuning knobs for a clustering run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansOptions {
    pub max_iterations: usize,
    pub tolerance: f32,
    pub seed: u64,
}

impl Default for KMeansOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: CONVERGENCE_TOLERANCE,
            seed: 42,
        }
    }
}

/// Result of K-means clustering operation.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Cluster centroids, each a vector of the same dimension as input vectors.
    pub centroids: Vec<Vec<f32>>,

    /// Region assignment for each input vector.
    pub assignments: Vec<RegionId>,

    /// Number of iterations until convergence.
    pub iterations: usize,
}

/// Errors that can occur during clustering operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClusteringError {
    #[error("Empty vector set provided for clustering")]
    EmptyVectorSet,

    #[error("Invalid cluster count {k} for {samples} vectors")]
    InvalidClusterCount { k: usize, samples: usize },

    #[error("Dimension mismatch in training vectors: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Performs K-means clustering on a set of vectors using squared L2.
///
/// `k` must be between 1 and the number of vectors.
pub fn kmeans_clustering(
    vectors: &[&[f32]],
    k: usize,
    options: &KMeansOptions,
) -> Result<KMeansResult, ClusteringError> {
    let Some(first) = vectors.first() else {
        return Err(ClusteringError::EmptyVectorSet);
    };

    if k == 0 || k > vectors.len() {
        return Err(ClusteringError::InvalidClusterCount {
            k,
            samples: vectors.len(),
        });
    }

    let dimension = first.len();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut centroids = initialize_centroids_kmeans_plus_plus(vectors, k, &mut rng);
    let mut assignments: Vec<RegionId> = Vec::new();
    let mut iterations = 0;

    loop {
        iterations += 1;

        let new_assignments = assign_all(vectors, &centroids);
        let converged = new_assignments == assignments;
        assignments = new_assignments;

        if converged || iterations >= options.max_iterations {
            break;
        }

        let new_centroids = update_centroids(vectors, &assignments, k, &mut rng);
        let movement = calculate_centroid_movement(&centroids, &new_centroids);
        centroids = new_centroids;

        if movement < options.tolerance {
            // Centroids moved; refresh assignments so they match them.
            assignments = assign_all(vectors, &centroids);
            break;
        }
    }

    if iterations >= options.max_iterations {
        tracing::debug!(
            target: "vecdex::clustering",
            "k-means stopped at the iteration cap ({}) before converging",
            options.max_iterations
        );
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
    })
}

/// Squared Euclidean distance.
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Assigns a vector to the nearest centroid. Ties go to the lower region.
pub fn assign_to_nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> RegionId {
    let mut best_distance = f32::INFINITY;
    let mut best_region = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let distance = squared_l2(vector, centroid);
        if distance < best_distance {
            best_distance = distance;
            best_region = i;
        }
    }

    RegionId::new(best_region as u32)
}

/// Returns the `n` regions whose centroids are closest to `query`.
///
/// Ordered by ascending centroid distance, ties by lower region.
pub fn nearest_centroids(query: &[f32], centroids: &[Vec<f32>], n: usize) -> Vec<RegionId> {
    let mut ranked: Vec<(f32, usize)> = centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (squared_l2(query, c), i))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    ranked
        .into_iter()
        .take(n)
        .map(|(_, i)| RegionId::new(i as u32))
        .collect()
}

fn assign_all(vectors: &[&[f32]], centroids: &[Vec<f32>]) -> Vec<RegionId> {
    vectors
        .par_iter()
        .map(|vector| assign_to_nearest_centroid(vector, centroids))
        .collect()
}

/// Updates centroids as the mean of their assigned vectors.
///
/// An empty region is reseeded with a random training vector.
fn update_centroids(
    vectors: &[&[f32]],
    assignments: &[RegionId],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut new_centroids = vec![vec![0.0; dimension]; k];
    let mut cluster_sizes = vec![0usize; k];

    for (vector, region) in vectors.iter().zip(assignments.iter()) {
        let idx = region.as_index();
        for (acc, &value) in new_centroids[idx].iter_mut().zip(vector.iter()) {
            *acc += value;
        }
        cluster_sizes[idx] += 1;
    }

    for (centroid, &size) in new_centroids.iter_mut().zip(cluster_sizes.iter()) {
        if size == 0 {
            let random_idx = rng.random_range(0..vectors.len());
            *centroid = vectors[random_idx].to_vec();
        } else {
            for value in centroid.iter_mut() {
                *value /= size as f32;
            }
        }
    }

    new_centroids
}

/// Initializes centroids using the K-means++ algorithm.
///
/// Each new centroid is drawn with probability proportional to its squared
/// distance from the nearest existing one. When every point already sits on
/// a centroid the draw falls back to a uniform pick, so exactly `k`
/// centroids come back even for duplicate-heavy input.
fn initialize_centroids_kmeans_plus_plus(
    vectors: &[&[f32]],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);

    let first_idx = rng.random_range(0..vectors.len());
    centroids.push(vectors[first_idx].to_vec());

    let mut min_distances: Vec<f32> = vectors
        .iter()
        .map(|v| squared_l2(v, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total_distance: f32 = min_distances.iter().sum();

        let chosen = if total_distance < EPSILON {
            rng.random_range(0..vectors.len())
        } else {
            let target = rng.random::<f32>() * total_distance;
            let mut cumulative = 0.0;
            min_distances
                .iter()
                .position(|&d| {
                    cumulative += d;
                    cumulative >= target
                })
                .unwrap_or(vectors.len() - 1)
        };

        let centroid = vectors[chosen].to_vec();
        for (slot, vector) in min_distances.iter_mut().zip(vectors.iter()) {
            *slot = slot.min(squared_l2(vector, &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}

/// Mean squared movement of centroids between iterations.
fn calculate_centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new.iter())
        .map(|(old_c, new_c)| squared_l2(old_c, new_c))
        .sum::<f32>()
        / old.len() as f32
}
