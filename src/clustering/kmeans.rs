//! K-means partitioning.
//!
//! Lloyd iterations over squared Euclidean distance with k-means++ seeding.
//! The assignment step runs on the current rayon pool.
//!
//! # Algorithm Details
//! - Initialization: k-means++ (distance-squared weighted sampling)
//! - Empty clusters are refilled with the point farthest from its centroid,
//!   taken from a cluster that keeps at least one member
//! - Stops when assignments stop changing, when no centroid moves more than
//!   `tolerance`, or after `max_iterations`

use super::ClusteringError;
use crate::vector::squared_euclidean;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Parameters for one k-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansConfig {
    pub n_clusters: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: Option<u64>,
}

impl KMeansConfig {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iterations: 300,
            tolerance: 1e-4,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Result of a k-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// One centroid per cluster
    pub centroids: Vec<Vec<f32>>,

    /// Cluster index in `0..n_clusters` for each input vector
    pub assignments: Vec<usize>,

    pub iterations: usize,

    /// Sum of squared distances from each point to its centroid
    pub inertia: f64,

    pub converged: bool,
}

/// Partition `vectors` into exactly `config.n_clusters` groups.
///
/// # Errors
/// Fails on empty input, `n_clusters == 0`, mixed dimensions, non-finite
/// values, fewer points than clusters and fewer distinct points than clusters.
pub fn kmeans(vectors: &[Vec<f32>], config: &KMeansConfig) -> Result<KMeansResult, ClusteringError> {
    let k = config.n_clusters;
    validate(vectors, k)?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let dimension = vectors[0].len();
    let max_iterations = config.max_iterations.max(1);
    let mut centroids = initialize_centroids(vectors, k, &mut rng);
    let mut assignments = vec![usize::MAX; vectors.len()];
    let mut iterations = 0;
    let mut converged = false;

    loop {
        iterations += 1;

        let mut next = assign(vectors, &centroids);
        fill_empty_clusters(vectors, &mut next, &mut centroids);

        let unchanged = next == assignments;
        assignments = next;
        if unchanged {
            converged = true;
            break;
        }

        let updated = update_centroids(vectors, &assignments, k, dimension);
        let shift = max_shift(&centroids, &updated);
        centroids = updated;

        debug!(iteration = iterations, shift, "k-means iteration");

        if shift <= config.tolerance {
            converged = true;
            break;
        }
        if iterations >= max_iterations {
            break;
        }
    }

    if !converged {
        warn!(iterations, "k-means stopped before converging");
    }

    let inertia = vectors
        .par_iter()
        .zip(assignments.par_iter())
        .map(|(vector, &cluster)| squared_euclidean(vector, &centroids[cluster]))
        .sum();

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
        inertia,
        converged,
    })
}

fn validate(vectors: &[Vec<f32>], k: usize) -> Result<(), ClusteringError> {
    if vectors.is_empty() {
        return Err(ClusteringError::EmptyVectorSet);
    }
    if k == 0 {
        return Err(ClusteringError::InvalidClusterCount(k));
    }

    let dimension = vectors[0].len();
    if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch);
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err(ClusteringError::NonFiniteValue);
    }

    if vectors.len() < k {
        return Err(ClusteringError::TooFewPoints {
            points: vectors.len(),
            clusters: k,
        });
    }

    let distinct = count_distinct(vectors, k);
    if distinct < k {
        return Err(ClusteringError::DegenerateInput {
            distinct,
            clusters: k,
        });
    }
    Ok(())
}

/// Distinct points, counting no further than `limit`.
fn count_distinct(vectors: &[Vec<f32>], limit: usize) -> usize {
    let mut seen: HashSet<Vec<u32>> = HashSet::new();
    for vector in vectors {
        // +0.0 and -0.0 are the same point
        let key = vector
            .iter()
            .map(|x| if *x == 0.0 { 0 } else { x.to_bits() })
            .collect();
        seen.insert(key);
        if seen.len() >= limit {
            break;
        }
    }
    seen.len()
}

/// k-means++ seeding.
fn initialize_centroids(vectors: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);
    let first = rng.random_range(0..vectors.len());
    centroids.push(vectors[first].clone());

    let mut nearest: Vec<f64> = vectors
        .par_iter()
        .map(|v| squared_euclidean(v, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = nearest.iter().sum();
        let target = rng.random::<f64>() * total;

        let mut cumulative = 0.0;
        let mut chosen = None;
        for (i, &d) in nearest.iter().enumerate() {
            if d <= 0.0 {
                continue;
            }
            cumulative += d;
            chosen = Some(i);
            if cumulative > target {
                break;
            }
        }
        // Input validation guarantees a point not yet chosen
        let Some(index) = chosen else { break };

        let centroid = vectors[index].clone();
        nearest
            .par_iter_mut()
            .zip(vectors.par_iter())
            .for_each(|(d, v)| *d = d.min(squared_euclidean(v, &centroid)));
        centroids.push(centroid);
    }
    centroids
}

fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let distance = squared_euclidean(vector, centroid);
        if distance < best_distance {
            best_distance = distance;
            best = i;
        }
    }
    best
}

fn assign(vectors: &[Vec<f32>], centroids: &[Vec<f32>]) -> Vec<usize> {
    vectors
        .par_iter()
        .map(|vector| nearest_centroid(vector, centroids))
        .collect()
}

/// Give every empty cluster one point so all `k` labels are used.
fn fill_empty_clusters(vectors: &[Vec<f32>], assignments: &mut [usize], centroids: &mut [Vec<f32>]) {
    let mut sizes = vec![0usize; centroids.len()];
    for &cluster in assignments.iter() {
        sizes[cluster] += 1;
    }

    for empty in 0..centroids.len() {
        if sizes[empty] > 0 {
            continue;
        }

        let mut farthest: Option<(usize, f64)> = None;
        for (i, vector) in vectors.iter().enumerate() {
            let cluster = assignments[i];
            if sizes[cluster] < 2 {
                continue;
            }
            let distance = squared_euclidean(vector, &centroids[cluster]);
            if farthest.is_none_or(|(_, best)| distance > best) {
                farthest = Some((i, distance));
            }
        }

        if let Some((i, _)) = farthest {
            sizes[assignments[i]] -= 1;
            sizes[empty] += 1;
            assignments[i] = empty;
            centroids[empty] = vectors[i].clone();
        }
    }
}

fn update_centroids(
    vectors: &[Vec<f32>],
    assignments: &[usize],
    k: usize,
    dimension: usize,
) -> Vec<Vec<f32>> {
    let mut sums = vec![vec![0.0f64; dimension]; k];
    let mut sizes = vec![0usize; k];

    for (vector, &cluster) in vectors.iter().zip(assignments) {
        for (sum, &value) in sums[cluster].iter_mut().zip(vector) {
            *sum += f64::from(value);
        }
        sizes[cluster] += 1;
    }

    sums.into_iter()
        .zip(sizes)
        .map(|(sum, size)| {
            let size = size.max(1) as f64;
            sum.into_iter().map(|s| (s / size) as f32).collect()
        })
        .collect()
}

fn max_shift(old: &[Vec<f32>], new: &[Vec<f32>]) -> f64 {
    old.iter()
        .zip(new)
        .map(|(a, b)| squared_euclidean(a, b).sqrt())
        .fold(0.0, f64::max)
}
