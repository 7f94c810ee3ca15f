//! Hierarchical agglomerative clustering.
//!
//! Builds the full merge sequence for `n` points with the
//! nearest-neighbour-chain algorithm and Lance–Williams distance updates.
//! All four supported linkages are reducible, so the chain finds the same
//! merges as the naive closest-pair loop.
//!
//! Merges are reported bottom-up in ascending height. Node ids follow the
//! usual convention: `0..n` are the input points and merge `i` creates node
//! `n + i`.

use super::ClusteringError;
use crate::error::InvalidInput;
use crate::vector::squared_euclidean;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rule for the distance between two clusters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Minimum increase in within-cluster variance
    #[default]
    Ward,
    /// Farthest pair of members
    Complete,
    /// Mean pairwise distance
    Average,
    /// Closest pair of members
    Single,
}

impl Linkage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Linkage::Ward => "ward",
            Linkage::Complete => "complete",
            Linkage::Average => "average",
            Linkage::Single => "single",
        }
    }

    /// Ward runs on squared distances and reports their square root.
    fn squared(&self) -> bool {
        matches!(self, Linkage::Ward)
    }

    /// Lance–Williams update: distance from `k` to the union of `i` and `j`.
    fn update(&self, d_ki: f64, d_kj: f64, d_ij: f64, size_i: f64, size_j: f64, size_k: f64) -> f64 {
        match self {
            Linkage::Ward => {
                let total = size_i + size_j + size_k;
                ((size_i + size_k) * d_ki + (size_j + size_k) * d_kj - size_k * d_ij) / total
            }
            Linkage::Complete => d_ki.max(d_kj),
            Linkage::Average => (size_i * d_ki + size_j * d_kj) / (size_i + size_j),
            Linkage::Single => d_ki.min(d_kj),
        }
    }
}

impl FromStr for Linkage {
    type Err = InvalidInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ward" => Ok(Linkage::Ward),
            "complete" => Ok(Linkage::Complete),
            "average" => Ok(Linkage::Average),
            "single" => Ok(Linkage::Single),
            _ => Err(InvalidInput::UnknownLinkage(s.to_string())),
        }
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One agglomeration step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    /// Smaller of the two child node ids
    pub left: usize,
    pub right: usize,
    /// Linkage distance at which the children were joined
    pub distance: f64,
    /// Number of points under the new node
    pub size: usize,
}

/// Condensed upper-triangular distance matrix.
struct Condensed {
    n: usize,
    values: Vec<f64>,
}

impl Condensed {
    fn build(vectors: &[Vec<f32>], squared: bool) -> Self {
        let n = vectors.len();
        let values = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                (i + 1..n).map(move |j| {
                    let d = squared_euclidean(&vectors[i], &vectors[j]);
                    if squared { d } else { d.sqrt() }
                })
            })
            .collect();
        Self { n, values }
    }

    fn index(&self, a: usize, b: usize) -> usize {
        let (i, j) = if a < b { (a, b) } else { (b, a) };
        self.n * i - i * (i + 1) / 2 + j - i - 1
    }

    fn get(&self, a: usize, b: usize) -> f64 {
        self.values[self.index(a, b)]
    }

    fn set(&mut self, a: usize, b: usize, value: f64) {
        let index = self.index(a, b);
        self.values[index] = value;
    }
}

/// Compute the complete merge sequence (`n - 1` merges) for `vectors`.
///
/// Fewer than two points produce no merges.
pub fn agglomerate(vectors: &[Vec<f32>], method: Linkage) -> Result<Vec<Merge>, ClusteringError> {
    let n = vectors.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let dimension = vectors[0].len();
    if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch);
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err(ClusteringError::NonFiniteValue);
    }
    if n == 1 {
        return Ok(Vec::new());
    }

    let mut distances = Condensed::build(vectors, method.squared());
    let mut size = vec![1usize; n];
    // Height of the cluster currently held in each slot
    let mut height = vec![0.0f64; n];
    let mut steps: Vec<(usize, usize, f64)> = Vec::with_capacity(n - 1);
    let mut chain: Vec<usize> = Vec::with_capacity(n);

    for _ in 0..n - 1 {
        if chain.is_empty() {
            if let Some(first) = (0..n).find(|&i| size[i] > 0) {
                chain.push(first);
            }
        }

        let (x, y, current) = loop {
            let Some(&x) = chain.last() else {
                return Err(ClusteringError::InvalidMerge {
                    step: steps.len(),
                    reason: "nearest-neighbour chain is empty".to_string(),
                });
            };
            let previous = chain.len().checked_sub(2).map(|i| chain[i]);

            // Prefer the previous chain element on ties so the chain terminates
            let (mut y, mut current) = match previous {
                Some(p) => (Some(p), distances.get(x, p)),
                None => (None, f64::INFINITY),
            };
            for i in 0..n {
                if size[i] == 0 || i == x {
                    continue;
                }
                let d = distances.get(x, i);
                if d < current {
                    current = d;
                    y = Some(i);
                }
            }

            let Some(y) = y else {
                return Err(ClusteringError::InvalidMerge {
                    step: steps.len(),
                    reason: "no active cluster left to merge".to_string(),
                });
            };
            if previous == Some(y) {
                chain.pop();
                chain.pop();
                break (x, y, current);
            }
            chain.push(y);
        };

        // The union lives in the larger slot
        let (x, y) = if x < y { (x, y) } else { (y, x) };
        let (size_x, size_y) = (size[x] as f64, size[y] as f64);

        for k in 0..n {
            if size[k] == 0 || k == x || k == y {
                continue;
            }
            let updated = method.update(
                distances.get(k, x),
                distances.get(k, y),
                current,
                size_x,
                size_y,
                size[k] as f64,
            );
            distances.set(k, y, updated);
        }

        let merged_height = current.max(height[x]).max(height[y]);
        height[y] = merged_height;
        size[y] += size[x];
        size[x] = 0;
        steps.push((x, y, merged_height));
    }

    // Stable: equal heights keep discovery order, which has children first
    steps.sort_by(|a, b| a.2.total_cmp(&b.2));

    Ok(relabel(n, &steps, method))
}

/// Turn slot-based steps into node ids with a union-find over points.
fn relabel(n: usize, steps: &[(usize, usize, f64)], method: Linkage) -> Vec<Merge> {
    let mut parent: Vec<usize> = (0..2 * n - 1).collect();
    let mut size = vec![1usize; 2 * n - 1];
    let mut merges = Vec::with_capacity(steps.len());

    fn find(parent: &mut [usize], mut node: usize) -> usize {
        let mut root = node;
        while parent[root] != root {
            root = parent[root];
        }
        while parent[node] != root {
            let next = parent[node];
            parent[node] = root;
            node = next;
        }
        root
    }

    for (i, &(x, y, distance)) in steps.iter().enumerate() {
        let a = find(&mut parent, x);
        let b = find(&mut parent, y);
        let node = n + i;
        parent[a] = node;
        parent[b] = node;
        size[node] = size[a] + size[b];

        let distance = if method.squared() {
            distance.max(0.0).sqrt()
        } else {
            distance
        };
        merges.push(Merge {
            left: a.min(b),
            right: a.max(b),
            distance,
            size: size[node],
        });
    }
    merges
}
