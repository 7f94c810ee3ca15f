//! Clustering of stored vectors.
//!
//! Two modes are offered. Partition mode ("kmeans") assigns every item one
//! of `n_clusters` labels. Hierarchical mode ("hierarchical") builds the
//! complete dendrogram: every merge is performed, so `n` items always yield
//! `n - 1` internal nodes under a single root.

mod agglomerative;
mod dendrogram;
mod engine;
mod kmeans;

pub use agglomerative::{Linkage, Merge, agglomerate};
pub use dendrogram::{ClusterNode, Dendrogram};
pub use engine::{ClusterRequest, ClusteringEngine};
pub use kmeans::{KMeansConfig, KMeansResult, kmeans};

use crate::error::InvalidInput;
use crate::types::ClusterAssignment;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Cluster count used when a request gives none or an unusable one.
pub const DEFAULT_N_CLUSTERS: usize = 5;

/// Errors raised by the numerical routines.
#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error(
        "Empty vector set provided for clustering\nSuggestion: Ensure vectors are generated before clustering"
    )]
    EmptyVectorSet,

    #[error("Invalid cluster count: {0}\nSuggestion: Use k between 1 and the number of vectors")]
    InvalidClusterCount(usize),

    #[error(
        "Dimension mismatch in vectors\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch,

    #[error("Got {ids} item ids for {vectors} vectors")]
    LengthMismatch { ids: usize, vectors: usize },

    #[error("Vectors contain NaN or infinite values")]
    NonFiniteValue,

    #[error(
        "Cannot form {clusters} clusters from {points} items\nSuggestion: Request at most {points} clusters"
    )]
    TooFewPoints { points: usize, clusters: usize },

    #[error(
        "Only {distinct} distinct vectors for {clusters} clusters\nSuggestion: Request at most {distinct} clusters"
    )]
    DegenerateInput { distinct: usize, clusters: usize },

    #[error("Invalid merge at step {step}: {reason}")]
    InvalidMerge { step: usize, reason: String },

    #[error("Invalid cluster tree at node {node}: {reason}")]
    InvalidTree { node: usize, reason: String },

    #[error("Failed to start clustering thread pool: {0}")]
    ThreadPool(String),
}

/// Clustering mode requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMethod {
    #[serde(rename = "kmeans")]
    KMeans,
    Hierarchical,
}

impl ClusterMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterMethod::KMeans => "kmeans",
            ClusterMethod::Hierarchical => "hierarchical",
        }
    }
}

impl FromStr for ClusterMethod {
    type Err = InvalidInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kmeans" => Ok(ClusterMethod::KMeans),
            "hierarchical" => Ok(ClusterMethod::Hierarchical),
            _ => Err(InvalidInput::UnknownMethod(s.to_string())),
        }
    }
}

impl fmt::Display for ClusterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loosely typed clustering parameters as received from a caller.
///
/// `n_clusters` may arrive as a number or a string and is coerced by
/// [`coerce_cluster_count`]. `linkage` is only read in hierarchical mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_clusters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl ClusterParams {
    pub fn with_n_clusters(mut self, n_clusters: impl Into<Value>) -> Self {
        self.n_clusters = Some(n_clusters.into());
        self
    }

    pub fn with_linkage(mut self, linkage: impl Into<String>) -> Self {
        self.linkage = Some(linkage.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Coerce a requested cluster count to a positive integer.
///
/// Integers are taken as-is, floats are truncated and strings are parsed as
/// integers. Anything missing, unparseable or below 1 gives `default`.
pub fn coerce_cluster_count(value: Option<&Value>, default: usize) -> usize {
    let parsed = match value {
        Some(Value::Number(number)) => number
            .as_u64()
            .or_else(|| number.as_i64().and_then(|n| u64::try_from(n).ok()))
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.is_finite() && *f >= 1.0)
                    .map(|f| f.trunc() as u64)
            }),
        Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
        _ => None,
    };

    match parsed.and_then(|n| usize::try_from(n).ok()) {
        Some(n) if n >= 1 => n,
        _ => default,
    }
}

/// Result of a clustering request: flat labels or a tree.
///
/// `Tree(None)` is the explicit "no tree" answer for an empty item set.
/// Trees travel as the flat node arena, so encoding depth never grows
/// with the height of the dendrogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "result", rename_all = "snake_case")]
pub enum ClusterOutcome {
    Flat(Vec<ClusterAssignment>),
    Tree(Option<Dendrogram>),
}

impl ClusterOutcome {
    /// Whether no items were clustered.
    pub fn is_empty(&self) -> bool {
        match self {
            ClusterOutcome::Flat(assignments) => assignments.is_empty(),
            ClusterOutcome::Tree(root) => root.is_none(),
        }
    }

    /// Number of items covered.
    pub fn item_count(&self) -> usize {
        match self {
            ClusterOutcome::Flat(assignments) => assignments.len(),
            ClusterOutcome::Tree(root) => root.as_ref().map_or(0, Dendrogram::leaf_count),
        }
    }
}
