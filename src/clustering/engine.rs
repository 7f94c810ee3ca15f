//! Clustering engine: runs either mode on a dedicated rayon pool.

use super::{
    ClusterMethod, ClusterOutcome, ClusterParams, ClusteringError, Dendrogram, KMeansConfig,
    Linkage, agglomerate, coerce_cluster_count, kmeans,
};
use crate::config::ClusteringConfig;
use crate::error::InvalidInput;
use crate::types::ClusterAssignment;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

/// Fully validated clustering request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterRequest {
    pub method: ClusterMethod,
    /// Used by partition mode only
    pub n_clusters: usize,
    /// Used by hierarchical mode only
    pub linkage: Linkage,
    pub seed: Option<u64>,
}

impl ClusterRequest {
    /// Validate a method name and loose parameters against `config` defaults.
    ///
    /// Needs no thread pool or store, so callers can reject bad input first.
    pub fn resolve(
        method: &str,
        params: &ClusterParams,
        config: &ClusteringConfig,
    ) -> Result<Self, InvalidInput> {
        let method: ClusterMethod = method.parse()?;
        let linkage = match (method, params.linkage.as_deref()) {
            (ClusterMethod::Hierarchical, Some(name)) => name.parse()?,
            _ => config.default_linkage,
        };

        Ok(Self {
            method,
            n_clusters: coerce_cluster_count(params.n_clusters.as_ref(), config.default_n_clusters),
            linkage,
            seed: params.seed.or(config.seed),
        })
    }
}

/// Stateless clustering over caller-supplied vectors.
///
/// Holds only configuration and a thread pool, so one engine can serve any
/// number of concurrent requests.
pub struct ClusteringEngine {
    pool: ThreadPool,
    config: ClusteringConfig,
}

impl std::fmt::Debug for ClusteringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusteringEngine")
            .field("threads", &self.pool.current_num_threads())
            .field("config", &self.config)
            .finish()
    }
}

impl ClusteringEngine {
    pub fn new(config: ClusteringConfig) -> Result<Self, ClusteringError> {
        let threads = if config.parallel_threads == 0 {
            num_cpus::get()
        } else {
            config.parallel_threads
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("topicvec-cluster-{i}"))
            .build()
            .map_err(|e| ClusteringError::ThreadPool(e.to_string()))?;

        Ok(Self { pool, config })
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Validate a method name and loose parameters against the configured defaults.
    pub fn resolve(&self, method: &str, params: &ClusterParams) -> Result<ClusterRequest, InvalidInput> {
        ClusterRequest::resolve(method, params, &self.config)
    }

    /// Flat labels for `ids`; an empty input yields no assignments.
    pub fn partition(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        n_clusters: usize,
        seed: Option<u64>,
    ) -> Result<Vec<ClusterAssignment>, ClusteringError> {
        check_lengths(ids, vectors)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let config = KMeansConfig {
            n_clusters,
            max_iterations: self.config.max_iterations,
            tolerance: self.config.tolerance,
            seed,
        };
        let result = self.pool.install(|| kmeans(vectors, &config))?;
        debug!(
            iterations = result.iterations,
            inertia = result.inertia,
            "k-means finished"
        );

        Ok(ids
            .iter()
            .zip(result.assignments)
            .map(|(id, cluster)| ClusterAssignment {
                id: id.clone(),
                cluster,
            })
            .collect())
    }

    /// Complete dendrogram over `ids`; an empty input yields `None`.
    pub fn hierarchy(
        &self,
        ids: Vec<String>,
        vectors: &[Vec<f32>],
        linkage: Linkage,
    ) -> Result<Option<Dendrogram>, ClusteringError> {
        check_lengths(&ids, vectors)?;
        if ids.is_empty() {
            return Ok(None);
        }

        let merges = self.pool.install(|| agglomerate(vectors, linkage))?;
        Dendrogram::from_merges(ids, &merges).map(Some)
    }

    /// Run a validated request.
    pub fn run(
        &self,
        ids: Vec<String>,
        vectors: &[Vec<f32>],
        request: &ClusterRequest,
    ) -> Result<ClusterOutcome, ClusteringError> {
        let outcome = match request.method {
            ClusterMethod::KMeans => ClusterOutcome::Flat(self.partition(
                &ids,
                vectors,
                request.n_clusters,
                request.seed,
            )?),
            ClusterMethod::Hierarchical => {
                ClusterOutcome::Tree(self.hierarchy(ids, vectors, request.linkage)?)
            }
        };

        info!(
            method = %request.method,
            items = outcome.item_count(),
            "clustering complete"
        );
        Ok(outcome)
    }
}

fn check_lengths(ids: &[String], vectors: &[Vec<f32>]) -> Result<(), ClusteringError> {
    if ids.len() != vectors.len() {
        return Err(ClusteringError::LengthMismatch {
            ids: ids.len(),
            vectors: vectors.len(),
        });
    }
    Ok(())
}
