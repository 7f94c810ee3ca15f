//! Error types for the embedding and clustering service
//!
//! This module provides the request-level error taxonomy using thiserror.
//! Subsystem errors (`ProviderError`, `StoreError`, `ClusteringError`) convert
//! into `ServiceError` so callers branch on a single type.

use crate::clustering::ClusteringError;
use crate::storage::StoreError;
use crate::vector::ProviderError;
use thiserror::Error;

/// Request validation failures. Nothing has been side-effected when one of
/// these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidInput {
    #[error("Item at position {index} has an empty id")]
    EmptyItemId { index: usize },

    #[error("Item '{id}' has an empty topicId")]
    EmptyTopicId { id: String },

    #[error("Filter is missing the required topicId")]
    MissingFilterTopic,

    #[error("Unknown item type '{0}'. Expected 'problem' or 'solution'")]
    UnknownItemType(String),

    #[error("Unsupported clustering method: {0}. Expected 'kmeans' or 'hierarchical'")]
    UnknownMethod(String),

    #[error("Unsupported linkage '{0}'. Expected 'ward', 'complete', 'average' or 'single'")]
    UnknownLinkage(String),
}

/// Main error type for core operations
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    Validation(#[from] InvalidInput),

    #[error("Embedding provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Vector store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Clustering failed: {0}")]
    Clustering(#[from] ClusteringError),

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Background task failed: {reason}")]
    TaskFailed { reason: String },
}

impl ServiceError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::Store(_) => "STORE_ERROR",
            Self::Clustering(_) => "CLUSTERING_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::TaskFailed { .. } => "TASK_FAILED",
        }
        .to_string()
    }

    /// Whether the request was rejected before touching the provider or store.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Validation(_) => vec![
                "Fix the request; nothing was written",
                "Filters need a topicId and an itemType of 'problem' or 'solution'",
            ],
            Self::Provider(_) => vec![
                "No embeddings were stored; resubmit the entire item set",
                "Check the API key environment variable and provider quota",
            ],
            Self::Store(StoreError::Corrupted { .. }) => vec![
                "Restore the store directory from a backup",
                "Remove the store directory and re-embed the items",
            ],
            Self::Store(_) => vec![
                "Check disk space and permissions for the store directory",
                "A failed upsert may have applied part of the batch; re-upsert it",
            ],
            Self::Clustering(_) => vec![
                "Request fewer clusters than there are distinct stored items",
            ],
            Self::Config { .. } => vec![
                "Run 'topicvec init --force' to regenerate the settings file",
            ],
            Self::TaskFailed { .. } => vec!["Retry the request"],
        }
    }
}

/// Result type alias for core operations
pub type ServiceResult<T> = Result<T, ServiceError>;
