//! Type-safe wrappers and error types for embedding vectors.
//!
//! `VectorDimension` is fixed by the embedding provider for the lifetime of a
//! collection. `ProviderError` covers every way a call to the external
//! embedding provider can fail; the whole `generate` call fails with it.

use thiserror::Error;

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent dimension
/// mismatches between stored vectors and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, ProviderError> {
        if dim == 0 {
            return Err(ProviderError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), ProviderError> {
        if vector.len() != self.0 {
            return Err(ProviderError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised while talking to an embedding provider.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error(
        "Embedding dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid batch size: {0}\nSuggestion: Use a batch size of at least 1")]
    InvalidBatchSize(usize),

    #[error(
        "Provider '{provider}' request failed: {message}\nSuggestion: Check network connectivity and the configured api_base"
    )]
    Request { provider: String, message: String },

    #[error(
        "Provider '{provider}' returned HTTP {status}: {message}\nSuggestion: Verify the API key, model name and remaining quota"
    )]
    Status {
        provider: String,
        status: u16,
        message: String,
    },

    #[error(
        "Provider '{provider}' returned a malformed response: {message}\nSuggestion: Confirm the endpoint speaks the embeddings API"
    )]
    Decode { provider: String, message: String },

    #[error(
        "Provider returned {actual} embeddings for a batch of {expected} texts\nSuggestion: The provider dropped inputs; resubmit the whole item set"
    )]
    CountMismatch { expected: usize, actual: usize },

    #[error(
        "Embedding model '{requested}' is not served by provider '{provider}'\nSuggestion: Set embedding.model to '{served}' or switch provider"
    )]
    ModelMismatch {
        provider: String,
        requested: String,
        served: String,
    },

    #[error(
        "Failed to initialize embedding model: {0}\nSuggestion: Ensure you have internet connection for first-time model download"
    )]
    ModelInit(String),

    #[error(
        "Missing API key: environment variable {0} is not set\nSuggestion: Export the key or change embedding.api_key_env"
    )]
    MissingApiKey(String),

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),
}
