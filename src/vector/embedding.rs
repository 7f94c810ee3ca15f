//! Batched embedding generation.
//!
//! `EmbeddingGenerator` sits between the service and an `EmbeddingProvider`.
//! It splits the input into consecutive batches of at most `batch_size`
//! texts, calls the provider once per batch strictly in sequence, and
//! concatenates the results in input order. Any failed batch fails the whole
//! call; partial results are never returned.

use crate::vector::{ProviderError, VectorDimension};
use std::sync::Arc;
use tracing::debug;

/// Largest batch a single provider call may carry.
pub const MAX_BATCH_SIZE: usize = 100;

/// An external source of text embeddings.
///
/// Implementations must be thread-safe. A call either returns one vector per
/// input text, in input order, or fails as a whole.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `texts` with the model identified by `model`.
    fn embed(&self, texts: &[&str], model: &str) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Short provider name used in logs and error messages.
    fn name(&self) -> &str;
}

/// Turns text into fixed-dimension vectors through an `EmbeddingProvider`.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    model: String,
    batch_size: usize,
}

impl std::fmt::Debug for EmbeddingGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGenerator")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl EmbeddingGenerator {
    /// Creates a generator using `MAX_BATCH_SIZE`.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Overrides the batch size.
    ///
    /// # Errors
    /// Returns `InvalidBatchSize` for zero or for sizes above `MAX_BATCH_SIZE`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, ProviderError> {
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(ProviderError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embeds `texts`, returning one vector per text in the same order.
    ///
    /// An empty input returns an empty result without calling the provider.
    pub fn generate(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        let mut dimension: Option<VectorDimension> = None;

        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(
                provider = self.provider.name(),
                batch = batch_index,
                size = batch.len(),
                "embedding batch"
            );

            let vectors = self.provider.embed(batch, &self.model)?;
            if vectors.len() != batch.len() {
                return Err(ProviderError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }

            for vector in &vectors {
                match dimension {
                    Some(dim) => dim.validate_vector(vector)?,
                    None => dimension = Some(VectorDimension::new(vector.len())?),
                }
            }

            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    /// Embeds a single text.
    pub fn generate_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.generate(&[text])?
            .pop()
            .ok_or(ProviderError::CountMismatch {
                expected: 1,
                actual: 0,
            })
    }
}

/// Deterministic provider for unit tests.
///
/// Records the size of every call so batching can be asserted.
#[cfg(test)]
pub struct MockEmbeddingProvider {
    dimension: usize,
    pub calls: parking_lot::Mutex<Vec<usize>>,
    pub fail_on_call: Option<usize>,
}

#[cfg(test)]
impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: parking_lot::Mutex::new(Vec::new()),
            fail_on_call: None,
        }
    }

    /// Vector for `text`: a hash-seeded, normalised pattern.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut seed: u32 = 2166136261;
        for byte in text.bytes() {
            seed ^= u32::from(byte);
            seed = seed.wrapping_mul(16777619);
        }
        let mut vector: Vec<f32> = (0..self.dimension)
            .map(|i| {
                let mixed = seed.rotate_left(i as u32 % 32) ^ (i as u32).wrapping_mul(2654435761);
                (mixed % 1000) as f32 / 1000.0 + 0.01
            })
            .collect();
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        for value in &mut vector {
            *value /= norm;
        }
        vector
    }
}

#[cfg(test)]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn embed(&self, texts: &[&str], _model: &str) -> Result<Vec<Vec<f32>>, ProviderError> {
        let call = {
            let mut calls = self.calls.lock();
            calls.push(texts.len());
            calls.len()
        };
        if self.fail_on_call == Some(call) {
            return Err(ProviderError::Status {
                provider: "mock".to_string(),
                status: 429,
                message: "quota exceeded".to_string(),
            });
        }
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
