//! Embedding generation.
//!
//! An `EmbeddingProvider` turns a batch of texts into vectors. Two providers
//! ship with the crate: an OpenAI-compatible HTTP client and a local
//! fastembed model. `EmbeddingGenerator` enforces the batching discipline on
//! top of any provider.

mod embedding;
mod local;
mod openai;
mod similarity;
mod types;

#[cfg(test)]
pub use embedding::MockEmbeddingProvider;
pub use embedding::{EmbeddingGenerator, EmbeddingProvider, MAX_BATCH_SIZE};
pub use local::{FastEmbedProvider, model_to_string, parse_embedding_model};
pub use openai::OpenAiCompatibleProvider;
pub use similarity::{cosine_distance, cosine_similarity, squared_euclidean};
pub use types::{ProviderError, VectorDimension};
