//! Topic-scoped embedding storage, similarity search and clustering.
//!
//! Items (problem or solution statements tagged with a topic and an optional
//! question) are embedded in batches, stored with their metadata, and later
//! searched or clustered within one metadata partition at a time.

pub mod clustering;
pub mod config;
pub mod error;
pub mod io;
pub mod logging;
pub mod service;
pub mod storage;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use clustering::{ClusterMethod, ClusterNode, ClusterOutcome, ClusterParams, Linkage};
pub use config::Settings;
pub use error::{InvalidInput, ServiceError, ServiceResult};
pub use service::{AsyncEmbeddingService, EmbeddingService, StoreReport, StoreStats};
pub use storage::{MemoryVectorStore, PersistentVectorStore, VectorStore};
pub use types::{ClusterAssignment, Item, ItemType, MetadataFilter, SearchResult};
pub use vector::{EmbeddingGenerator, EmbeddingProvider, ProviderError};
