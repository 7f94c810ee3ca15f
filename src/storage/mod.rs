//! Metadata-filtered vector storage.
//!
//! `VectorStore` is the contract the service relies on: per-id upsert,
//! filtered k-nearest query by cosine distance and paginated filtered fetch.
//! `MemoryVectorStore` keeps everything in memory; `PersistentVectorStore`
//! adds an append-only log and a manifest on disk.

pub mod error;
mod index;
pub mod manifest;
mod persistent;
pub mod predicate;

pub use error::{StoreError, StoreResult};
pub use index::MemoryVectorStore;
pub use manifest::{MANIFEST_FILE, Manifest};
pub use persistent::{CompactReport, LOG_FILE, PersistentVectorStore};
pub use predicate::Predicate;

use crate::types::{ItemMetadata, MetadataFilter, SearchResult, StoredVector};
use crate::vector::VectorDimension;

/// A window over the entries matching a filter, in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }

    pub fn next(self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

/// Shared, thread-safe vector store.
///
/// Each id is written atomically; there is no isolation across a batch, so
/// a concurrent reader may see part of an in-flight upsert.
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite `(id, vector, metadata)` triples. All three slices
    /// must have the same length.
    fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[ItemMetadata],
    ) -> StoreResult<()>;

    /// The `k` nearest matching vectors, ascending by distance.
    fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> StoreResult<Vec<SearchResult>>;

    /// One page of the vectors matching `filter`.
    fn get(&self, filter: &MetadataFilter, page: Page) -> StoreResult<Vec<StoredVector>>;

    /// Number of stored vectors across all metadata.
    fn count(&self) -> usize;

    /// Dimension fixed by the first upsert, if any.
    fn dimension(&self) -> Option<VectorDimension>;

    /// Every vector matching `filter`, fetched `page_size` at a time until a
    /// short page comes back.
    fn get_all(&self, filter: &MetadataFilter, page_size: usize) -> StoreResult<Vec<StoredVector>> {
        let mut page = Page::first(page_size.max(1));
        let mut all = Vec::new();
        loop {
            let batch = self.get(filter, page)?;
            let done = batch.len() < page.limit;
            all.extend(batch);
            if done {
                return Ok(all);
            }
            page = page.next();
        }
    }
}
