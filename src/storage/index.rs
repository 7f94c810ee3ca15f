//! In-memory cosine index and the non-persistent store built on it.

use super::predicate::Predicate;
use super::{Page, StoreError, StoreResult, VectorStore};
use crate::types::{ItemMetadata, MetadataFilter, SearchResult, StoredVector};
use crate::vector::{VectorDimension, cosine_distance};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Slots in first-insertion order plus an id lookup.
///
/// Overwriting an id replaces its slot in place, so iteration order is the
/// order in which ids were first seen.
#[derive(Debug, Default)]
pub(crate) struct VectorIndex {
    slots: Vec<StoredVector>,
    positions: HashMap<String, usize>,
    dimension: Option<VectorDimension>,
}

impl VectorIndex {
    pub(crate) fn with_dimension(dimension: Option<VectorDimension>) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn dimension(&self) -> Option<VectorDimension> {
        self.dimension
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &StoredVector> {
        self.slots.iter()
    }

    /// Checks an upsert batch without applying it.
    ///
    /// Returns the dimension the store will have once the batch is applied.
    pub(crate) fn check(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[ItemMetadata],
    ) -> StoreResult<Option<VectorDimension>> {
        if ids.len() != vectors.len() || ids.len() != metadatas.len() {
            return Err(StoreError::LengthMismatch {
                ids: ids.len(),
                vectors: vectors.len(),
                metadatas: metadatas.len(),
            });
        }

        let mut dimension = self.dimension;
        for (id, vector) in ids.iter().zip(vectors) {
            if id.is_empty() {
                return Err(StoreError::EmptyId);
            }
            if vector.is_empty() {
                return Err(StoreError::EmptyVector(id.clone()));
            }
            match dimension {
                Some(dim) if dim.get() != vector.len() => {
                    return Err(StoreError::DimensionMismatch {
                        expected: dim.get(),
                        actual: vector.len(),
                    });
                }
                Some(_) => {}
                None => {
                    dimension = VectorDimension::new(vector.len()).ok();
                }
            }
        }
        Ok(dimension)
    }

    /// Insert or overwrite one entry. Callers run `check` first.
    pub(crate) fn apply(&mut self, id: String, embedding: Vec<f32>, metadata: ItemMetadata) {
        if self.dimension.is_none() {
            self.dimension = VectorDimension::new(embedding.len()).ok();
        }
        let entry = StoredVector {
            id: id.clone(),
            embedding,
            metadata,
        };
        match self.positions.get(&id) {
            Some(&position) => self.slots[position] = entry,
            None => {
                self.positions.insert(id, self.slots.len());
                self.slots.push(entry);
            }
        }
    }

    pub(crate) fn upsert(
        &mut self,
        ids: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[ItemMetadata],
    ) -> StoreResult<()> {
        self.check(ids, vectors, metadatas)?;
        for ((id, vector), metadata) in ids.iter().zip(vectors).zip(metadatas) {
            self.apply(id.clone(), vector.clone(), metadata.clone());
        }
        Ok(())
    }

    /// The `k` nearest matching entries by cosine distance, ties in slot order.
    pub(crate) fn query(
        &self,
        vector: &[f32],
        k: usize,
        predicate: &Predicate,
    ) -> StoreResult<Vec<SearchResult>> {
        if k == 0 || self.slots.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(dim) = self.dimension {
            if dim.get() != vector.len() {
                return Err(StoreError::DimensionMismatch {
                    expected: dim.get(),
                    actual: vector.len(),
                });
            }
        }

        let mut results: Vec<SearchResult> = self
            .slots
            .iter()
            .filter(|entry| predicate.matches(&entry.metadata))
            .map(|entry| SearchResult {
                id: entry.id.clone(),
                distance: cosine_distance(vector, &entry.embedding),
            })
            .collect();

        // Stable sort keeps slot order among equal distances
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(k);
        Ok(results)
    }

    pub(crate) fn get(&self, predicate: &Predicate, page: Page) -> Vec<StoredVector> {
        self.slots
            .iter()
            .filter(|entry| predicate.matches(&entry.metadata))
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect()
    }
}

/// Thread-safe store without persistence.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    index: RwLock<VectorIndex>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorStore for MemoryVectorStore {
    fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[ItemMetadata],
    ) -> StoreResult<()> {
        self.index.write().upsert(ids, vectors, metadatas)
    }

    fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> StoreResult<Vec<SearchResult>> {
        self.index.read().query(vector, k, &Predicate::from(filter))
    }

    fn get(&self, filter: &MetadataFilter, page: Page) -> StoreResult<Vec<StoredVector>> {
        Ok(self.index.read().get(&Predicate::from(filter), page))
    }

    fn count(&self) -> usize {
        self.index.read().len()
    }

    fn dimension(&self) -> Option<VectorDimension> {
        self.index.read().dimension()
    }
}
