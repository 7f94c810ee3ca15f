//! The four core operations, wired to an embedding provider, a vector store
//! and a clustering engine.
//!
//! `EmbeddingService` is constructed once and shared by reference; it holds
//! no per-request state. `AsyncEmbeddingService` wraps it for tokio request
//! handlers by moving each call onto the blocking pool.

use crate::clustering::{ClusterOutcome, ClusterParams, ClusteringEngine};
use crate::config::{ProviderKind, Settings};
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{PersistentVectorStore, VectorStore};
use crate::types::{Item, MetadataFilter, SearchResult};
use crate::vector::{
    EmbeddingGenerator, EmbeddingProvider, FastEmbedProvider, OpenAiCompatibleProvider,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default page size for fetching vectors to cluster.
pub const DEFAULT_FETCH_PAGE_SIZE: usize = 1000;

/// Outcome of `generate_and_store`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreReport {
    pub stored_count: usize,
    pub errors: Vec<String>,
}

impl StoreReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Store shape and the embedding setup feeding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub count: usize,
    pub dimension: Option<usize>,
    pub provider: String,
    pub model: String,
}

pub struct EmbeddingService {
    generator: EmbeddingGenerator,
    store: Arc<dyn VectorStore>,
    engine: ClusteringEngine,
    fetch_page_size: usize,
}

impl EmbeddingService {
    pub fn new(
        generator: EmbeddingGenerator,
        store: Arc<dyn VectorStore>,
        engine: ClusteringEngine,
    ) -> Self {
        Self {
            generator,
            store,
            engine,
            fetch_page_size: DEFAULT_FETCH_PAGE_SIZE,
        }
    }

    pub fn with_fetch_page_size(mut self, page_size: usize) -> Self {
        self.fetch_page_size = page_size.max(1);
        self
    }

    /// Build the provider, persistent store and engine described by `settings`.
    pub fn from_settings(settings: &Settings) -> ServiceResult<Self> {
        settings.validate()?;
        let embedding = &settings.embedding;

        let provider: Arc<dyn EmbeddingProvider> = match embedding.provider {
            ProviderKind::OpenAi => Arc::new(OpenAiCompatibleProvider::from_env(
                &embedding.api_base,
                &embedding.api_key_env,
                Duration::from_secs(embedding.timeout_secs),
            )?),
            ProviderKind::FastEmbed => {
                let cache_dir = embedding
                    .cache_dir
                    .clone()
                    .unwrap_or_else(|| settings.store_path.join("models"));
                Arc::new(FastEmbedProvider::new(&embedding.model, Some(cache_dir))?)
            }
        };

        let generator = EmbeddingGenerator::new(provider, embedding.model.clone())
            .with_batch_size(embedding.batch_size)?;
        let store = Arc::new(PersistentVectorStore::open(
            &settings.store_path,
            &embedding.model,
        )?);
        let engine = ClusteringEngine::new(settings.clustering.clone())?;

        Ok(Self::new(generator, store, engine).with_fetch_page_size(settings.store.fetch_page_size))
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn generator(&self) -> &EmbeddingGenerator {
        &self.generator
    }

    pub fn engine(&self) -> &ClusteringEngine {
        &self.engine
    }

    /// Embed and store `items`, reporting failures instead of returning them.
    pub fn generate_and_store(&self, items: &[Item]) -> StoreReport {
        match self.try_generate_and_store(items) {
            Ok(stored_count) => StoreReport {
                stored_count,
                errors: Vec::new(),
            },
            Err(e) => {
                warn!(status = %e.status_code(), error = %e, "generate_and_store failed");
                StoreReport {
                    stored_count: 0,
                    errors: vec![e.to_string()],
                }
            }
        }
    }

    /// Embed and store `items`, returning how many were written.
    ///
    /// Items are validated before the provider is called, and nothing is
    /// stored unless every embedding batch succeeds.
    pub fn try_generate_and_store(&self, items: &[Item]) -> ServiceResult<usize> {
        for (index, item) in items.iter().enumerate() {
            item.validate(index)?;
        }
        if items.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = items.iter().map(|item| item.text.as_str()).collect();
        let vectors = self.generator.generate(&texts)?;

        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        let metadatas: Vec<_> = items.iter().map(Item::metadata).collect();
        self.store.upsert(&ids, &vectors, &metadatas)?;

        info!(stored = items.len(), "stored embeddings");
        Ok(items.len())
    }

    /// The `k` stored items nearest to `query_vector` that match `filter`.
    pub fn search(
        &self,
        query_vector: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> ServiceResult<Vec<SearchResult>> {
        filter.validate()?;
        Ok(self.store.query(query_vector, k, filter)?)
    }

    /// Embed `text` and search with the result.
    pub fn search_text(
        &self,
        text: &str,
        filter: &MetadataFilter,
        k: usize,
    ) -> ServiceResult<Vec<SearchResult>> {
        filter.validate()?;
        let vector = self.embed_once(text)?;
        self.search(&vector, filter, k)
    }

    /// Cluster every stored item matching `filter`.
    ///
    /// The method and parameters are validated before anything is fetched.
    pub fn cluster(
        &self,
        filter: &MetadataFilter,
        method: &str,
        params: &ClusterParams,
    ) -> ServiceResult<ClusterOutcome> {
        filter.validate()?;
        let request = self.engine.resolve(method, params)?;

        let stored = self.store.get_all(filter, self.fetch_page_size)?;
        let (ids, vectors): (Vec<String>, Vec<Vec<f32>>) = stored
            .into_iter()
            .map(|entry| (entry.id, entry.embedding))
            .unzip();

        Ok(self.engine.run(ids, &vectors, &request)?)
    }

    /// Embed one text without storing it.
    pub fn embed_once(&self, text: &str) -> ServiceResult<Vec<f32>> {
        Ok(self.generator.generate_one(text)?)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            count: self.store.count(),
            dimension: self.store.dimension().map(|d| d.get()),
            provider: self.generator.provider_name().to_string(),
            model: self.generator.model().to_string(),
        }
    }
}

/// Async facade over a shared `EmbeddingService`.
#[derive(Clone)]
pub struct AsyncEmbeddingService {
    inner: Arc<EmbeddingService>,
}

impl AsyncEmbeddingService {
    pub fn new(service: EmbeddingService) -> Self {
        Self {
            inner: Arc::new(service),
        }
    }

    pub fn inner(&self) -> &EmbeddingService {
        &self.inner
    }

    async fn run<T, F>(&self, call: F) -> ServiceResult<T>
    where
        F: FnOnce(&EmbeddingService) -> ServiceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let service = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || call(&service))
            .await
            .map_err(|e| ServiceError::TaskFailed {
                reason: e.to_string(),
            })?
    }

    pub async fn generate_and_store(&self, items: Vec<Item>) -> StoreReport {
        let service = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || service.generate_and_store(&items)).await {
            Ok(report) => report,
            Err(e) => StoreReport {
                stored_count: 0,
                errors: vec![
                    ServiceError::TaskFailed {
                        reason: e.to_string(),
                    }
                    .to_string(),
                ],
            },
        }
    }

    pub async fn try_generate_and_store(&self, items: Vec<Item>) -> ServiceResult<usize> {
        self.run(move |service| service.try_generate_and_store(&items))
            .await
    }

    pub async fn search(
        &self,
        query_vector: Vec<f32>,
        filter: MetadataFilter,
        k: usize,
    ) -> ServiceResult<Vec<SearchResult>> {
        self.run(move |service| service.search(&query_vector, &filter, k))
            .await
    }

    pub async fn cluster(
        &self,
        filter: MetadataFilter,
        method: String,
        params: ClusterParams,
    ) -> ServiceResult<ClusterOutcome> {
        self.run(move |service| service.cluster(&filter, &method, &params))
            .await
    }

    pub async fn embed_once(&self, text: String) -> ServiceResult<Vec<f32>> {
        self.run(move |service| service.embed_once(&text)).await
    }
}
