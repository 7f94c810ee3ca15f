#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;
use topicvec::clustering::ClusteringEngine;
use topicvec::config::ClusteringConfig;
use topicvec::{
    EmbeddingGenerator, EmbeddingProvider, EmbeddingService, Item, ItemType,
    PersistentVectorStore, ProviderError,
};

pub const DIMENSION: usize = 4;

/// Embeds texts by their first word so tests control the geometry.
///
/// "alpha", "beta" and "gamma" map to orthogonal axes; a trailing number
/// nudges the vector along the fourth axis so items stay distinct.
#[derive(Default)]
pub struct KeywordProvider {
    pub calls: Mutex<Vec<usize>>,
    pub fail: bool,
}

impl KeywordProvider {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut words = text.split_whitespace();
        let mut vector = match words.next() {
            Some("alpha") => vec![1.0, 0.0, 0.0, 0.0],
            Some("beta") => vec![0.0, 1.0, 0.0, 0.0],
            Some("gamma") => vec![0.0, 0.0, 1.0, 0.0],
            _ => vec![0.5, 0.5, 0.5, 0.0],
        };
        let nudge = words
            .last()
            .and_then(|w| w.parse::<f32>().ok())
            .unwrap_or(0.0);
        vector[3] = nudge * 0.01;
        vector
    }
}

impl EmbeddingProvider for KeywordProvider {
    fn embed(&self, texts: &[&str], _model: &str) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.lock().push(texts.len());
        if self.fail {
            return Err(ProviderError::Status {
                provider: "keyword".to_string(),
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

pub fn engine() -> ClusteringEngine {
    ClusteringEngine::new(ClusteringConfig {
        parallel_threads: 2,
        seed: Some(7),
        ..ClusteringConfig::default()
    })
    .expect("Failed to build clustering engine")
}

/// A service over a persistent store in `dir`.
pub fn service_in(dir: &TempDir, provider: Arc<KeywordProvider>) -> EmbeddingService {
    let store = PersistentVectorStore::open(dir.path().join("store"), "keyword-model")
        .expect("Failed to open store");
    let generator = EmbeddingGenerator::new(provider, "keyword-model");
    EmbeddingService::new(generator, Arc::new(store), engine())
}

/// `n` items per keyword, all under `topic`.
pub fn keyword_items(topic: &str, item_type: ItemType, keywords: &[&str], n: usize) -> Vec<Item> {
    keywords
        .iter()
        .flat_map(|keyword| {
            (0..n).map(move |i| {
                Item::new(
                    format!("{topic}-{keyword}-{i}"),
                    format!("{keyword} statement {i}"),
                    topic,
                    item_type,
                )
            })
        })
        .collect()
}
