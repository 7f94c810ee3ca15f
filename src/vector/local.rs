//! Local embedding provider backed by fastembed.
//!
//! Runs an ONNX sentence-embedding model in process. The model is loaded
//! (and downloaded into the cache directory if needed) on the first call to
//! `embed`, not at construction.

use crate::vector::{EmbeddingProvider, ProviderError, VectorDimension};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::info;

/// Model names accepted by `FastEmbedProvider`, with their output dimension.
const SUPPORTED_MODELS: &[(&str, usize)] = &[
    ("all-minilm-l6-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("multilingual-e5-small", 384),
];

/// Parse a configured model name into a fastembed model.
pub fn parse_embedding_model(name: &str) -> Option<EmbeddingModel> {
    match name.trim().to_ascii_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminilml6v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" | "bgesmallenv15" => Some(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "bgebaseenv15" => Some(EmbeddingModel::BGEBaseENV15),
        "multilingual-e5-small" | "multilinguale5small" => {
            Some(EmbeddingModel::MultilingualE5Small)
        }
        _ => None,
    }
}

/// Canonical name for a supported model.
pub fn model_to_string(model: &EmbeddingModel) -> &'static str {
    match model {
        EmbeddingModel::BGESmallENV15 => "bge-small-en-v1.5",
        EmbeddingModel::BGEBaseENV15 => "bge-base-en-v1.5",
        EmbeddingModel::MultilingualE5Small => "multilingual-e5-small",
        _ => "all-minilm-l6-v2",
    }
}

/// Fastembed provider serving exactly one model.
pub struct FastEmbedProvider {
    model: Mutex<Option<TextEmbedding>>,
    kind: EmbeddingModel,
    model_name: &'static str,
    dimension: VectorDimension,
    cache_dir: Option<PathBuf>,
}

impl FastEmbedProvider {
    /// Prepare a provider for `model_name`, cached under `cache_dir`.
    ///
    /// # Errors
    /// Returns `ModelInit` for unknown model names.
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self, ProviderError> {
        let model = parse_embedding_model(model_name).ok_or_else(|| {
            let known: Vec<&str> = SUPPORTED_MODELS.iter().map(|(name, _)| *name).collect();
            ProviderError::ModelInit(format!(
                "unknown fastembed model '{model_name}' (known: {})",
                known.join(", ")
            ))
        })?;
        let canonical = model_to_string(&model);
        let dimension = SUPPORTED_MODELS
            .iter()
            .find(|(name, _)| *name == canonical)
            .map(|(_, dim)| *dim)
            .unwrap_or(384);

        Ok(Self {
            model: Mutex::new(None),
            kind: model,
            model_name: canonical,
            dimension: VectorDimension::new(dimension)?,
            cache_dir,
        })
    }

    fn load(&self) -> Result<TextEmbedding, ProviderError> {
        info!(model = self.model_name, "loading fastembed model");
        let mut options =
            InitOptions::new(self.kind.clone()).with_show_download_progress(false);
        if let Some(dir) = &self.cache_dir {
            options = options.with_cache_dir(dir.clone());
        }
        TextEmbedding::try_new(options).map_err(|e| ProviderError::ModelInit(e.to_string()))
    }

    pub fn model_name(&self) -> &'static str {
        self.model_name
    }

    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, texts: &[&str], model: &str) -> Result<Vec<Vec<f32>>, ProviderError> {
        let requested = parse_embedding_model(model).map(|m| model_to_string(&m));
        if requested != Some(self.model_name) {
            return Err(ProviderError::ModelMismatch {
                provider: self.name().to_string(),
                requested: model.to_string(),
                served: self.model_name.to_string(),
            });
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();
        let mut guard = self.model.lock();
        if guard.is_none() {
            *guard = Some(self.load()?);
        }
        let Some(model) = guard.as_mut() else {
            return Err(ProviderError::EmbeddingFailed("model not loaded".to_string()));
        };
        let embeddings = model
            .embed(text_strings, None)
            .map_err(|e| ProviderError::EmbeddingFailed(e.to_string()))?;

        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }
        Ok(embeddings)
    }

    fn name(&self) -> &str {
        "fastembed"
    }
}
