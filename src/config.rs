//! Configuration for the embedding, storage and clustering service.
//!
//! Layered sources, later ones winning:
//! - Default values
//! - TOML configuration file (`.topicvec/settings.toml`, found by walking up
//!   from the current directory)
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `TV_` and use double underscores
//! to separate nested levels:
//! - `TV_EMBEDDING__BATCH_SIZE=50` sets `embedding.batch_size`
//! - `TV_CLUSTERING__SEED=7` sets `clustering.seed`
//! - `TV_STORE_PATH=/data/store` sets `store_path`

use crate::clustering::{DEFAULT_N_CLUSTERS, Linkage};
use crate::error::{ServiceError, ServiceResult};
use crate::vector::MAX_BATCH_SIZE;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".topicvec";
const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding the vector log and manifest
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Global debug mode
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which embedding backend to use.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// OpenAI-compatible HTTP endpoint
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// Local fastembed model
    #[serde(rename = "fastembed")]
    FastEmbed,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    /// Model identifier sent with every request
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Texts per provider call, at most 100
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Model cache for the fastembed provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StoreConfig {
    /// Page size used when fetching every vector matching a filter
    #[serde(default = "default_fetch_page_size")]
    pub fetch_page_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClusteringConfig {
    /// Cluster count when a request gives none or an unusable one
    #[serde(default = "default_n_clusters")]
    pub default_n_clusters: usize,

    #[serde(default)]
    pub default_linkage: Linkage,

    /// Fixed k-means seed; unset means a fresh seed per run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Worker threads for clustering (defaults to CPU count)
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_version() -> u32 {
    1
}
fn default_store_path() -> PathBuf {
    PathBuf::from(".topicvec/store")
}
fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}
fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai/".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_fetch_page_size() -> usize {
    1000
}
fn default_n_clusters() -> usize {
    DEFAULT_N_CLUSTERS
}
fn default_max_iterations() -> usize {
    300
}
fn default_tolerance() -> f64 {
    1e-4
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            store_path: default_store_path(),
            debug: false,
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            clustering: ClusteringConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_embedding_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            cache_dir: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            fetch_page_size: default_fetch_page_size(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            default_n_clusters: default_n_clusters(),
            default_linkage: Linkage::default(),
            seed: None,
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            parallel_threads: default_parallel_threads(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // Relative store paths are anchored at the workspace root
                if settings.store_path.is_relative() {
                    if let Some(root) = Self::workspace_root() {
                        settings.store_path = root.join(&settings.store_path);
                    }
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore (__) separates nested levels
            .merge(Env::prefixed("TV_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
    }

    /// Find the workspace config by looking for a .topicvec directory
    /// from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .topicvec is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Check values figment cannot express as types.
    pub fn validate(&self) -> ServiceResult<()> {
        let invalid = |reason: String| Err(ServiceError::Config { reason });

        if self.embedding.batch_size == 0 || self.embedding.batch_size > MAX_BATCH_SIZE {
            return invalid(format!(
                "embedding.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.embedding.batch_size
            ));
        }
        if self.embedding.model.trim().is_empty() {
            return invalid("embedding.model must not be empty".to_string());
        }
        if self.store.fetch_page_size == 0 {
            return invalid("store.fetch_page_size must be at least 1".to_string());
        }
        if self.clustering.default_n_clusters == 0 {
            return invalid("clustering.default_n_clusters must be at least 1".to_string());
        }
        if !self.clustering.tolerance.is_finite() || self.clustering.tolerance < 0.0 {
            return invalid(format!(
                "clustering.tolerance must be a non-negative number, got {}",
                self.clustering.tolerance
            ));
        }
        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_in(Path::new("."), force)
    }

    /// Create the default settings file under `root`
    pub fn init_config_file_in(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# topicvec configuration file

# Version of the configuration schema
version = 1

# Directory for the vector log and manifest (relative to workspace root)
store_path = ".topicvec/store"

# Global debug mode
debug = false

[embedding]
# "openai" for any OpenAI-compatible endpoint, "fastembed" for a local model
provider = "openai"

# Model identifier; fastembed accepts all-minilm-l6-v2, bge-small-en-v1.5,
# bge-base-en-v1.5 and multilingual-e5-small
model = "text-embedding-004"

api_base = "https://generativelanguage.googleapis.com/v1beta/openai/"

# Environment variable that holds the API key
api_key_env = "GEMINI_API_KEY"

# Texts per provider call (1 to {MAX_BATCH_SIZE})
batch_size = {MAX_BATCH_SIZE}

timeout_secs = 30

[store]
# Page size used when fetching all vectors for clustering
fetch_page_size = 1000

[clustering]
# Used when a request gives no usable n_clusters
default_n_clusters = {DEFAULT_N_CLUSTERS}

# ward, complete, average or single
default_linkage = "ward"

# Uncomment for reproducible k-means labels
# seed = 42

max_iterations = 300
tolerance = 0.0001

# Worker threads for clustering (defaults to CPU count)
# parallel_threads = {}

[logging]
# trace, debug, info, warn or error
level = "info"
"#,
            num_cpus::get()
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.store_path, PathBuf::from(".topicvec/store"));
        assert_eq!(settings.embedding.provider, ProviderKind::OpenAi);
        assert_eq!(settings.embedding.model, "text-embedding-004");
        assert_eq!(settings.embedding.batch_size, 100);
        assert_eq!(settings.store.fetch_page_size, 1000);
        assert_eq!(settings.clustering.default_n_clusters, 5);
        assert_eq!(settings.clustering.default_linkage, Linkage::Ward);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(
            &config_path,
            r#"
store_path = "/var/lib/topicvec"

[embedding]
provider = "fastembed"
model = "all-minilm-l6-v2"
batch_size = 32

[clustering]
default_linkage = "average"
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.store_path, PathBuf::from("/var/lib/topicvec"));
        assert_eq!(settings.embedding.provider, ProviderKind::FastEmbed);
        assert_eq!(settings.embedding.batch_size, 32);
        assert_eq!(settings.clustering.default_linkage, Linkage::Average);
        // Untouched sections keep their defaults
        assert_eq!(settings.store.fetch_page_size, 1000);
        assert_eq!(settings.embedding.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[clustering]\nmax_iterations = 50\n").unwrap();

        unsafe {
            std::env::set_var("TV_CLUSTERING__MAX_ITERATIONS", "75");
        }
        let settings = Settings::load_from(&config_path);
        unsafe {
            std::env::remove_var("TV_CLUSTERING__MAX_ITERATIONS");
        }

        assert_eq!(settings.unwrap().clustering.max_iterations, 75);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut settings = Settings::default();
        settings.embedding.batch_size = 250;
        assert!(matches!(
            settings.validate(),
            Err(ServiceError::Config { .. })
        ));

        let mut settings = Settings::default();
        settings.store.fetch_page_size = 0;
        assert!(settings.validate().is_err());

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[clustering]\ndefault_linkage = \"median\"\n").unwrap();
        assert!(Settings::load_from(&config_path).is_err());
    }

    #[test]
    fn test_init_template_parses() {
        let temp_dir = TempDir::new().unwrap();
        let path = Settings::init_config_file_in(temp_dir.path(), false).unwrap();
        assert!(Settings::init_config_file_in(temp_dir.path(), false).is_err());
        Settings::init_config_file_in(temp_dir.path(), true).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: Settings = toml::from_str(&content).unwrap();
        assert_eq!(parsed.embedding.model, "text-embedding-004");
        assert_eq!(parsed.clustering.tolerance, 1e-4);
    }

    #[test]
    fn test_save_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("settings.toml");
        let mut settings = Settings::default();
        settings.clustering.seed = Some(9);
        settings.save(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.clustering.seed, Some(9));
    }
}
