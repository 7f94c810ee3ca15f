//! Settings files and building a service from them.

use tempfile::TempDir;
use topicvec::config::ProviderKind;
use topicvec::{EmbeddingService, Linkage, Settings};

#[test]
fn test_init_writes_a_loadable_template() {
    let temp = TempDir::new().unwrap();
    let path = Settings::init_config_file_in(temp.path(), false).unwrap();
    assert!(path.ends_with(".topicvec/settings.toml"));

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings, {
        let mut expected = Settings::default();
        expected.clustering.parallel_threads = settings.clustering.parallel_threads;
        expected
    });
    assert_eq!(settings.embedding.provider, ProviderKind::OpenAi);
    assert_eq!(settings.clustering.default_linkage, Linkage::Ward);
    assert!(settings.validate().is_ok());

    assert!(Settings::init_config_file_in(temp.path(), false).is_err());
    assert!(Settings::init_config_file_in(temp.path(), true).is_ok());
}

#[test]
fn test_file_values_override_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("custom.toml");
    std::fs::write(
        &path,
        r#"
store_path = "vectors"

[embedding]
provider = "fastembed"
model = "bge-small-en-v1.5"
batch_size = 32

[clustering]
default_n_clusters = 8
default_linkage = "average"
seed = 99
"#,
    )
    .unwrap();

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.embedding.provider, ProviderKind::FastEmbed);
    assert_eq!(settings.embedding.batch_size, 32);
    assert_eq!(settings.clustering.default_n_clusters, 8);
    assert_eq!(settings.clustering.default_linkage, Linkage::Average);
    assert_eq!(settings.clustering.seed, Some(99));
    // Untouched sections keep their defaults
    assert_eq!(settings.store.fetch_page_size, 1000);
}

#[test]
fn test_invalid_batch_size_is_a_config_error() {
    let mut settings = Settings::default();
    settings.embedding.batch_size = 500;
    let err = settings.validate().unwrap_err();
    assert_eq!(err.status_code(), "CONFIG_ERROR");
}

#[test]
fn test_service_builds_without_an_api_key() {
    let temp = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.store_path = temp.path().join("store");
    settings.embedding.api_key_env = "TOPICVEC_KEY_NOT_SET_IN_TESTS".to_string();

    let service = EmbeddingService::from_settings(&settings).unwrap();
    let stats = service.stats();
    assert_eq!(stats.count, 0);
    assert_eq!(stats.dimension, None);
    assert_eq!(stats.provider, "openai");

    let err = service.embed_once("hello").unwrap_err();
    assert_eq!(err.status_code(), "PROVIDER_ERROR");
    assert!(err.to_string().contains("TOPICVEC_KEY_NOT_SET_IN_TESTS"));
}
