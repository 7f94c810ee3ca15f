//! The tokio facade over the blocking service.

use crate::common::{KeywordProvider, keyword_items, service_in};
use std::sync::Arc;
use tempfile::TempDir;
use topicvec::{AsyncEmbeddingService, ClusterOutcome, ClusterParams, ItemType, MetadataFilter};

#[tokio::test]
async fn test_concurrent_requests_share_one_service() {
    let dir = TempDir::new().unwrap();
    let service = AsyncEmbeddingService::new(service_in(
        &dir,
        Arc::new(KeywordProvider::default()),
    ));

    let writers: Vec<_> = ["t1", "t2", "t3"]
        .into_iter()
        .map(|topic| {
            let service = service.clone();
            let items = keyword_items(topic, ItemType::Problem, &["alpha", "beta"], 5);
            tokio::spawn(async move { service.generate_and_store(items).await })
        })
        .collect();
    for writer in writers {
        let report = writer.await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.stored_count, 10);
    }
    assert_eq!(service.inner().stats().count, 30);

    let hits = service
        .search(
            KeywordProvider::vector_for("alpha statement 2"),
            MetadataFilter::new("t2", ItemType::Problem),
            2,
        )
        .await
        .unwrap();
    assert_eq!(hits[0].id, "t2-alpha-2");

    let outcome = service
        .cluster(
            MetadataFilter::new("t3", ItemType::Problem),
            "kmeans".to_string(),
            ClusterParams::default().with_n_clusters(2.0),
        )
        .await
        .unwrap();
    let ClusterOutcome::Flat(assignments) = outcome else {
        panic!("expected flat assignments");
    };
    assert_eq!(assignments.len(), 10);
}

#[tokio::test]
async fn test_validation_errors_pass_through() {
    let dir = TempDir::new().unwrap();
    let service = AsyncEmbeddingService::new(service_in(
        &dir,
        Arc::new(KeywordProvider::default()),
    ));

    let err = service
        .cluster(
            MetadataFilter::new("t1", ItemType::Problem),
            "hierarchical".to_string(),
            ClusterParams::default().with_linkage("centroid"),
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let vector = service.embed_once("beta 3".to_string()).await.unwrap();
    assert_eq!(vector, KeywordProvider::vector_for("beta 3"));
}
