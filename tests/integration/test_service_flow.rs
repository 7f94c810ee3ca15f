//! End-to-end flow: store items, search them, cluster them.

use crate::common::{KeywordProvider, keyword_items, service_in};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tempfile::TempDir;
use topicvec::{ClusterOutcome, ClusterParams, Item, ItemType, MetadataFilter};

#[test]
fn test_stored_item_is_its_own_nearest_neighbor() {
    let dir = TempDir::new().unwrap();
    let service = service_in(&dir, Arc::new(KeywordProvider::default()));
    let items = keyword_items("t1", ItemType::Problem, &["alpha", "beta"], 3);

    let report = service.generate_and_store(&items);
    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(report.stored_count, 6);

    let query = KeywordProvider::vector_for("beta statement 1");
    let results = service
        .search(&query, &MetadataFilter::new("t1", ItemType::Problem), 3)
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].id, "t1-beta-1");
    assert!(results[0].distance.abs() < 1e-5);
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert!(results.iter().all(|r| r.id.contains("beta")));
}

#[test]
fn test_search_stays_inside_the_partition() {
    let dir = TempDir::new().unwrap();
    let service = service_in(&dir, Arc::new(KeywordProvider::default()));

    let mut items = keyword_items("t1", ItemType::Problem, &["alpha"], 2);
    items.extend(keyword_items("t2", ItemType::Problem, &["alpha"], 2));
    items.extend(keyword_items("t1", ItemType::Solution, &["alpha"], 2));
    items.push(Item::new("q-item", "alpha statement 9", "t1", ItemType::Problem).with_question("q1"));
    service.try_generate_and_store(&items).unwrap();

    let query = KeywordProvider::vector_for("alpha");
    let t1_problems = service
        .search(&query, &MetadataFilter::new("t1", ItemType::Problem), 10)
        .unwrap();
    let ids: HashSet<_> = t1_problems.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["t1-alpha-0", "t1-alpha-1", "q-item"]));

    let with_question = service
        .search(
            &query,
            &MetadataFilter::new("t1", ItemType::Problem).with_question("q1"),
            10,
        )
        .unwrap();
    assert_eq!(with_question.len(), 1);
    assert_eq!(with_question[0].id, "q-item");

    let missing = service
        .search(&query, &MetadataFilter::new("t9", ItemType::Problem), 10)
        .unwrap();
    assert!(missing.is_empty());
}

#[test]
fn test_reupsert_overwrites_by_id() {
    let dir = TempDir::new().unwrap();
    let service = service_in(&dir, Arc::new(KeywordProvider::default()));

    service
        .try_generate_and_store(&[Item::new("p1", "alpha 1", "t1", ItemType::Problem)])
        .unwrap();
    service
        .try_generate_and_store(&[Item::new("p1", "gamma 1", "t1", ItemType::Problem)])
        .unwrap();

    assert_eq!(service.stats().count, 1);
    let results = service
        .search(
            &KeywordProvider::vector_for("gamma 1"),
            &MetadataFilter::new("t1", ItemType::Problem),
            1,
        )
        .unwrap();
    assert_eq!(results[0].id, "p1");
    assert!(results[0].distance < 1e-5);
}

#[test]
fn test_provider_failure_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(KeywordProvider::failing());
    let service = service_in(&dir, provider.clone());

    let report = service.generate_and_store(&keyword_items("t1", ItemType::Problem, &["alpha"], 3));
    assert_eq!(report.stored_count, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("503"));
    assert_eq!(service.stats().count, 0);
    assert_eq!(provider.calls.lock().len(), 1);
}

#[test]
fn test_invalid_items_never_reach_the_provider() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(KeywordProvider::default());
    let service = service_in(&dir, provider.clone());

    let items = vec![
        Item::new("ok", "alpha", "t1", ItemType::Problem),
        Item::new("", "alpha", "t1", ItemType::Problem),
    ];
    let err = service.try_generate_and_store(&items).unwrap_err();
    assert!(err.is_validation());
    assert!(provider.calls.lock().is_empty());
}

#[test]
fn test_empty_item_list_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(KeywordProvider::default());
    let service = service_in(&dir, provider.clone());

    let report = service.generate_and_store(&[]);
    assert!(report.is_success());
    assert_eq!(report.stored_count, 0);
    assert!(provider.calls.lock().is_empty());
}

#[test]
fn test_kmeans_recovers_keyword_groups() {
    let dir = TempDir::new().unwrap();
    let service = service_in(&dir, Arc::new(KeywordProvider::default()));
    service
        .try_generate_and_store(&keyword_items(
            "t1",
            ItemType::Solution,
            &["alpha", "beta", "gamma"],
            4,
        ))
        .unwrap();

    let outcome = service
        .cluster(
            &MetadataFilter::new("t1", ItemType::Solution),
            "kmeans",
            &ClusterParams::default().with_n_clusters(3).with_seed(3),
        )
        .unwrap();

    let ClusterOutcome::Flat(assignments) = outcome else {
        panic!("expected flat assignments");
    };
    assert_eq!(assignments.len(), 12);

    let mut label_of_keyword: HashMap<&str, usize> = HashMap::new();
    for assignment in &assignments {
        let keyword = assignment.id.split('-').nth(1).unwrap();
        let label = *label_of_keyword.entry(keyword).or_insert(assignment.cluster);
        assert_eq!(label, assignment.cluster, "{} split from its group", assignment.id);
    }
    let labels: HashSet<_> = label_of_keyword.values().collect();
    assert_eq!(labels.len(), 3);
}

#[test]
fn test_string_cluster_count_falls_back_to_default() {
    let dir = TempDir::new().unwrap();
    let service = service_in(&dir, Arc::new(KeywordProvider::default()));
    service
        .try_generate_and_store(&keyword_items("t1", ItemType::Problem, &["alpha", "beta", "gamma"], 3))
        .unwrap();

    // "lots" is unusable, so the default of five clusters applies
    let outcome = service
        .cluster(
            &MetadataFilter::new("t1", ItemType::Problem),
            "kmeans",
            &ClusterParams::default().with_n_clusters("lots"),
        )
        .unwrap();
    let ClusterOutcome::Flat(assignments) = outcome else {
        panic!("expected flat assignments");
    };
    let labels: HashSet<_> = assignments.iter().map(|a| a.cluster).collect();
    assert_eq!(labels.len(), 5);
}

#[test]
fn test_hierarchical_builds_the_full_tree() {
    let dir = TempDir::new().unwrap();
    let service = service_in(&dir, Arc::new(KeywordProvider::default()));
    let items = keyword_items("t1", ItemType::Problem, &["alpha", "beta"], 3);
    service.try_generate_and_store(&items).unwrap();

    let outcome = service
        .cluster(
            &MetadataFilter::new("t1", ItemType::Problem),
            "hierarchical",
            &ClusterParams::default().with_n_clusters(2).with_linkage("average"),
        )
        .unwrap();

    let ClusterOutcome::Tree(Some(tree)) = outcome else {
        panic!("expected a tree");
    };
    assert_eq!(tree.root().and_then(|root| tree.count(root)), Some(6));
    assert_eq!(tree.internal_count(), 5);

    let mut leaves: Vec<_> = tree.item_ids().into_iter().map(str::to_string).collect();
    leaves.sort();
    let mut expected: Vec<_> = items.iter().map(|i| i.id.clone()).collect();
    expected.sort();
    assert_eq!(leaves, expected);
}

#[test]
fn test_clustering_an_empty_partition() {
    let dir = TempDir::new().unwrap();
    let service = service_in(&dir, Arc::new(KeywordProvider::default()));
    let filter = MetadataFilter::new("nobody", ItemType::Problem);

    let flat = service
        .cluster(&filter, "kmeans", &ClusterParams::default())
        .unwrap();
    assert_eq!(flat, ClusterOutcome::Flat(Vec::new()));

    let tree = service
        .cluster(&filter, "hierarchical", &ClusterParams::default())
        .unwrap();
    assert_eq!(tree, ClusterOutcome::Tree(None));
}

#[test]
fn test_unknown_method_is_rejected() {
    let dir = TempDir::new().unwrap();
    let service = service_in(&dir, Arc::new(KeywordProvider::default()));
    let err = service
        .cluster(
            &MetadataFilter::new("t1", ItemType::Problem),
            "dbscan",
            &ClusterParams::default(),
        )
        .unwrap_err();
    assert_eq!(err.status_code(), "VALIDATION_ERROR");
}

#[test]
fn test_embed_once_does_not_store() {
    let dir = TempDir::new().unwrap();
    let service = service_in(&dir, Arc::new(KeywordProvider::default()));
    let vector = service.embed_once("gamma 2").unwrap();
    assert_eq!(vector, KeywordProvider::vector_for("gamma 2"));
    assert_eq!(service.stats().count, 0);
}
