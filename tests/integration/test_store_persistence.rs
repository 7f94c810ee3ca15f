//! The persistent store across process restarts.

use crate::common::{KeywordProvider, keyword_items, service_in};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;
use topicvec::storage::{LOG_FILE, MANIFEST_FILE, Page};
use topicvec::types::ItemMetadata;
use topicvec::{ItemType, MetadataFilter, PersistentVectorStore, VectorStore};

fn meta(topic: &str) -> ItemMetadata {
    ItemMetadata::new(topic.to_string(), None, ItemType::Problem)
}

#[test]
fn test_items_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let service = service_in(&dir, Arc::new(KeywordProvider::default()));
        service
            .try_generate_and_store(&keyword_items("t1", ItemType::Problem, &["alpha", "beta"], 2))
            .unwrap();
    }

    let service = service_in(&dir, Arc::new(KeywordProvider::default()));
    let stats = service.stats();
    assert_eq!(stats.count, 4);
    assert_eq!(stats.dimension, Some(crate::common::DIMENSION));

    let results = service
        .search(
            &KeywordProvider::vector_for("alpha statement 1"),
            &MetadataFilter::new("t1", ItemType::Problem),
            1,
        )
        .unwrap();
    assert_eq!(results[0].id, "t1-alpha-1");
}

#[test]
fn test_overwrite_then_compact_keeps_latest_value() {
    let dir = TempDir::new().unwrap();
    let store = PersistentVectorStore::open(dir.path(), "m").unwrap();

    for round in 0..3 {
        let value = round as f32 + 1.0;
        store
            .upsert(
                &["a".to_string(), "b".to_string()],
                &[vec![value, 0.0], vec![0.0, value]],
                &[meta("t1"), meta("t1")],
            )
            .unwrap();
    }

    let report = store.compact().unwrap();
    assert_eq!(report.records, 2);
    assert!(report.bytes_after < report.bytes_before);
    drop(store);

    let store = PersistentVectorStore::open(dir.path(), "m").unwrap();
    assert_eq!(store.count(), 2);
    let filter = MetadataFilter::new("t1", ItemType::Problem);
    let page = store.get(&filter, Page::first(10)).unwrap();
    let a = page.iter().find(|v| v.id == "a").unwrap();
    assert_eq!(a.embedding, vec![3.0, 0.0]);
}

#[test]
fn test_dimension_is_fixed_after_first_upsert() {
    let dir = TempDir::new().unwrap();
    let store = PersistentVectorStore::open(dir.path(), "m").unwrap();
    store
        .upsert(&["a".to_string()], &[vec![1.0, 0.0, 0.0]], &[meta("t1")])
        .unwrap();

    let err = store
        .upsert(&["b".to_string()], &[vec![1.0, 0.0]], &[meta("t1")])
        .unwrap_err();
    assert!(err.to_string().contains("holds 3-dimensional"), "{err}");
    assert_eq!(store.count(), 1);
}

#[test]
fn test_torn_write_is_dropped_on_open() {
    let dir = TempDir::new().unwrap();
    {
        let store = PersistentVectorStore::open(dir.path(), "m").unwrap();
        store
            .upsert(&["a".to_string()], &[vec![1.0, 2.0]], &[meta("t1")])
            .unwrap();
    }

    // Half a record header, as left by a crash mid-append
    let mut log = OpenOptions::new()
        .append(true)
        .open(dir.path().join(LOG_FILE))
        .unwrap();
    log.write_all(&[0x40, 0x00]).unwrap();
    drop(log);

    let store = PersistentVectorStore::open(dir.path(), "m").unwrap();
    assert_eq!(store.count(), 1);
    store
        .upsert(&["b".to_string()], &[vec![2.0, 1.0]], &[meta("t1")])
        .unwrap();
    drop(store);

    let store = PersistentVectorStore::open(dir.path(), "m").unwrap();
    assert_eq!(store.count(), 2);
}

#[test]
fn test_torn_write_while_open_does_not_hide_later_records() {
    let dir = TempDir::new().unwrap();
    let store = PersistentVectorStore::open(dir.path(), "m").unwrap();
    store
        .upsert(&["a".to_string()], &[vec![1.0, 2.0]], &[meta("t1")])
        .unwrap();

    // A length prefix promising 64 bytes, followed by only a few
    let mut log = OpenOptions::new()
        .append(true)
        .open(dir.path().join(LOG_FILE))
        .unwrap();
    log.write_all(&[0x40, 0x00, 0x00, 0x00, 0x01, 0x01]).unwrap();
    drop(log);

    store
        .upsert(&["b".to_string()], &[vec![2.0, 1.0]], &[meta("t1")])
        .unwrap();
    store
        .upsert(&["c".to_string()], &[vec![3.0, 1.0]], &[meta("t1")])
        .unwrap();
    drop(store);

    let store = PersistentVectorStore::open(dir.path(), "m").unwrap();
    assert_eq!(store.count(), 3);
    let ids: Vec<_> = store
        .get_all(&MetadataFilter::new("t1", ItemType::Problem), 10)
        .unwrap()
        .into_iter()
        .map(|v| v.id)
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn test_reopening_does_not_rewrite_manifest() {
    let dir = TempDir::new().unwrap();
    {
        let service = service_in(&dir, Arc::new(KeywordProvider::default()));
        service
            .try_generate_and_store(&keyword_items("t1", ItemType::Problem, &["alpha"], 2))
            .unwrap();
    }
    let manifest = dir.path().join("store").join(MANIFEST_FILE);
    let before = std::fs::read(&manifest).unwrap();

    let service = service_in(&dir, Arc::new(KeywordProvider::default()));
    assert_eq!(service.stats().count, 2);
    drop(service);

    assert_eq!(std::fs::read(&manifest).unwrap(), before);
}

#[test]
fn test_get_all_pages_through_everything() {
    let dir = TempDir::new().unwrap();
    let store = PersistentVectorStore::open(dir.path(), "m").unwrap();
    let ids: Vec<String> = (0..25).map(|i| format!("id-{i}")).collect();
    let vectors: Vec<Vec<f32>> = (0..25).map(|i| vec![i as f32 + 1.0, 1.0]).collect();
    let metadatas: Vec<_> = (0..25).map(|_| meta("t1")).collect();
    store.upsert(&ids, &vectors, &metadatas).unwrap();

    let all = store
        .get_all(&MetadataFilter::new("t1", ItemType::Problem), 10)
        .unwrap();
    assert_eq!(all.len(), 25);
    let got: Vec<_> = all.iter().map(|v| v.id.clone()).collect();
    assert_eq!(got, ids);
}
