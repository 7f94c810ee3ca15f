//! Properties of the clustering routines on generated data.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use topicvec::clustering::{Dendrogram, KMeansConfig, Linkage, agglomerate, kmeans};

fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect())
        .collect()
}

#[test]
fn test_kmeans_uses_every_label() {
    for (n, k) in [(10, 10), (40, 7), (100, 3), (5, 1)] {
        let vectors = random_vectors(n, 8, n as u64);
        let result = kmeans(&vectors, &KMeansConfig::new(k).with_seed(1)).unwrap();
        let labels: HashSet<_> = result.assignments.iter().copied().collect();
        assert_eq!(labels.len(), k, "n={n} k={k}");
        assert!(result.assignments.iter().all(|&label| label < k));
    }
}

#[test]
fn test_kmeans_is_reproducible_with_a_seed() {
    let vectors = random_vectors(60, 5, 9);
    let config = KMeansConfig::new(4).with_seed(42);
    let first = kmeans(&vectors, &config).unwrap();
    let second = kmeans(&vectors, &config).unwrap();
    assert_eq!(first.assignments, second.assignments);
}

#[test]
fn test_kmeans_rejects_too_many_clusters() {
    let vectors = random_vectors(3, 4, 1);
    assert!(kmeans(&vectors, &KMeansConfig::new(4)).is_err());

    let duplicates = vec![vec![1.0, 1.0]; 4];
    assert!(kmeans(&duplicates, &KMeansConfig::new(2)).is_err());
}

#[test]
fn test_every_linkage_yields_a_valid_dendrogram() {
    let vectors = random_vectors(30, 6, 5);
    let ids: Vec<String> = (0..30).map(|i| format!("item-{i}")).collect();

    for linkage in [Linkage::Ward, Linkage::Complete, Linkage::Average, Linkage::Single] {
        let merges = agglomerate(&vectors, linkage).unwrap();
        assert_eq!(merges.len(), 29, "{linkage}");
        assert!(
            merges.windows(2).all(|w| w[0].distance <= w[1].distance + 1e-9),
            "{linkage} heights must not decrease"
        );

        let dendrogram = Dendrogram::from_merges(ids.clone(), &merges).unwrap();
        assert_eq!(dendrogram.len(), 59);
        assert_eq!(dendrogram.count(58), Some(30));
        assert_eq!(dendrogram.internal_count(), 29);

        let leaves: HashSet<_> = dendrogram.item_ids().into_iter().collect();
        assert_eq!(leaves.len(), 30);
    }
}

#[test]
fn test_cut_matches_requested_count() {
    let vectors = random_vectors(20, 3, 17);
    let ids: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    let merges = agglomerate(&vectors, Linkage::Ward).unwrap();
    let dendrogram = Dendrogram::from_merges(ids, &merges).unwrap();

    for k in 1..=20 {
        let labels = dendrogram.cut(k).unwrap();
        assert_eq!(labels.len(), 20);
        let distinct: HashSet<_> = labels.iter().collect();
        assert_eq!(distinct.len(), k);
    }
}
