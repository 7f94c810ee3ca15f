//! Dendrogram arena returned by hierarchical clustering.
//!
//! Nodes live in a `Vec` indexed by creation order: the `n` leaves first,
//! then one internal node per merge. A merge may only reference nodes that
//! already exist, so every child index is smaller than its parent's and the
//! last node is the root. The arena is also the wire form: it serializes as
//! `{"leafCount": n, "nodes": [...]}` and is validated again on the way in.

use super::ClusteringError;
use super::agglomerative::Merge;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One arena slot. Internal nodes name their children by arena index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClusterNode {
    Leaf {
        item_id: String,
        count: usize,
    },
    Internal {
        children: [usize; 2],
        count: usize,
        distance: f64,
    },
}

impl ClusterNode {
    pub fn count(&self) -> usize {
        match self {
            ClusterNode::Leaf { count, .. } | ClusterNode::Internal { count, .. } => *count,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, ClusterNode::Leaf { .. })
    }
}

/// Full binary merge tree over `leaf_count` items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawDendrogram")]
pub struct Dendrogram {
    leaf_count: usize,
    nodes: Vec<ClusterNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDendrogram {
    leaf_count: usize,
    nodes: Vec<ClusterNode>,
}

impl TryFrom<RawDendrogram> for Dendrogram {
    type Error = ClusteringError;

    fn try_from(raw: RawDendrogram) -> Result<Self, Self::Error> {
        Self::from_nodes(raw.leaf_count, raw.nodes)
    }
}

impl Dendrogram {
    /// Build the arena from item ids and a bottom-up merge sequence.
    ///
    /// # Errors
    /// Returns `InvalidMerge` unless there are exactly `n - 1` merges, each
    /// joining two distinct, existing, not yet merged nodes.
    pub fn from_merges(item_ids: Vec<String>, merges: &[Merge]) -> Result<Self, ClusteringError> {
        let leaf_count = item_ids.len();
        let expected = leaf_count.saturating_sub(1);
        if merges.len() != expected {
            return Err(ClusteringError::InvalidMerge {
                step: merges.len().min(expected),
                reason: format!("expected {expected} merges for {leaf_count} items, got {}", merges.len()),
            });
        }

        let mut nodes: Vec<ClusterNode> = item_ids
            .into_iter()
            .map(|item_id| ClusterNode::Leaf { item_id, count: 1 })
            .collect();
        nodes.reserve(merges.len());
        let mut merged = vec![false; leaf_count + merges.len()];

        for (step, merge) in merges.iter().enumerate() {
            let existing = nodes.len();
            for child in [merge.left, merge.right] {
                if child >= existing {
                    return Err(ClusteringError::InvalidMerge {
                        step,
                        reason: format!("node {child} does not exist yet"),
                    });
                }
                if merged[child] {
                    return Err(ClusteringError::InvalidMerge {
                        step,
                        reason: format!("node {child} was already merged"),
                    });
                }
            }
            if merge.left == merge.right {
                return Err(ClusteringError::InvalidMerge {
                    step,
                    reason: format!("node {} merged with itself", merge.left),
                });
            }

            merged[merge.left] = true;
            merged[merge.right] = true;
            let count = nodes[merge.left].count() + nodes[merge.right].count();
            nodes.push(ClusterNode::Internal {
                children: [merge.left, merge.right],
                count,
                distance: merge.distance,
            });
        }

        Ok(Self { leaf_count, nodes })
    }

    /// Rebuild an arena from its nodes, checking every structural invariant.
    ///
    /// # Errors
    /// Returns `InvalidTree` naming the first offending node.
    pub fn from_nodes(leaf_count: usize, nodes: Vec<ClusterNode>) -> Result<Self, ClusteringError> {
        let expected = (2 * leaf_count).saturating_sub(1);
        if nodes.len() != expected {
            return Err(ClusteringError::InvalidTree {
                node: nodes.len().min(expected),
                reason: format!("expected {expected} nodes for {leaf_count} leaves, got {}", nodes.len()),
            });
        }

        let invalid = |node: usize, reason: String| ClusteringError::InvalidTree { node, reason };
        let mut used = vec![false; nodes.len()];
        for (id, node) in nodes.iter().enumerate() {
            match node {
                ClusterNode::Leaf { count, .. } => {
                    if id >= leaf_count {
                        return Err(invalid(id, "leaf after the first merge".to_string()));
                    }
                    if *count != 1 {
                        return Err(invalid(id, format!("leaf count is {count}")));
                    }
                }
                ClusterNode::Internal {
                    children: [left, right],
                    count,
                    distance,
                } => {
                    if id < leaf_count {
                        return Err(invalid(id, "internal node among the leaves".to_string()));
                    }
                    if left == right {
                        return Err(invalid(id, format!("node {left} merged with itself")));
                    }
                    for &child in [left, right] {
                        if child >= id {
                            return Err(invalid(id, format!("child {child} does not precede it")));
                        }
                        if used[child] {
                            return Err(invalid(id, format!("child {child} already has a parent")));
                        }
                        used[child] = true;
                    }
                    let sum = nodes[*left].count() + nodes[*right].count();
                    if *count != sum {
                        return Err(invalid(id, format!("count {count} but children hold {sum}")));
                    }
                    if distance.is_nan() {
                        return Err(invalid(id, "distance is NaN".to_string()));
                    }
                }
            }
        }

        Ok(Self { leaf_count, nodes })
    }

    /// Total node count, leaves included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn internal_count(&self) -> usize {
        self.nodes.len() - self.leaf_count
    }

    /// Id of the root node; a single leaf is its own root.
    pub fn root(&self) -> Option<usize> {
        self.nodes.len().checked_sub(1)
    }

    pub fn node(&self, id: usize) -> Option<&ClusterNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    /// Number of leaves under `id`.
    pub fn count(&self, id: usize) -> Option<usize> {
        self.nodes.get(id).map(ClusterNode::count)
    }

    /// Item ids under `id`, left to right.
    pub fn leaf_ids(&self, id: usize) -> Vec<&str> {
        self.leaf_indices(id)
            .into_iter()
            .filter_map(|leaf| match self.nodes.get(leaf) {
                Some(ClusterNode::Leaf { item_id, .. }) => Some(item_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Item ids of the whole tree, left to right from the root.
    pub fn item_ids(&self) -> Vec<&str> {
        self.root().map_or_else(Vec::new, |root| self.leaf_ids(root))
    }

    /// Flat labels obtained by undoing the last `n_clusters - 1` merges.
    ///
    /// Returns one label per leaf, in leaf order. Labels are numbered by the
    /// order of each cluster's first leaf.
    pub fn cut(&self, n_clusters: usize) -> Result<Vec<usize>, ClusteringError> {
        if self.leaf_count == 0 {
            return Ok(Vec::new());
        }
        if n_clusters == 0 || n_clusters > self.leaf_count {
            return Err(ClusteringError::InvalidClusterCount(n_clusters));
        }

        let mut clusters: BTreeSet<usize> = BTreeSet::new();
        if let Some(root) = self.root() {
            clusters.insert(root);
        }
        while clusters.len() < n_clusters {
            // The newest node is always a merge while clusters < leaves
            let Some(newest) = clusters.pop_last() else { break };
            match self.nodes.get(newest) {
                Some(ClusterNode::Internal { children, .. }) => {
                    clusters.extend(children);
                }
                _ => {
                    clusters.insert(newest);
                    break;
                }
            }
        }

        let mut labels = vec![usize::MAX; self.leaf_count];
        let mut members: Vec<Vec<usize>> = clusters
            .iter()
            .map(|&cluster| self.leaf_indices(cluster))
            .collect();
        members.sort_by_key(|leaves| leaves.iter().min().copied());
        for (label, leaves) in members.iter().enumerate() {
            for &leaf in leaves {
                labels[leaf] = label;
            }
        }
        Ok(labels)
    }

    fn leaf_indices(&self, id: usize) -> Vec<usize> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match self.nodes.get(current) {
                Some(ClusterNode::Leaf { .. }) => leaves.push(current),
                Some(ClusterNode::Internal { children, .. }) => {
                    stack.push(children[1]);
                    stack.push(children[0]);
                }
                None => {}
            }
        }
        leaves
    }
}
