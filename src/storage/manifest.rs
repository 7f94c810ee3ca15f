//! Store manifest written next to the vector log.

use super::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Highest manifest and log format version this build understands.
pub const FORMAT_VERSION: u32 = 1;

/// Describes what a store directory holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version of the manifest and log
    pub version: u32,

    /// Embedding model that produced the stored vectors
    pub model: String,

    /// Vector dimension, unset until the first upsert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,

    /// Distance metric used for queries
    pub metric: String,

    /// Number of live vectors
    pub count: usize,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Manifest {
    pub fn new(model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: FORMAT_VERSION,
            model: model.into(),
            dimension: None,
            metric: "cosine".to_string(),
            count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the current store shape.
    pub fn touch(&mut self, count: usize, dimension: Option<usize>) {
        self.count = count;
        self.dimension = dimension;
        self.updated_at = Utc::now();
    }

    /// Load the manifest from `dir`, or `None` if the directory has none yet.
    pub fn load(dir: &Path) -> StoreResult<Option<Self>> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)?;
        let manifest: Manifest = serde_json::from_str(&json)
            .map_err(|e| StoreError::Manifest(format!("Failed to parse {}: {e}", path.display())))?;

        if manifest.version > FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: manifest.version,
                supported: FORMAT_VERSION,
            });
        }
        Ok(Some(manifest))
    }

    pub fn save(&self, dir: &Path) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::Manifest(format!("Failed to serialize manifest: {e}")))?;
        fs::write(dir.join(MANIFEST_FILE), json)?;
        Ok(())
    }
}
