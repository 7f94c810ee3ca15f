use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(
        "Upsert arguments differ in length: {ids} ids, {vectors} vectors, {metadatas} metadatas"
    )]
    LengthMismatch {
        ids: usize,
        vectors: usize,
        metadatas: usize,
    },

    #[error(
        "Vector dimension mismatch: store holds {expected}-dimensional vectors, got {actual}\nSuggestion: Use the same embedding model for every item in a store"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector for '{0}' is empty")]
    EmptyVector(String),

    #[error("Vector ids must not be empty")]
    EmptyId,

    #[error("Field '{field}' is too long to store ({len} bytes)")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store log {path} is corrupted at byte {offset}: {reason}")]
    Corrupted {
        path: PathBuf,
        offset: usize,
        reason: String,
    },

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error(
        "Store format version {found} is newer than supported version {supported}\nSuggestion: Upgrade topicvec"
    )]
    UnsupportedVersion { found: u32, supported: u32 },
}

pub type StoreResult<T> = Result<T, StoreError>;
