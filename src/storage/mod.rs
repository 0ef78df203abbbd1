//! Object storage addressed by bucket and key.

pub mod local;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use local::LocalObjectStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("Invalid object key {0:?}")]
    InvalidKey(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates the bucket if absent; succeeds if it already exists.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Writes `data` under `key`, replacing any existing object.
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), StorageError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;
}

/// Rejects keys that are empty, absolute or escape the bucket.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let escapes = key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if key.is_empty() || escapes {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
