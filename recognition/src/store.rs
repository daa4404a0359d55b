//! Storage used by the pipeline: the bucket holding the uploads and the table
//! the readings are written to.

use async_trait::async_trait;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store request timed out: {0}")]
    Timeout(String),

    #[error("could not build store request: {0}")]
    InvalidRequest(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether `key` exists. Any failure to tell counts as absent.
    async fn exists(&self, bucket: &str, key: &str) -> bool;

    /// Reads `key`, `None` if there is no such object.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes a JSON document to `key`, replacing any existing object.
    async fn put_json(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError>;
}

/// A value read from an image, as stored in the results table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reading {
    /// Partition key.
    pub company: String,
    /// `<timestamp>#<mac>#<file name>`, see [`crate::keys::reading_sort_key`].
    pub sort_key: String,
    pub image_key: String,
    pub value: String,
    pub model: String,
    pub mac_addr: String,
    /// Empty when the device sent no timestamp.
    pub timestamp: String,
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn put(&self, reading: &Reading) -> Result<(), StoreError>;
}
