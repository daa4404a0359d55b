//! Read-only views of the key-value stores backing the service.
//!
//! The service never writes to any of these stores. Each trait is implemented
//! by the DynamoDB adapters in [`crate::dynamo`] and by the seeded in-memory
//! stores in [`crate::memory`].

use crate::types::{PlantId, PlantRecord, Subject};
use async_trait::async_trait;
use serde_json::{Map, Value};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store request timed out: {0}")]
    Timeout(String),

    #[error("malformed store response: {0}")]
    MalformedResponse(String),

    #[error("could not build store request: {0}")]
    InvalidRequest(String),
}

/// Per-user index of the plants a subject may see.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Returns the plant ids associated with `subject` in the store's natural
    /// order. Rows without a plant id are skipped.
    async fn plant_ids(&self, subject: &Subject) -> Result<Vec<PlantId>, StoreError>;
}

/// Plant metadata keyed by plant id.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Reads the records for `ids` in a single bulk request. Callers never pass
    /// more than [`crate::catalog::MAX_BATCH_SIZE`] ids. Ids without a record are
    /// simply absent from the result, in no particular order.
    async fn batch_get(&self, ids: &[PlantId]) -> Result<Vec<PlantRecord>, StoreError>;
}

/// Per-company device configuration documents.
#[async_trait]
pub trait DeviceConfigStore: Send + Sync {
    async fn get(
        &self,
        company: &str,
        sort_key: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError>;
}
