//! Batched reads of the plant catalog.
//!
//! The catalog's bulk-read API accepts at most [`MAX_BATCH_SIZE`] keys per
//! request. The fetcher deduplicates the requested ids (remembering the order
//! in which they were first seen), splits them into batches, issues the
//! batches concurrently and merges the responses into one id to name mapping.
//!
//! Missing catalog rows are not an error: the id is simply absent from the
//! mapping. A failed batch fails the whole fetch and the results of the other
//! batches are discarded.

use crate::metrics_defs::{CATALOG_BATCHES, CATALOG_FETCH_DURATION};
use crate::store::{CatalogStore, StoreError};
use crate::types::{PlantId, PlantRecord};
use indexmap::IndexSet;
use shared::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Hard limit of the catalog's bulk-read API.
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CatalogLookupError {
    #[error("catalog batch {batch} failed: {source}")]
    Store {
        batch: usize,
        #[source]
        source: StoreError,
    },

    #[error("catalog batch task failed: {0}")]
    Task(String),
}

/// Result of a catalog fetch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogFetch {
    /// Requested ids, deduplicated, in first-seen order.
    pub ordered_ids: Vec<PlantId>,
    /// Names of the ids found in the catalog.
    pub names: HashMap<PlantId, String>,
}

/// Result of one batch task, tagged with the batch index for error reporting.
type BatchResult = (usize, Result<Vec<PlantRecord>, StoreError>);

#[derive(Clone)]
pub struct BatchCatalogFetcher {
    store: Arc<dyn CatalogStore>,
    // Bounds the number of bulk reads in flight for a single fetch.
    max_in_flight: usize,
}

impl BatchCatalogFetcher {
    pub fn new(store: Arc<dyn CatalogStore>, max_in_flight: usize) -> Self {
        BatchCatalogFetcher {
            store,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub async fn fetch(&self, ids: &[PlantId]) -> Result<CatalogFetch, CatalogLookupError> {
        let ordered_ids: Vec<PlantId> = ids
            .iter()
            .cloned()
            .collect::<IndexSet<PlantId>>()
            .into_iter()
            .collect();

        if ordered_ids.is_empty() {
            return Ok(CatalogFetch::default());
        }

        let started = Instant::now();
        let mut join_set = self.spawn_batches(&ordered_ids);
        let batches = join_set.len();

        let mut names = HashMap::with_capacity(ordered_ids.len());

        // Join barrier: every batch must succeed before the mapping is returned.
        // Returning early drops the join set, which aborts the batches still running.
        while let Some(joined) = join_set.join_next().await {
            let (batch, result) = joined.map_err(|e| CatalogLookupError::Task(e.to_string()))?;
            let records = result.map_err(|source| {
                tracing::warn!(batch, error = %source, "Catalog batch failed");
                CatalogLookupError::Store { batch, source }
            })?;

            for record in records {
                if let Some(name) = record.plant_name {
                    names.insert(record.plant_id, name);
                }
            }
        }

        histogram!(CATALOG_FETCH_DURATION).record(started.elapsed().as_secs_f64());
        tracing::debug!(
            plants = ordered_ids.len(),
            batches,
            found = names.len(),
            "Fetched plant catalog"
        );

        Ok(CatalogFetch { ordered_ids, names })
    }

    fn spawn_batches(&self, ordered_ids: &[PlantId]) -> JoinSet<BatchResult> {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut join_set = JoinSet::new();

        for (batch, chunk) in ordered_ids.chunks(MAX_BATCH_SIZE).enumerate() {
            let store = self.store.clone();
            let permits = permits.clone();
            let chunk = chunk.to_vec();

            join_set.spawn(async move {
                // Only fails if the semaphore was closed.
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (batch, Err(StoreError::Unavailable(e.to_string()))),
                };
                counter!(CATALOG_BATCHES).increment(1);
                (batch, store.batch_get(&chunk).await)
            });
        }

        join_set
    }
}
