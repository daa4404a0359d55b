//! Seeded in-memory stores, selected with the `memory` store backend.

use crate::store::{CatalogStore, DeviceConfigStore, MembershipStore, StoreError};
use crate::types::{PlantId, PlantRecord, Subject};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub struct MemoryMembershipStore {
    memberships: HashMap<String, Vec<PlantId>>,
}

impl MemoryMembershipStore {
    pub fn new(memberships: HashMap<String, Vec<PlantId>>) -> Self {
        MemoryMembershipStore { memberships }
    }
}

#[async_trait]
impl MembershipStore for MemoryMembershipStore {
    async fn plant_ids(&self, subject: &Subject) -> Result<Vec<PlantId>, StoreError> {
        Ok(self
            .memberships
            .get(subject.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

pub struct MemoryCatalogStore {
    plants: HashMap<PlantId, String>,
}

impl MemoryCatalogStore {
    pub fn new(plants: HashMap<PlantId, String>) -> Self {
        MemoryCatalogStore { plants }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn batch_get(&self, ids: &[PlantId]) -> Result<Vec<PlantRecord>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.plants
                    .get(id)
                    .map(|name| PlantRecord::new(id.clone(), name.clone()))
            })
            .collect())
    }
}

pub struct MemoryDeviceConfigStore {
    documents: HashMap<String, Map<String, Value>>,
}

impl MemoryDeviceConfigStore {
    /// `documents` are keyed by `<company>/<sort_key>`.
    pub fn new(documents: HashMap<String, Map<String, Value>>) -> Self {
        MemoryDeviceConfigStore { documents }
    }
}

#[async_trait]
impl DeviceConfigStore for MemoryDeviceConfigStore {
    async fn get(
        &self,
        company: &str,
        sort_key: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        Ok(self.documents.get(&format!("{company}/{sort_key}")).cloned())
    }
}
