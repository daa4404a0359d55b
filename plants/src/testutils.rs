use crate::store::{CatalogStore, MembershipStore, StoreError};
use crate::types::{PlantId, PlantRecord, Subject};
use crate::verifier::{AuthError, IdentityVerifier};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct RecordingMembershipStore {
    memberships: HashMap<String, Vec<PlantId>>,
    calls: AtomicUsize,
}

impl RecordingMembershipStore {
    pub fn new<'a, I>(memberships: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Vec<&'a str>)>,
    {
        let memberships = memberships
            .into_iter()
            .map(|(subject, ids)| {
                (
                    subject.to_string(),
                    ids.into_iter().map(String::from).collect(),
                )
            })
            .collect();

        RecordingMembershipStore {
            memberships,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MembershipStore for RecordingMembershipStore {
    async fn plant_ids(&self, subject: &Subject) -> Result<Vec<PlantId>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .memberships
            .get(subject.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

pub struct FailingMembershipStore(pub StoreError);

#[async_trait]
impl MembershipStore for FailingMembershipStore {
    async fn plant_ids(&self, _subject: &Subject) -> Result<Vec<PlantId>, StoreError> {
        Err(self.0.clone())
    }
}

/// Catalog that records the size of every bulk read. Records come back in
/// reverse request order.
pub struct RecordingCatalogStore {
    plants: HashMap<PlantId, String>,
    batch_sizes: Mutex<Vec<usize>>,
    failing_on: Option<(PlantId, StoreError)>,
}

impl RecordingCatalogStore {
    pub fn new<'a, I>(plants: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        RecordingCatalogStore {
            plants: plants
                .into_iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
            batch_sizes: Mutex::new(Vec::new()),
            failing_on: None,
        }
    }

    /// Fails every bulk read that includes `plant_id`.
    pub fn failing_on(mut self, plant_id: &str, error: StoreError) -> Self {
        self.failing_on = Some((plant_id.to_string(), error));
        self
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogStore for RecordingCatalogStore {
    async fn batch_get(&self, ids: &[PlantId]) -> Result<Vec<PlantRecord>, StoreError> {
        self.batch_sizes.lock().unwrap().push(ids.len());

        if let Some((plant_id, error)) = &self.failing_on {
            if ids.contains(plant_id) {
                return Err(error.clone());
            }
        }

        Ok(ids
            .iter()
            .rev()
            .filter_map(|id| {
                self.plants
                    .get(id)
                    .map(|name| PlantRecord::new(id.clone(), name.clone()))
            })
            .collect())
    }
}

/// Verifier that accepts a fixed set of tokens.
pub struct StaticVerifier {
    tokens: HashMap<String, Result<Subject, AuthError>>,
    calls: AtomicUsize,
}

impl StaticVerifier {
    pub fn new<'a, I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Result<Subject, AuthError>)>,
    {
        StaticVerifier {
            tokens: tokens
                .into_iter()
                .map(|(token, result)| (token.to_string(), result))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<Subject, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .get(token)
            .cloned()
            .unwrap_or_else(|| Err(AuthError::Malformed("unknown test token".into())))
    }
}
