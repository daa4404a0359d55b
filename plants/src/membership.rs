use crate::metrics_defs::MEMBERSHIP_LOOKUP_DURATION;
use crate::store::{MembershipStore, StoreError};
use crate::types::{PlantId, Subject};
use shared::histogram;
use std::sync::Arc;
use std::time::Instant;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("membership lookup failed: {0}")]
pub struct MembershipLookupError(#[from] pub StoreError);

/// Resolves the plant ids a subject is a member of.
#[derive(Clone)]
pub struct MembershipResolver {
    store: Arc<dyn MembershipStore>,
}

impl MembershipResolver {
    pub fn new(store: Arc<dyn MembershipStore>) -> Self {
        MembershipResolver { store }
    }

    /// Returns the subject's plant ids in the order the store returned them.
    /// Duplicates are kept; deduplication happens when the catalog is fetched.
    pub async fn resolve(
        &self,
        subject: &Subject,
    ) -> Result<Vec<PlantId>, MembershipLookupError> {
        let started = Instant::now();
        let result = self.store.plant_ids(subject).await;
        histogram!(MEMBERSHIP_LOOKUP_DURATION).record(started.elapsed().as_secs_f64());

        let plant_ids: Vec<PlantId> = result?
            .into_iter()
            .filter(|id| !id.is_empty())
            .collect();

        tracing::debug!(subject = %subject, plants = plant_ids.len(), "Resolved memberships");
        Ok(plant_ids)
    }
}
