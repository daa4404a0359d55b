//! The plant list request: verify the caller, look up their memberships, fetch
//! the catalog entries and assemble the response.
//!
//! Each step runs after the previous one succeeded. The first failure ends the
//! request; nothing is retried.

use crate::assembler::assemble;
use crate::catalog::{BatchCatalogFetcher, CatalogLookupError};
use crate::membership::{MembershipLookupError, MembershipResolver};
use crate::metrics_defs::{PLANTS_REQUESTS, PLANTS_RETURNED};
use crate::types::PlantsResponse;
use crate::verifier::{AuthError, IdentityVerifier};
use shared::{counter, histogram};
use std::sync::Arc;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PlantsError {
    #[error("missing or malformed authorization header")]
    MissingAuthorization,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Membership(#[from] MembershipLookupError),

    #[error(transparent)]
    Catalog(#[from] CatalogLookupError),
}

impl PlantsError {
    /// Tag value of the request counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            PlantsError::MissingAuthorization => "missing_authorization",
            PlantsError::Auth(e) if e.is_credential_error() => "unauthorized",
            PlantsError::Auth(_) => "verifier_error",
            PlantsError::Membership(_) => "membership_error",
            PlantsError::Catalog(_) => "catalog_error",
        }
    }
}

/// Extracts the token of a `Bearer` authorization header. The scheme is
/// matched case-insensitively.
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, PlantsError> {
    let (scheme, token) = authorization
        .and_then(|value| value.trim().split_once(char::is_whitespace))
        .ok_or(PlantsError::MissingAuthorization)?;

    let token = token.trim_start();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(PlantsError::MissingAuthorization);
    }

    Ok(token)
}

#[derive(Clone)]
pub struct PlantService {
    verifier: Arc<dyn IdentityVerifier>,
    memberships: MembershipResolver,
    catalog: BatchCatalogFetcher,
}

impl PlantService {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        memberships: MembershipResolver,
        catalog: BatchCatalogFetcher,
    ) -> Self {
        PlantService {
            verifier,
            memberships,
            catalog,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.verifier.is_ready()
    }

    /// Resolves the plants visible to the holder of `authorization`.
    pub async fn list_plants(
        &self,
        authorization: Option<&str>,
    ) -> Result<PlantsResponse, PlantsError> {
        let result = self.resolve(authorization).await;

        let outcome = match &result {
            Ok(response) => {
                histogram!(PLANTS_RETURNED).record(response.plants.len() as f64);
                "ok"
            }
            Err(e) => e.outcome(),
        };
        counter!(PLANTS_REQUESTS, "outcome" => outcome).increment(1);

        result
    }

    async fn resolve(&self, authorization: Option<&str>) -> Result<PlantsResponse, PlantsError> {
        let token = bearer_token(authorization)?;
        let subject = self.verifier.verify(token).await?;

        let plant_ids = self.memberships.resolve(&subject).await?;
        if plant_ids.is_empty() {
            tracing::debug!(subject = %subject, "Subject has no plants");
            return Ok(PlantsResponse { plants: vec![] });
        }

        let fetched = self.catalog.fetch(&plant_ids).await?;
        let plants = assemble(&fetched.ordered_ids, &fetched.names);

        tracing::debug!(subject = %subject, plants = plants.len(), "Resolved plants");
        Ok(PlantsResponse { plants })
    }
}
