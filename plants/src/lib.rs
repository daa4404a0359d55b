pub mod api;
pub mod assembler;
pub mod catalog;
pub mod config;
pub mod device_config;
pub mod dynamo;
pub mod membership;
pub mod memory;
pub mod metrics_defs;
pub mod negative_cache;
pub mod service;
pub mod store;
pub mod types;
pub mod verifier;

#[cfg(test)]
mod testutils;

use crate::api::PlantsApiError;
use crate::catalog::BatchCatalogFetcher;
use crate::config::{Config, ConfigError, StoreBackend};
use crate::device_config::DeviceConfigService;
use crate::dynamo::{DynamoCatalogStore, DynamoDeviceConfigStore, DynamoMembershipStore};
use crate::membership::MembershipResolver;
use crate::memory::{MemoryCatalogStore, MemoryDeviceConfigStore, MemoryMembershipStore};
use crate::service::PlantService;
use crate::store::{CatalogStore, DeviceConfigStore, MembershipStore};
use crate::verifier::{AuthError, CognitoVerifier};
use std::sync::Arc;
use std::time::Duration;

const SIGNING_KEY_RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(thiserror::Error, Debug)]
pub enum PlantsRunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("could not build the token verifier: {0}")]
    Verifier(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] PlantsApiError),
}

struct Stores {
    memberships: Arc<dyn MembershipStore>,
    catalog: Arc<dyn CatalogStore>,
    device_configs: Option<Arc<dyn DeviceConfigStore>>,
}

async fn build_stores(backend: &StoreBackend) -> Result<Stores, ConfigError> {
    match backend {
        StoreBackend::Dynamodb {
            region,
            endpoint,
            timeout_ms,
            user_plant_table,
            plants_table,
            device_config_table,
        } => {
            let client =
                dynamo::build_client(region.clone(), endpoint.clone(), *timeout_ms).await?;
            tracing::info!(
                user_plant_table = %user_plant_table,
                plants_table = %plants_table,
                device_config_table = ?device_config_table,
                "Using DynamoDB stores"
            );

            Ok(Stores {
                memberships: Arc::new(DynamoMembershipStore::new(
                    client.clone(),
                    user_plant_table.clone(),
                )),
                catalog: Arc::new(DynamoCatalogStore::new(client.clone(), plants_table.clone())),
                device_configs: device_config_table.clone().map(|table| {
                    let store: Arc<dyn DeviceConfigStore> =
                        Arc::new(DynamoDeviceConfigStore::new(client, table));
                    store
                }),
            })
        }
        StoreBackend::Memory {
            memberships,
            plants,
            device_configs,
        } => {
            tracing::warn!("Using in-memory stores");

            Ok(Stores {
                memberships: Arc::new(MemoryMembershipStore::new(memberships.clone())),
                catalog: Arc::new(MemoryCatalogStore::new(plants.clone())),
                device_configs: device_configs.clone().map(|documents| {
                    let store: Arc<dyn DeviceConfigStore> =
                        Arc::new(MemoryDeviceConfigStore::new(documents));
                    store
                }),
            })
        }
    }
}

/// Loads the signing keys in the background until the first download succeeds.
/// Requests arriving earlier trigger their own download.
async fn load_signing_keys(verifier: Arc<CognitoVerifier>) {
    loop {
        match verifier.load_keys().await {
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load signing keys, retrying");
                tokio::time::sleep(SIGNING_KEY_RETRY_INTERVAL).await;
            }
        }
    }
}

pub async fn run(config: Config) -> Result<(), PlantsRunError> {
    config.validate()?;
    shared::metrics_defs::describe_all(metrics_defs::ALL_METRICS);

    let stores = build_stores(&config.stores).await?;

    let identity = &config.identity;
    let verifier = Arc::new(CognitoVerifier::new(
        &identity.issuer(),
        &identity.client_id,
        identity.jwks_url()?,
        Duration::from_secs(identity.jwks_timeout_secs),
    )?);
    tokio::spawn(load_signing_keys(verifier.clone()));

    let plants = PlantService::new(
        verifier,
        MembershipResolver::new(stores.memberships),
        BatchCatalogFetcher::new(stores.catalog, config.catalog.max_in_flight_batches),
    );
    let device_config = stores.device_configs.map(DeviceConfigService::new);

    let app = api::router(plants.clone(), device_config);
    let public = api::serve(config.listener.clone(), app);

    match config.admin_listener.clone() {
        Some(admin_listener) => {
            let admin_app = shared::admin::router(move || plants.is_ready());
            tokio::try_join!(public, api::serve(admin_listener, admin_app))?;
        }
        None => public.await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PlantRecord, Subject};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_build_memory_stores() {
        let stores = build_stores(&StoreBackend::Memory {
            memberships: HashMap::from([("user-1".to_string(), vec!["p1".to_string()])]),
            plants: HashMap::from([("p1".to_string(), "Alpha".to_string())]),
            device_configs: None,
        })
        .await
        .unwrap();

        assert_eq!(
            stores.memberships.plant_ids(&Subject::new("user-1")).await,
            Ok(vec!["p1".to_string()])
        );
        assert_eq!(
            stores.catalog.batch_get(&["p1".to_string()]).await,
            Ok(vec![PlantRecord::new("p1", "Alpha")])
        );
        assert!(stores.device_configs.is_none());
    }
}
