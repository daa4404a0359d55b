//! Per-device configuration for field units.
//!
//! A device's configuration is its company's `DEFAULT` document with the
//! device's own `MAC#<mac>` document merged on top.

use crate::store::{DeviceConfigStore, StoreError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const DEFAULT_SORT_KEY: &str = "DEFAULT";
pub const DEFAULT_CLIENT_CACHE_TTL_SECS: u64 = 86_400;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DeviceConfigRequest {
    pub company: String,
    pub mac_addr: String,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DeviceConfigError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("`version` must be an object, got {0}")]
    InvalidVersion(Value),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DeviceConfigRequest {
    pub fn from_slice(body: &[u8]) -> Result<Self, DeviceConfigError> {
        serde_json::from_slice(body).map_err(|e| DeviceConfigError::InvalidBody(e.to_string()))
    }
}

/// Sort key of a device's override document. Colons are not allowed in the
/// stored keys and are replaced by dashes.
pub fn mac_sort_key(mac_addr: &str) -> String {
    format!("MAC#{}", mac_addr.replace(':', "-"))
}

/// Merges `overlay` into `base`. Objects present on both sides are merged
/// recursively, any other value in `overlay` replaces the one in `base`.
pub fn deep_merge(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => deep_merge(existing, nested),
            (Some(slot), value) => *slot = value,
            (None, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[derive(Clone)]
pub struct DeviceConfigService {
    store: Arc<dyn DeviceConfigStore>,
}

impl DeviceConfigService {
    pub fn new(store: Arc<dyn DeviceConfigStore>) -> Self {
        DeviceConfigService { store }
    }

    /// Returns the effective configuration of a device. `request_id` is
    /// recorded as `version.server` so devices can report which response they
    /// are running with.
    pub async fn resolve(
        &self,
        request: &DeviceConfigRequest,
        request_id: &str,
    ) -> Result<Map<String, Value>, DeviceConfigError> {
        let mac_key = mac_sort_key(&request.mac_addr);
        let (defaults, overrides) = tokio::try_join!(
            self.store.get(&request.company, DEFAULT_SORT_KEY),
            self.store.get(&request.company, &mac_key),
        )?;

        let mut config = defaults.unwrap_or_default();
        deep_merge(&mut config, overrides.unwrap_or_default());

        let version = config
            .entry("version")
            .or_insert_with(|| Value::Object(Map::new()));
        match version {
            Value::Object(version) => {
                version.insert("server".into(), Value::String(request_id.into()));
            }
            other => return Err(DeviceConfigError::InvalidVersion(other.take())),
        }

        config
            .entry("client_cache_ttl_sec")
            .or_insert_with(|| Value::from(DEFAULT_CLIENT_CACHE_TTL_SECS));

        tracing::debug!(company = %request.company, sort_key = %mac_key, "Resolved device config");
        Ok(config)
    }
}
