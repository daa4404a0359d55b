use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

const DEFAULT_MAX_IN_FLIGHT_BATCHES: usize = 4;
const DEFAULT_JWKS_TIMEOUT_SECS: u64 = 5;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("port cannot be 0")]
    InvalidPort,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

fn default_admin_listener() -> Option<Listener> {
    Some(Listener {
        host: "127.0.0.1".into(),
        port: 3001,
    })
}

/// Cognito user pool that issues the ID tokens accepted by the service.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct IdentityConfig {
    pub region: String,
    pub user_pool_id: String,
    /// App client id, checked against the token's `aud` claim.
    pub client_id: String,
    /// Overrides the key set location derived from the issuer.
    #[serde(default)]
    pub jwks_url: Option<Url>,
    #[serde(default = "default_jwks_timeout_secs")]
    pub jwks_timeout_secs: u64,
}

fn default_jwks_timeout_secs() -> u64 {
    DEFAULT_JWKS_TIMEOUT_SECS
}

impl IdentityConfig {
    pub fn issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }

    pub fn jwks_url(&self) -> Result<Url, ConfigError> {
        if let Some(url) = &self.jwks_url {
            return Ok(url.clone());
        }

        Url::parse(&format!("{}/.well-known/jwks.json", self.issuer())).map_err(|e| {
            ConfigError::Invalid {
                name: "identity.jwks_url",
                reason: e.to_string(),
            }
        })
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreBackend {
    Dynamodb {
        /// Overrides the region of the default AWS configuration.
        #[serde(default)]
        region: Option<String>,
        /// Endpoint override, e.g. DynamoDB Local.
        #[serde(default)]
        endpoint: Option<String>,
        /// Per-operation timeout in milliseconds.
        #[serde(default)]
        timeout_ms: Option<u64>,
        user_plant_table: String,
        plants_table: String,
        #[serde(default)]
        device_config_table: Option<String>,
    },
    /// Seeded in-memory stores for local development.
    Memory {
        #[serde(default)]
        memberships: HashMap<String, Vec<String>>,
        #[serde(default)]
        plants: HashMap<String, String>,
        /// Device configuration documents keyed by `<company>/<sort_key>`.
        #[serde(default)]
        device_configs: Option<HashMap<String, serde_json::Map<String, serde_json::Value>>>,
    },
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct CatalogConfig {
    /// Number of catalog bulk reads a single request may have in flight.
    pub max_in_flight_batches: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            max_in_flight_batches: DEFAULT_MAX_IN_FLIGHT_BATCHES,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Option<Listener>,
    pub identity: IdentityConfig,
    pub stores: StoreBackend,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl Config {
    /// Builds the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let mut listener = Listener::default();
        if let Some(host) = get("PLANTS_HOST") {
            listener.host = host;
        }
        if let Some(port) = get("PLANTS_PORT") {
            listener.port = parse_var("PLANTS_PORT", &port)?;
        }

        let jwks_url = get("COGNITO_JWKS_URL")
            .map(|url| {
                Url::parse(&url).map_err(|e| ConfigError::Invalid {
                    name: "COGNITO_JWKS_URL",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let identity = IdentityConfig {
            region: require("COGNITO_REGION")?,
            user_pool_id: require("COGNITO_USER_POOL_ID")?,
            client_id: require("COGNITO_CLIENT_ID")?,
            jwks_url,
            jwks_timeout_secs: DEFAULT_JWKS_TIMEOUT_SECS,
        };

        let timeout_ms = get("DDB_TIMEOUT_MS")
            .map(|value| parse_var("DDB_TIMEOUT_MS", &value))
            .transpose()?;

        let stores = StoreBackend::Dynamodb {
            region: get("AWS_REGION"),
            endpoint: get("DDB_ENDPOINT_URL"),
            timeout_ms,
            user_plant_table: require("DDB_USER_PLANT_TABLE")?,
            plants_table: require("DDB_PLANTS_TABLE")?,
            device_config_table: get("DDB_CONFIG_TABLE").or_else(|| get("CONFIG_TABLE")),
        };

        let config = Config {
            listener,
            admin_listener: default_admin_listener(),
            identity,
            stores,
            catalog: CatalogConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listener.validate()?;
        if let Some(admin_listener) = &self.admin_listener {
            admin_listener.validate()?;
        }

        require_non_empty("identity.region", &self.identity.region)?;
        require_non_empty("identity.user_pool_id", &self.identity.user_pool_id)?;
        require_non_empty("identity.client_id", &self.identity.client_id)?;
        self.identity.jwks_url()?;

        if let StoreBackend::Dynamodb {
            user_plant_table,
            plants_table,
            ..
        } = &self.stores
        {
            require_non_empty("stores.user_plant_table", user_plant_table)?;
            require_non_empty("stores.plants_table", plants_table)?;
        }

        if self.catalog.max_in_flight_batches == 0 {
            return Err(ConfigError::Invalid {
                name: "catalog.max_in_flight_batches",
                reason: "must be at least 1".into(),
            });
        }

        Ok(())
    }
}

fn require_non_empty(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(name));
    }
    Ok(())
}

fn parse_var<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}
