use crate::keys::DEFAULT_RESULT_SUFFIX;
use crate::recognizer::{DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::retry::Backoff;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const DEFAULT_RECOGNIZE_TIMEOUT_SECS: u64 = 30;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct RecognizerConfig {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Overrides the public Generative Language API.
    #[serde(default)]
    pub api_base: Option<Url>,
    #[serde(default = "default_recognize_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_recognize_timeout_secs() -> u64 {
    DEFAULT_RECOGNIZE_TIMEOUT_SECS
}

impl RecognizerConfig {
    pub fn api_base(&self) -> Result<Url, ConfigError> {
        if let Some(url) = &self.api_base {
            return Ok(url.clone());
        }

        Url::parse(DEFAULT_API_BASE).map_err(|e| ConfigError::Invalid {
            name: "recognizer.api_base",
            reason: e.to_string(),
        })
    }
}

/// Retries of recognition calls failing with a transient error.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, the first one included.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let backoff = Backoff::default();
        RetryConfig {
            max_attempts: backoff.max_attempts,
            initial_delay_ms: backoff.initial_delay.as_millis() as u64,
            max_delay_ms: backoff.max_delay.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    /// Overrides the region of the default AWS configuration.
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override for S3 and DynamoDB, e.g. LocalStack.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Table the readings are written to.
    pub results_table: String,
    #[serde(default = "default_result_suffix")]
    pub result_suffix: String,
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_result_suffix() -> String {
    DEFAULT_RESULT_SUFFIX.into()
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

        let api_base = get("GEMINI_API_BASE")
            .map(|url| {
                Url::parse(&url).map_err(|e| ConfigError::Invalid {
                    name: "GEMINI_API_BASE",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let config = Config {
            region: get("AWS_REGION"),
            endpoint: None,
            results_table: require("RESULTS_TABLE")?,
            result_suffix: get("S3_RESULT_SUFFIX").unwrap_or_else(default_result_suffix),
            recognizer: RecognizerConfig {
                api_key: require("GEMINI_API_KEY")?,
                model: get("MODEL_NAME").unwrap_or_else(default_model),
                api_base,
                timeout_secs: DEFAULT_RECOGNIZE_TIMEOUT_SECS,
            },
            retry: RetryConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("results_table", &self.results_table)?;
        require_non_empty("recognizer.api_key", &self.recognizer.api_key)?;
        require_non_empty("recognizer.model", &self.recognizer.model)?;
        self.recognizer.api_base()?;

        // Results must never look like uploads, or they would be processed in turn.
        if self.result_suffix.trim().is_empty() || crate::keys::is_image(&self.result_suffix) {
            return Err(ConfigError::Invalid {
                name: "result_suffix",
                reason: format!("{:?} cannot name a result object", self.result_suffix),
            });
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "retry.max_attempts",
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
