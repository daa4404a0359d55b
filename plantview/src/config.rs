use plants::config::{Config as PlantsConfig, ConfigError as PlantsConfigError};
use recognition::config::{Config as RecognitionConfig, ConfigError as RecognitionConfigError};
use serde::Deserialize;
use std::fs::File;

#[derive(Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub sentry_dsn: Option<String>,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct CommonConfig {
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub plants: Option<PlantsConfig>,
    pub recognition: Option<RecognitionConfig>,
}

/// Service whose settings are read from the environment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Section {
    Plants,
    Recognition,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Builds the configuration of `section` from environment variables, used
    /// when no config file is given.
    pub fn from_env(section: Section) -> Result<Self, ConfigError> {
        Self::from_lookup(section, |name| std::env::var(name).ok())
    }

    fn from_lookup<F>(section: Section, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let metrics = match (get("STATSD_HOST"), get("STATSD_PORT")) {
            (Some(statsd_host), Some(port)) => Some(MetricsConfig {
                statsd_host,
                statsd_port: port
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidStatsdPort(port))?,
            }),
            _ => None,
        };

        let logging = LoggingConfig {
            format: LogFormat::default(),
            sentry_dsn: get("SENTRY_DSN"),
        };

        let (plants, recognition) = match section {
            Section::Plants => (Some(PlantsConfig::from_lookup(&lookup)?), None),
            Section::Recognition => (None, Some(RecognitionConfig::from_lookup(&lookup)?)),
        };

        Ok(Config {
            common: CommonConfig { metrics, logging },
            plants,
            recognition,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("{0}")]
    Plants(#[from] PlantsConfigError),
    #[error("{0}")]
    Recognition(#[from] RecognitionConfigError),
    #[error("invalid STATSD_PORT: {0}")]
    InvalidStatsdPort(String),
}
