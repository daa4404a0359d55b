pub mod attributes;
pub mod aws;
pub mod config;
pub mod dynamo;
pub mod event;
pub mod keys;
pub mod metrics_defs;
pub mod processor;
pub mod recognizer;
pub mod retry;
pub mod s3;
pub mod store;

#[cfg(test)]
mod testutils;

use crate::config::{Config, ConfigError};
use crate::dynamo::DynamoReadingStore;
use crate::event::S3Event;
use crate::processor::{ImageProcessor, Summary};
use crate::recognizer::{GeminiRecognizer, RecognizeError};
use crate::s3::S3ObjectStore;
use std::sync::Arc;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum RecognitionRunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("could not build the recognizer: {0}")]
    Recognizer(#[from] RecognizeError),
}

pub async fn build_processor(config: &Config) -> Result<ImageProcessor, RecognitionRunError> {
    config.validate()?;

    let sdk_config = aws::load_sdk_config(config.region.clone(), config.endpoint.clone()).await?;
    let objects = S3ObjectStore::new(s3::build_client(&sdk_config, config.endpoint.is_some()));
    let readings = DynamoReadingStore::new(
        dynamo::build_client(&sdk_config),
        config.results_table.clone(),
    );

    let recognizer = GeminiRecognizer::new(
        &config.recognizer.api_base()?,
        &config.recognizer.model,
        &config.recognizer.api_key,
        Duration::from_secs(config.recognizer.timeout_secs),
    )?;
    tracing::info!(
        model = %config.recognizer.model,
        results_table = %config.results_table,
        "Recognizing uploaded images"
    );

    Ok(ImageProcessor::new(
        Arc::new(objects),
        Arc::new(readings),
        Arc::new(recognizer),
        config.retry.backoff(),
        config.result_suffix.clone(),
    ))
}

/// Processes the uploads announced by `event`.
pub async fn run(config: Config, event: S3Event) -> Result<Summary, RecognitionRunError> {
    shared::metrics_defs::describe_all(metrics_defs::ALL_METRICS);

    let processor = build_processor(&config).await?;
    Ok(processor.handle(&event).await)
}
