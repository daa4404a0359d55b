use crate::config::ConfigError;
use crate::store::StoreError;
use aws_config::SdkConfig;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};

/// Loads the default AWS configuration chain with the given overrides applied.
/// Fails when no region is configured anywhere.
pub async fn load_sdk_config(
    region: Option<String>,
    endpoint: Option<String>,
) -> Result<SdkConfig, ConfigError> {
    let mut loader = aws_config::from_env();
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }
    if let Some(endpoint) = endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;
    require_region(&sdk_config)?;
    Ok(sdk_config)
}

fn require_region(sdk_config: &SdkConfig) -> Result<(), ConfigError> {
    match sdk_config.region() {
        Some(_) => Ok(()),
        None => Err(ConfigError::Missing("AWS_REGION")),
    }
}

pub(crate) fn store_error<E, R>(operation: &'static str, error: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = format!("{operation}: {}", DisplayErrorContext(&error));
    match error {
        SdkError::TimeoutError(_) => StoreError::Timeout(message),
        SdkError::ConstructionFailure(_) => StoreError::InvalidRequest(message),
        _ => StoreError::Unavailable(message),
    }
}
