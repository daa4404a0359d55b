use crate::aws::store_error;
use crate::store::{ObjectStore, StoreError};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Builds an S3 client. Path-style addressing is needed by most S3
/// compatible endpoints used in development.
pub fn build_client(sdk_config: &SdkConfig, force_path_style: bool) -> Client {
    let config = aws_sdk_s3::config::Builder::from(sdk_config)
        .force_path_style(force_path_style)
        .build();
    Client::from_conf(config)
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        S3ObjectStore { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn exists(&self, bucket: &str, key: &str) -> bool {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => true,
            Err(e) => {
                if !e.as_service_error().is_some_and(|e| e.is_not_found()) {
                    let error = store_error("head_object", e);
                    tracing::debug!(bucket, key, error = %error, "Could not check object");
                }
                false
            }
        }
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Ok(None);
            }
            Err(e) => return Err(store_error("get_object", e)),
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Unavailable(format!("get_object: {e}")))?;

        Ok(Some(data.into_bytes().to_vec()))
    }

    async fn put_json(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(JSON_CONTENT_TYPE)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| store_error("put_object", e))?;

        Ok(())
    }
}
