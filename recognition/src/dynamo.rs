//! Results table: partition key `company`, sort key `sort_key`.

use crate::aws::store_error;
use crate::store::{Reading, ReadingStore, StoreError};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;

pub fn build_client(sdk_config: &SdkConfig) -> Client {
    Client::new(sdk_config)
}

#[derive(Clone)]
pub struct DynamoReadingStore {
    client: Client,
    table: String,
}

impl DynamoReadingStore {
    pub fn new(client: Client, table: String) -> Self {
        DynamoReadingStore { client, table }
    }
}

#[async_trait]
impl ReadingStore for DynamoReadingStore {
    async fn put(&self, reading: &Reading) -> Result<(), StoreError> {
        let attribute = |value: &str| AttributeValue::S(value.to_string());

        self.client
            .put_item()
            .table_name(&self.table)
            .item("company", attribute(&reading.company))
            .item("sort_key", attribute(&reading.sort_key))
            .item("image_key", attribute(&reading.image_key))
            .item("value", attribute(&reading.value))
            .item("model", attribute(&reading.model))
            .item("mac_addr", attribute(&reading.mac_addr))
            .item("timestamp", attribute(&reading.timestamp))
            .send()
            .await
            .map_err(|e| store_error("put_item", e))?;

        tracing::debug!(
            company = %reading.company,
            sort_key = %reading.sort_key,
            "Stored reading"
        );
        Ok(())
    }
}
