//! DynamoDB adapters for the store traits.
//!
//! Tables:
//! - membership table: partition key `user_id`, one row per `plant_id` the user
//!   may see.
//! - catalog table: partition key `plant_id`, with a `plant_name` attribute.
//! - device configuration table: partition key `company`, sort key `sort_key`.

use crate::config::ConfigError;
use crate::store::{CatalogStore, DeviceConfigStore, MembershipStore, StoreError};
use crate::types::{PlantId, PlantRecord, Subject};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::config::timeout::TimeoutConfig;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::types::{AttributeValue, KeysAndAttributes};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::time::Duration;

const USER_ID: &str = "user_id";
const PLANT_ID: &str = "plant_id";
const PLANT_NAME: &str = "plant_name";
const COMPANY: &str = "company";
const SORT_KEY: &str = "sort_key";

/// Number of times unprocessed keys of a bulk read are resubmitted before the
/// read fails.
const MAX_UNPROCESSED_ROUNDS: u32 = 3;
const UNPROCESSED_BACKOFF: Duration = Duration::from_millis(50);

/// Builds a DynamoDB client from the default AWS configuration chain with the
/// given overrides applied. Fails when no region is configured anywhere.
pub async fn build_client(
    region: Option<String>,
    endpoint: Option<String>,
    timeout_ms: Option<u64>,
) -> Result<Client, ConfigError> {
    let sdk_config = aws_config::load_from_env().await;
    let config = client_config(&sdk_config, region, endpoint, timeout_ms)?;

    Ok(Client::from_conf(config))
}

fn client_config(
    sdk_config: &SdkConfig,
    region: Option<String>,
    endpoint: Option<String>,
    timeout_ms: Option<u64>,
) -> Result<aws_sdk_dynamodb::Config, ConfigError> {
    if region.is_none() && sdk_config.region().is_none() {
        return Err(ConfigError::Missing("AWS_REGION"));
    }

    let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

    if let Some(region) = region {
        builder = builder.region(Region::new(region));
    }
    if let Some(endpoint) = endpoint {
        builder = builder.endpoint_url(endpoint);
    }
    if let Some(timeout_ms) = timeout_ms {
        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_millis(timeout_ms))
            .build();
        builder = builder.timeout_config(timeout_config);
    }

    Ok(builder.build())
}

fn store_error<E, R>(operation: &'static str, error: SdkError<E, R>) -> StoreError
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

#[derive(Clone)]
pub struct DynamoMembershipStore {
    client: Client,
    table: String,
}

impl DynamoMembershipStore {
    pub fn new(client: Client, table: String) -> Self {
        DynamoMembershipStore { client, table }
    }
}

#[async_trait]
impl MembershipStore for DynamoMembershipStore {
    async fn plant_ids(&self, subject: &Subject) -> Result<Vec<PlantId>, StoreError> {
        let mut plant_ids = Vec::new();
        let mut start_key = None;

        // Pages are followed until exhausted, the result is one logical query.
        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table)
                .key_condition_expression(format!("{USER_ID} = :u"))
                .expression_attribute_values(":u", AttributeValue::S(subject.to_string()))
                .projection_expression(PLANT_ID);

            if let Some(key) = start_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }

            let response = request.send().await.map_err(|e| store_error("query", e))?;

            for item in response.items() {
                if let Some(plant_id) = membership_plant_id(item)? {
                    plant_ids.push(plant_id);
                }
            }

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        tracing::trace!(
            table = %self.table,
            subject = %subject,
            plants = plant_ids.len(),
            "Queried memberships"
        );
        Ok(plant_ids)
    }
}

#[derive(Clone)]
pub struct DynamoCatalogStore {
    client: Client,
    table: String,
}

impl DynamoCatalogStore {
    pub fn new(client: Client, table: String) -> Self {
        DynamoCatalogStore { client, table }
    }
}

/// Rows without a plant id are skipped; a plant id that is not a string is a
/// schema violation.
fn membership_plant_id(
    item: &HashMap<String, AttributeValue>,
) -> Result<Option<PlantId>, StoreError> {
    match item.get(PLANT_ID) {
        None => Ok(None),
        Some(AttributeValue::S(plant_id)) => Ok(Some(plant_id.clone())),
        Some(other) => Err(StoreError::MalformedResponse(format!(
            "membership {PLANT_ID} is not a string: {other:?}"
        ))),
    }
}

fn record_from_item(item: &HashMap<String, AttributeValue>) -> Result<PlantRecord, StoreError> {
    let plant_id = item
        .get(PLANT_ID)
        .and_then(|value| value.as_s().ok())
        .ok_or_else(|| StoreError::MalformedResponse(format!("catalog row without {PLANT_ID}")))?;

    let plant_name = item
        .get(PLANT_NAME)
        .and_then(|value| value.as_s().ok())
        .cloned()
        .unwrap_or_default();

    Ok(PlantRecord::new(plant_id.clone(), plant_name))
}

#[async_trait]
impl CatalogStore for DynamoCatalogStore {
    async fn batch_get(&self, ids: &[PlantId]) -> Result<Vec<PlantRecord>, StoreError> {
        let keys = ids
            .iter()
            .map(|id| HashMap::from([(PLANT_ID.to_string(), AttributeValue::S(id.clone()))]))
            .collect();

        let mut pending = KeysAndAttributes::builder()
            .set_keys(Some(keys))
            .projection_expression(format!("{PLANT_ID}, {PLANT_NAME}"))
            .build()
            .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;

        let mut records = Vec::with_capacity(ids.len());

        for round in 0..=MAX_UNPROCESSED_ROUNDS {
            if round > 0 {
                tokio::time::sleep(UNPROCESSED_BACKOFF * 2u32.pow(round - 1)).await;
            }

            let response = self
                .client
                .batch_get_item()
                .request_items(&self.table, pending)
                .send()
                .await
                .map_err(|e| store_error("batch_get_item", e))?;

            if let Some(items) = response.responses().and_then(|r| r.get(&self.table)) {
                for item in items {
                    records.push(record_from_item(item)?);
                }
            }

            match response.unprocessed_keys().and_then(|u| u.get(&self.table)) {
                Some(unprocessed) if !unprocessed.keys().is_empty() => {
                    tracing::debug!(
                        table = %self.table,
                        round,
                        unprocessed = unprocessed.keys().len(),
                        "Resubmitting unprocessed catalog keys"
                    );
                    pending = unprocessed.clone();
                }
                _ => return Ok(records),
            }
        }

        Err(StoreError::Unavailable(format!(
            "batch_get_item: keys still unprocessed after {MAX_UNPROCESSED_ROUNDS} retries"
        )))
    }
}

#[derive(Clone)]
pub struct DynamoDeviceConfigStore {
    client: Client,
    table: String,
}

impl DynamoDeviceConfigStore {
    pub fn new(client: Client, table: String) -> Self {
        DynamoDeviceConfigStore { client, table }
    }
}

#[async_trait]
impl DeviceConfigStore for DynamoDeviceConfigStore {
    async fn get(
        &self,
        company: &str,
        sort_key: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(COMPANY, AttributeValue::S(company.to_string()))
            .key(SORT_KEY, AttributeValue::S(sort_key.to_string()))
            .send()
            .await
            .map_err(|e| store_error("get_item", e))?;

        Ok(response.item().map(item_to_json))
    }
}

/// Converts a DynamoDB item into a JSON object.
pub fn item_to_json(item: &HashMap<String, AttributeValue>) -> Map<String, Value> {
    item.iter()
        .filter_map(|(key, value)| Some((key.clone(), attribute_to_json(value)?)))
        .collect()
}

fn number_to_json(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(u) = n.parse::<u64>() {
        return Value::Number(u.into());
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(n.to_string()))
}

fn attribute_to_json(value: &AttributeValue) -> Option<Value> {
    let json = match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number_to_json(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::M(map) => Value::Object(item_to_json(map)),
        AttributeValue::L(list) => Value::Array(list.iter().filter_map(attribute_to_json).collect()),
        AttributeValue::Ss(set) => Value::Array(set.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(set) => Value::Array(set.iter().map(|n| number_to_json(n)).collect()),
        AttributeValue::B(blob) => Value::String(STANDARD.encode(blob.as_ref())),
        AttributeValue::Bs(set) => Value::Array(
            set.iter()
                .map(|blob| Value::String(STANDARD.encode(blob.as_ref())))
                .collect(),
        ),
        _ => return None,
    };
    Some(json)
}
