//! Turns uploaded gauge images into readings.
//!
//! For every uploaded JPEG the processor reads the device attributes from the
//! CSV sidecar, asks the recognizer for the value shown, then writes a JSON
//! result next to the image and a reading to the results table. Images that
//! already have a result are skipped, so a redelivered event does no work.
//! A failure is written next to the image as an error document and does not
//! stop the remaining records of the event.

use crate::attributes::DeviceAttributes;
use crate::event::{ObjectRef, S3Event};
use crate::keys;
use crate::metrics_defs::{IMAGES, RECOGNIZE_DURATION};
use crate::recognizer::{READING_PROMPT, RecognizeError, Recognizer};
use crate::retry::{Backoff, retry};
use crate::store::{ObjectStore, Reading, ReadingStore, StoreError};
use serde::Serialize;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

/// Stored as the value when the recognizer returned no text.
pub const EMPTY_VALUE: &str = "ERROR: empty";
const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF";
const PROCESSED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProcessError {
    #[error("image missing: s3://{bucket}/{key}")]
    ImageMissing { bucket: String, key: String },

    #[error("not a JPEG image: s3://{bucket}/{key}")]
    NotJpeg { bucket: String, key: String },

    #[error(transparent)]
    Recognize(#[from] RecognizeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not encode document: {0}")]
    Encode(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Recognized,
    AlreadyRecognized,
    /// Not an S3 record or not an image.
    Ignored,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Recognized => "recognized",
            Outcome::AlreadyRecognized => "already_recognized",
            Outcome::Ignored => "ignored",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub recognized: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Serialize)]
struct ResultDocument<'a> {
    company: &'a str,
    mac_addr: &'a str,
    timestamp: Option<&'a str>,
    image_key: &'a str,
    result_value: &'a str,
    model: &'a str,
    processed_at: String,
}

#[derive(Serialize)]
struct ErrorDocument<'a> {
    error: String,
    image_key: &'a str,
}

pub struct ImageProcessor {
    objects: Arc<dyn ObjectStore>,
    readings: Arc<dyn ReadingStore>,
    recognizer: Arc<dyn Recognizer>,
    backoff: Backoff,
    result_suffix: String,
}

impl ImageProcessor {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        readings: Arc<dyn ReadingStore>,
        recognizer: Arc<dyn Recognizer>,
        backoff: Backoff,
        result_suffix: String,
    ) -> Self {
        ImageProcessor {
            objects,
            readings,
            recognizer,
            backoff,
            result_suffix,
        }
    }

    /// Processes the records of `event` one after the other.
    pub async fn handle(&self, event: &S3Event) -> Summary {
        let mut summary = Summary::default();

        for record in &event.records {
            let result = match record.object() {
                Some(object) => self.process(&object).await,
                None => {
                    counter!(IMAGES, "outcome" => Outcome::Ignored.as_str()).increment(1);
                    Ok(Outcome::Ignored)
                }
            };

            match result {
                Ok(Outcome::Recognized) => summary.recognized += 1,
                Ok(Outcome::AlreadyRecognized | Outcome::Ignored) => summary.skipped += 1,
                Err(_) => summary.failed += 1,
            }
        }

        tracing::info!(
            recognized = summary.recognized,
            skipped = summary.skipped,
            failed = summary.failed,
            "Handled upload event"
        );
        summary
    }

    /// Processes one uploaded object. Failures are also written next to the
    /// image as an error document.
    pub async fn process(&self, object: &ObjectRef) -> Result<Outcome, ProcessError> {
        let result = self.recognize(object).await;
        match &result {
            Ok(outcome) => {
                counter!(IMAGES, "outcome" => outcome.as_str()).increment(1);
            }
            Err(e) => {
                tracing::error!(
                    bucket = %object.bucket,
                    key = %object.key,
                    error = %e,
                    "Could not recognize image"
                );
                counter!(IMAGES, "outcome" => "error").increment(1);
                self.write_error(object, e).await;
            }
        }
        result
    }

    async fn recognize(&self, object: &ObjectRef) -> Result<Outcome, ProcessError> {
        if !keys::is_image(&object.key) {
            return Ok(Outcome::Ignored);
        }

        let bucket = object.bucket.as_str();
        let result_key = keys::result_key(&object.key, &self.result_suffix);
        if self.objects.exists(bucket, &result_key).await {
            tracing::debug!(bucket, key = %object.key, "Image already recognized");
            return Ok(Outcome::AlreadyRecognized);
        }

        let image = self
            .objects
            .get(bucket, &object.key)
            .await?
            .filter(|image| !image.is_empty())
            .ok_or_else(|| ProcessError::ImageMissing {
                bucket: bucket.into(),
                key: object.key.clone(),
            })?;
        if !image.starts_with(JPEG_MAGIC) {
            return Err(ProcessError::NotJpeg {
                bucket: bucket.into(),
                key: object.key.clone(),
            });
        }

        let attributes = self.attributes(object).await;

        let start = Instant::now();
        let value =
            retry(&self.backoff, || self.recognizer.recognize(&image, READING_PROMPT)).await?;
        histogram!(RECOGNIZE_DURATION).record(start.elapsed().as_secs_f64());

        let value = match value.trim() {
            "" => EMPTY_VALUE,
            value => value,
        };
        let model = self.recognizer.model();

        let document = ResultDocument {
            company: &attributes.company,
            mac_addr: &attributes.mac_addr,
            timestamp: attributes.timestamp.as_deref(),
            image_key: &object.key,
            result_value: value,
            model,
            processed_at: chrono::Utc::now().format(PROCESSED_AT_FORMAT).to_string(),
        };
        let body =
            serde_json::to_vec(&document).map_err(|e| ProcessError::Encode(e.to_string()))?;
        self.objects.put_json(bucket, &result_key, body).await?;

        let reading = Reading {
            company: attributes.company.clone(),
            sort_key: keys::reading_sort_key(
                attributes.timestamp.as_deref(),
                &attributes.mac_addr,
                &object.key,
            ),
            image_key: object.key.clone(),
            value: value.into(),
            model: model.into(),
            mac_addr: attributes.mac_addr.clone(),
            timestamp: attributes.timestamp.clone().unwrap_or_default(),
        };
        self.readings.put(&reading).await?;

        tracing::info!(
            key = %object.key,
            company = %reading.company,
            value = %reading.value,
            "Recognized image"
        );
        Ok(Outcome::Recognized)
    }

    /// Attributes from the CSV sidecar. A missing or unreadable sidecar leaves
    /// every attribute unknown.
    async fn attributes(&self, object: &ObjectRef) -> DeviceAttributes {
        let csv_key = keys::csv_key(&object.key);
        match self.objects.get(&object.bucket, &csv_key).await {
            Ok(Some(data)) => DeviceAttributes::from_csv(&data),
            Ok(None) => DeviceAttributes::default(),
            Err(e) => {
                tracing::warn!(key = %csv_key, error = %e, "Could not read device attributes");
                DeviceAttributes::default()
            }
        }
    }

    async fn write_error(&self, object: &ObjectRef, error: &ProcessError) {
        let document = ErrorDocument {
            error: error.to_string(),
            image_key: &object.key,
        };
        let Ok(body) = serde_json::to_vec(&document) else {
            return;
        };

        let error_key = keys::error_key(&object.key);
        if let Err(e) = self.objects.put_json(&object.bucket, &error_key, body).await {
            tracing::warn!(key = %error_key, error = %e, "Could not write error document");
        }
    }
}
