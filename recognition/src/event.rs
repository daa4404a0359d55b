//! S3 event notifications announcing uploaded objects.

use serde::Deserialize;

const S3_EVENT_SOURCE: &str = "aws:s3";

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct EventRecord {
    #[serde(rename = "eventSource", default)]
    pub event_source: Option<String>,
    #[serde(default)]
    pub s3: Option<S3Entity>,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct S3Object {
    pub key: String,
}

/// An object in a bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl EventRecord {
    /// The uploaded object, if the record comes from S3.
    pub fn object(&self) -> Option<ObjectRef> {
        if self.event_source.as_deref() != Some(S3_EVENT_SOURCE) {
            return None;
        }

        self.s3.as_ref().map(|s3| ObjectRef {
            bucket: s3.bucket.name.clone(),
            key: s3.object.key.clone(),
        })
    }
}
