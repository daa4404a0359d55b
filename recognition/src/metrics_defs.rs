//! Metrics definitions for the recognition pipeline.

use shared::metrics_defs::{MetricDef, MetricType};

pub const IMAGES: MetricDef = MetricDef {
    name: "recognition.images",
    metric_type: MetricType::Counter,
    description: "Number of uploaded images handled, tagged by outcome",
};

pub const RECOGNIZE_DURATION: MetricDef = MetricDef {
    name: "recognition.recognize.duration",
    metric_type: MetricType::Histogram,
    description: "Time to read a value from an image in seconds, retries included",
};

pub const RECOGNIZE_RETRIES: MetricDef = MetricDef {
    name: "recognition.recognize.retries",
    metric_type: MetricType::Counter,
    description: "Number of recognition calls retried after a transient failure",
};

// All metrics must be listed here so their descriptions are registered at startup.
pub const ALL_METRICS: &[MetricDef] = &[IMAGES, RECOGNIZE_DURATION, RECOGNIZE_RETRIES];
