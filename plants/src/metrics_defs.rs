//! Metrics definitions for the plants service.

use shared::metrics_defs::{MetricDef, MetricType};

pub const PLANTS_REQUESTS: MetricDef = MetricDef {
    name: "plants.requests",
    metric_type: MetricType::Counter,
    description: "Number of plant list requests, tagged by outcome",
};

pub const PLANTS_RETURNED: MetricDef = MetricDef {
    name: "plants.returned",
    metric_type: MetricType::Histogram,
    description: "Number of plants returned per successful request",
};

pub const MEMBERSHIP_LOOKUP_DURATION: MetricDef = MetricDef {
    name: "membership.lookup.duration",
    metric_type: MetricType::Histogram,
    description: "Time to resolve the plant ids of a subject in seconds",
};

pub const CATALOG_FETCH_DURATION: MetricDef = MetricDef {
    name: "catalog.fetch.duration",
    metric_type: MetricType::Histogram,
    description: "Time to fetch all catalog batches of a request in seconds",
};

pub const CATALOG_BATCHES: MetricDef = MetricDef {
    name: "catalog.batches",
    metric_type: MetricType::Counter,
    description: "Number of bulk reads issued against the plant catalog",
};

pub const UNRESOLVED_PLANT_NAMES: MetricDef = MetricDef {
    name: "catalog.unresolved_names",
    metric_type: MetricType::Counter,
    description: "Number of authorized plants returned without a catalog name",
};

pub const JWKS_REFRESH: MetricDef = MetricDef {
    name: "verifier.jwks.refresh",
    metric_type: MetricType::Counter,
    description: "Number of signing key set downloads, tagged by outcome",
};

pub const UNKNOWN_KEY_CACHE_HIT: MetricDef = MetricDef {
    name: "verifier.unknown_key_cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of tokens rejected by the unknown signing key cache",
};

pub const DEVICE_CONFIG_REQUESTS: MetricDef = MetricDef {
    name: "device_config.requests",
    metric_type: MetricType::Counter,
    description: "Number of device configuration requests, tagged by outcome",
};

// All metrics must be listed here so their descriptions are registered at startup.
pub const ALL_METRICS: &[MetricDef] = &[
    PLANTS_REQUESTS,
    PLANTS_RETURNED,
    MEMBERSHIP_LOOKUP_DURATION,
    CATALOG_FETCH_DURATION,
    CATALOG_BATCHES,
    UNRESOLVED_PLANT_NAMES,
    JWKS_REFRESH,
    UNKNOWN_KEY_CACHE_HIT,
    DEVICE_CONFIG_REQUESTS,
];
