//! Object keys derived from an uploaded image's key.
//!
//! Every image `<base>.jpg` may come with a `<base>.csv` attribute sidecar. The
//! pipeline writes its result to `<base><result suffix>` and failures to
//! `<base>.error.json`.

pub const DEFAULT_RESULT_SUFFIX: &str = ".result.json";
const ERROR_SUFFIX: &str = ".error.json";
const CSV_SUFFIX: &str = ".csv";

/// Whether `key` names a JPEG image. The extension is matched case-insensitively.
pub fn is_image(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.ends_with(".jpg") || key.ends_with(".jpeg")
}

/// `key` without its last extension.
pub fn base(key: &str) -> &str {
    key.rsplit_once('.').map_or(key, |(base, _)| base)
}

pub fn csv_key(image_key: &str) -> String {
    format!("{}{CSV_SUFFIX}", base(image_key))
}

pub fn result_key(image_key: &str, suffix: &str) -> String {
    format!("{}{suffix}", base(image_key))
}

pub fn error_key(image_key: &str) -> String {
    format!("{}{ERROR_SUFFIX}", base(image_key))
}

/// File name of `key`, the part after the last `/`.
pub fn file_name(key: &str) -> &str {
    key.rsplit_once('/').map_or(key, |(_, name)| name)
}

/// Sort key of a reading in the results table: `<timestamp>#<mac>#<file name>`.
/// Readings of a company therefore sort by capture time.
pub fn reading_sort_key(timestamp: Option<&str>, mac_addr: &str, image_key: &str) -> String {
    format!(
        "{}#{mac_addr}#{}",
        timestamp.unwrap_or_default(),
        file_name(image_key)
    )
}
