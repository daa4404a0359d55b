//! Device attributes uploaded next to an image as a two-line CSV file: a
//! header row and one row of values.

use std::collections::HashMap;

pub const UNKNOWN: &str = "UNKNOWN";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceAttributes {
    pub company: String,
    pub mac_addr: String,
    /// Capture time as written by the device.
    pub timestamp: Option<String>,
}

impl Default for DeviceAttributes {
    fn default() -> Self {
        DeviceAttributes {
            company: UNKNOWN.into(),
            mac_addr: UNKNOWN.into(),
            timestamp: None,
        }
    }
}

impl DeviceAttributes {
    pub fn from_csv(data: &[u8]) -> Self {
        let mut fields = parse_fields(data);

        DeviceAttributes {
            company: fields.remove("company").unwrap_or_else(|| UNKNOWN.into()),
            mac_addr: fields.remove("mac_addr").unwrap_or_else(|| UNKNOWN.into()),
            timestamp: fields.remove("timestamp"),
        }
    }
}

/// Pairs the header row with the first row of values. Blank lines are
/// ignored, fields are trimmed and invalid UTF-8 is replaced. Anything short
/// of two rows yields no fields.
pub fn parse_fields(data: &[u8]) -> HashMap<String, String> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut rows = reader.byte_records().filter_map(Result::ok);
    let (Some(header), Some(values)) = (rows.next(), rows.next()) else {
        return HashMap::new();
    };

    header
        .iter()
        .zip(values.iter())
        .map(|(name, value)| {
            (
                String::from_utf8_lossy(name).into_owned(),
                String::from_utf8_lossy(value).into_owned(),
            )
        })
        .collect()
}
