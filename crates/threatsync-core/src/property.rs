//! Graph property maps and typed accessors.
//!
//! The graph adapter hands every node or edge over as a flat JSON-like map.
//! Temporal values arrive as ISO-8601 strings (Neo4j `toString()` output or
//! plain strings written by upstream collectors) and are normalized here to a
//! single canonical UTC form.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Timelike, Utc};
use serde_json::Value;

use crate::error::TransformError;

/// Properties of a single node or edge.
pub type PropertyMap = serde_json::Map<String, Value>;

/// Canonical timestamp representation used in the destination store.
pub type Timestamp = DateTime<Utc>;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a temporal string into UTC.
///
/// Accepts RFC 3339 date-times (optionally followed by a Neo4j zone id such
/// as `[Europe/Berlin]`), naive date-times (taken as UTC) and plain dates
/// (midnight UTC). Sub-second precision is dropped.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Neo4j appends the region id for zoned datetimes.
    let without_zone_id = match trimmed.find('[') {
        Some(idx) if trimmed.ends_with(']') => &trimmed[..idx],
        _ => trimmed,
    };

    // Neo4j omits zero seconds (2023-01-01T00:00Z), which RFC 3339 rejects.
    let offset_form = match without_zone_id.strip_suffix('Z') {
        Some(rest) => format!("{}+00:00", rest),
        None => without_zone_id.to_string(),
    };

    let parsed = if let Ok(dt) = DateTime::parse_from_rfc3339(without_zone_id) {
        Some(dt.with_timezone(&Utc))
    } else if let Ok(dt) = DateTime::parse_from_str(&offset_form, "%Y-%m-%dT%H:%M%:z") {
        Some(dt.with_timezone(&Utc))
    } else if let Some(naive) = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(without_zone_id, fmt).ok())
    {
        Some(naive.and_utc())
    } else {
        NaiveDate::parse_from_str(without_zone_id, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    };

    parsed.and_then(|dt| dt.with_nanosecond(0))
}

/// Render a timestamp in canonical form, e.g. `2023-01-01T00:00:00Z`.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn present<'a>(props: &'a PropertyMap, field: &str) -> Option<&'a Value> {
    match props.get(field) {
        None | Some(Value::Null) => None,
        Some(v) => Some(v),
    }
}

/// Optional string property. Blank strings count as absent.
pub fn opt_str(props: &PropertyMap, field: &'static str) -> Result<Option<String>, TransformError> {
    match present(props, field) {
        None => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(TransformError::WrongType { field, expected: "string" }),
    }
}

/// Required, non-blank string property.
pub fn req_str(props: &PropertyMap, field: &'static str) -> Result<String, TransformError> {
    opt_str(props, field)?.ok_or(TransformError::MissingField(field))
}

/// Optional boolean property.
pub fn opt_bool(props: &PropertyMap, field: &'static str) -> Result<Option<bool>, TransformError> {
    match present(props, field) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(TransformError::WrongType { field, expected: "boolean" }),
    }
}

/// Optional integer property. Integral floats are accepted.
pub fn opt_i64(props: &PropertyMap, field: &'static str) -> Result<Option<i64>, TransformError> {
    match present(props, field) {
        None => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 => Ok(Some(f as i64)),
                    _ => Err(TransformError::WrongType { field, expected: "integer" }),
                }
            }
        }
        Some(_) => Err(TransformError::WrongType { field, expected: "integer" }),
    }
}

/// Optional floating point property.
pub fn opt_f64(props: &PropertyMap, field: &'static str) -> Result<Option<f64>, TransformError> {
    match present(props, field) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or(TransformError::WrongType { field, expected: "number" }),
        Some(_) => Err(TransformError::WrongType { field, expected: "number" }),
    }
}

/// Optional list-of-strings property. A missing list is empty.
pub fn str_list(props: &PropertyMap, field: &'static str) -> Result<Vec<String>, TransformError> {
    match present(props, field) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                _ => Err(TransformError::WrongType { field, expected: "list of strings" }),
            })
            .collect(),
        Some(_) => Err(TransformError::WrongType { field, expected: "list of strings" }),
    }
}

/// Optional temporal property, normalized to UTC.
pub fn opt_timestamp(
    props: &PropertyMap,
    field: &'static str,
) -> Result<Option<Timestamp>, TransformError> {
    match opt_str(props, field)? {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or(TransformError::InvalidTimestamp { field, value: raw }),
    }
}

/// Reject windows whose start lies after their end. Open windows pass.
pub fn check_window(
    start: Option<&Timestamp>,
    end: Option<&Timestamp>,
    start_field: &'static str,
    end_field: &'static str,
) -> Result<(), TransformError> {
    match (start, end) {
        (Some(s), Some(e)) if s > e => Err(TransformError::InvertedWindow {
            start: start_field,
            end: end_field,
        }),
        _ => Ok(()),
    }
}

/// Reject confidence values outside 0..=100.
pub fn check_confidence(confidence: Option<i64>) -> Result<(), TransformError> {
    match confidence {
        Some(c) if !(0..=100).contains(&c) => Err(TransformError::OutOfRange {
            field: "confidence",
            value: c.to_string(),
        }),
        _ => Ok(()),
    }
}
