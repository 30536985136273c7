//! Field casts from raw Ragic values to typed model fields.
//!
//! Every helper takes the logical field name so a failed cast names the
//! field and the offending raw value instead of crashing the batch. Empty
//! strings read as `None` throughout; Ragic serves blanks, not nulls.

use thiserror::Error;

use crate::registry::ConfigurationError;

/// One record field did not fit the expected shape. Isolated to that
/// record; the calling sync service decides whether to skip or abort.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("field {field}: cannot parse {value:?} as {expected}")]
pub struct FieldValidationError {
    pub field: String,
    pub value: String,
    pub expected: &'static str,
}

impl FieldValidationError {
    fn new(field: &str, value: &str, expected: &'static str) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
            expected,
        }
    }
}

/// Failure while mapping one record to a typed entity.
#[derive(Debug, Clone, Error)]
pub enum MapError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] FieldValidationError),
}

pub fn parse_string(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Dates arrive as `YYYY-MM-DD` or `YYYY/MM/DD`. Multi-value cells
/// ("2025-02-12, 2025-12-01") take the first entry.
pub fn parse_date(
    field: &str,
    raw: Option<String>,
) -> Result<Option<chrono::NaiveDate>, FieldValidationError> {
    let Some(raw) = parse_string(raw) else {
        return Ok(None);
    };
    let first = raw.split(", ").next().unwrap_or(&raw).trim();

    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(first, format) {
            return Ok(Some(date));
        }
    }
    Err(FieldValidationError::new(field, &raw, "date"))
}

pub fn parse_datetime(
    field: &str,
    raw: Option<String>,
) -> Result<Option<chrono::NaiveDateTime>, FieldValidationError> {
    let Some(raw) = parse_string(raw) else {
        return Ok(None);
    };
    let candidate = raw.trim_end_matches('Z').trim().replace('T', " ");

    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
    ] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(&candidate, format) {
            return Ok(Some(dt));
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(&candidate, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0));
    }
    Err(FieldValidationError::new(field, &raw, "datetime"))
}

/// Ragic checkboxes serialize as 0/1, sometimes as yes/no text.
pub fn parse_bool(
    field: &str,
    raw: Option<String>,
) -> Result<Option<bool>, FieldValidationError> {
    let Some(raw) = parse_string(raw) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(FieldValidationError::new(field, &raw, "boolean")),
    }
}

pub fn parse_int(field: &str, raw: Option<String>) -> Result<Option<i64>, FieldValidationError> {
    let Some(raw) = parse_string(raw) else {
        return Ok(None);
    };
    let cleaned = raw.replace(',', "");
    cleaned
        .parse::<i64>()
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().map(|f| f as i64))
        .map(Some)
        .ok_or_else(|| FieldValidationError::new(field, &raw, "integer"))
}

pub fn parse_float(field: &str, raw: Option<String>) -> Result<Option<f64>, FieldValidationError> {
    let Some(raw) = parse_string(raw) else {
        return Ok(None);
    };
    raw.replace(',', "")
        .parse::<f64>()
        .map(Some)
        .map_err(|_| FieldValidationError::new(field, &raw, "number"))
}
