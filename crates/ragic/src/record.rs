//! Raw Ragic record representation.

use serde_json::{Map, Value};

/// One record as returned by the Ragic API: the remote-assigned ID plus the
/// raw field map keyed by field ID. Treated as read-only outside explicit
/// write-backs through the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct RagicRecord {
    pub ragic_id: i64,
    pub fields: Map<String, Value>,
}

impl RagicRecord {
    pub fn new(ragic_id: i64, fields: Map<String, Value>) -> Self {
        Self { ragic_id, fields }
    }

    /// Raw value for a field ID.
    pub fn raw(&self, field_id: &str) -> Option<&Value> {
        self.fields.get(field_id)
    }

    /// Trimmed string value for a field ID; empty strings read as `None`.
    /// Non-string scalars are stringified, which is how Ragic serves numeric
    /// columns depending on sheet settings.
    pub fn text(&self, field_id: &str) -> Option<String> {
        match self.fields.get(field_id)? {
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Extract the record ID a Ragic response or webhook payload carries.
///
/// Ragic is inconsistent here: listings key records by ID string, create
/// responses use `ragicId` at the root or `_ragicId` nested under `data`,
/// and webhook payloads send `_ragicId` (occasionally as a string).
pub fn extract_ragic_id(value: &Value) -> Option<i64> {
    const KEYS: [&str; 3] = ["_ragicId", "ragicId", "id"];

    let obj = value.as_object()?;
    for key in KEYS {
        if let Some(found) = obj.get(key).and_then(value_as_i64) {
            return Some(found);
        }
    }
    obj.get("data").and_then(extract_ragic_id)
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
