//! Domain models for the webinput pipeline.
//!
//! - [`Row`] - one raw input line, field name to raw text
//! - [`Record`] - a sanitized, schema-validated event
//! - [`FieldError`] - an error attributed to a field of a line, or to the line itself

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::SanitizeError;
use crate::validation::Harmonization;

/// Key under which errors not attributable to one field are reported.
pub const LINE_ERROR_KEY: &str = "line";

/// Type marker appended to serialized records.
const RECORD_TYPE: &str = "Event";

// =============================================================================
// Row
// =============================================================================

/// One raw input line: field name (dotted namespace, e.g. `source.ip`) to raw value.
pub type Row = BTreeMap<String, String>;

/// Convert a JSON object into a [`Row`].
///
/// Strings are taken as-is, numbers and booleans are rendered as text,
/// `null` cells are dropped. Nested values keep their JSON text.
pub fn row_from_json(object: &Map<String, Value>) -> Row {
    object
        .iter()
        .filter_map(|(key, value)| {
            let raw = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((key.clone(), raw))
        })
        .collect()
}

// =============================================================================
// Record
// =============================================================================

/// A sanitized event. Fields keep the order they were added in.
///
/// Every value stored through [`Record::add`] or [`Record::set`] has passed the
/// harmonization for its field name; malformed values are rejected, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field that is not yet present.
    pub fn add(
        &mut self,
        schema: &Harmonization,
        key: &str,
        value: &Value,
    ) -> Result<(), SanitizeError> {
        if self.fields.contains_key(key) {
            return Err(SanitizeError::KeyExists(key.to_string()));
        }
        self.set(schema, key, value)
    }

    /// Add or overwrite a field.
    pub fn set(
        &mut self,
        schema: &Harmonization,
        key: &str,
        value: &Value,
    ) -> Result<(), SanitizeError> {
        let sanitized = schema.sanitize(key, value)?;
        self.fields.insert(key.to_string(), sanitized);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a field as a string slice, if it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Wire format for the destination queue: all fields in insertion order,
    /// then `"__type": "Event"`.
    pub fn serialize_event(&self) -> String {
        let mut object = self.fields.clone();
        object.insert("__type".to_string(), Value::String(RECORD_TYPE.to_string()));
        Value::Object(object).to_string()
    }
}

// =============================================================================
// FieldError
// =============================================================================

/// An error message attributed to a field (or to the whole line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// An error attributed to the whole line.
    pub fn line(message: impl Into<String>) -> Self {
        Self::new(LINE_ERROR_KEY, message)
    }

    /// The error for a raw value that could not be added under `field`.
    pub fn rejected(field: &str, raw: &str, error: &SanitizeError) -> Self {
        Self::new(
            field,
            format!("Failed to add data '{}' as field '{}': {}", raw, field, error),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Harmonization {
        Harmonization::embedded().unwrap()
    }

    #[test]
    fn test_row_from_json_stringifies_scalars() {
        let object = json!({
            "source.ip": "127.0.0.1",
            "source.asn": 64496,
            "source.tor_node": false,
            "comment": null
        });
        let row = row_from_json(object.as_object().unwrap());

        assert_eq!(row.len(), 3);
        assert_eq!(row["source.asn"], "64496");
        assert_eq!(row["source.tor_node"], "false");
        assert!(!row.contains_key("comment"));
    }

    #[test]
    fn test_add_rejects_existing_key() {
        let schema = schema();
        let mut record = Record::new();
        record.add(&schema, "source.ip", &json!("127.0.0.1")).unwrap();

        let err = record.add(&schema, "source.ip", &json!("10.0.0.1")).unwrap_err();
        assert_eq!(err, SanitizeError::KeyExists("source.ip".into()));
        assert_eq!(record.get_str("source.ip"), Some("127.0.0.1"));
    }

    #[test]
    fn test_invalid_value_is_not_stored() {
        let schema = schema();
        let mut record = Record::new();

        assert!(record.add(&schema, "source.ip", &json!("1270.0.0.1")).is_err());
        assert!(record.is_empty());
    }

    #[test]
    fn test_serialize_event_carries_type_marker() {
        let schema = schema();
        let mut record = Record::new();
        record.add(&schema, "source.asn", &json!("1")).unwrap();

        let wire: Value = serde_json::from_str(&record.serialize_event()).unwrap();
        assert_eq!(wire["source.asn"], 1);
        assert_eq!(wire["__type"], "Event");
    }

    #[test]
    fn test_serialize_event_keeps_insertion_order() {
        let schema = schema();
        let mut record = Record::new();
        record.add(&schema, "source.ip", &json!("127.0.0.1")).unwrap();
        record.add(&schema, "feed.provider", &json!("Example")).unwrap();
        record.add(&schema, "classification.type", &json!("test")).unwrap();

        assert_eq!(
            record.serialize_event(),
            r#"{"source.ip":"127.0.0.1","feed.provider":"Example","classification.type":"test","__type":"Event"}"#
        );
    }

    #[test]
    fn test_rejected_message_format() {
        let err = SanitizeError::InvalidValue {
            key: "source.ip".into(),
            value: "1270.0.0.1".into(),
        };
        let field_error = FieldError::rejected("source.ip", "1270.0.0.1", &err);
        assert_eq!(
            field_error.message,
            "Failed to add data '1270.0.0.1' as field 'source.ip': \
             invalid value '1270.0.0.1' for key 'source.ip'"
        );
        assert_eq!(field_error.field, "source.ip");
        assert_eq!(FieldError::line("line empty").field, LINE_ERROR_KEY);
    }
}
