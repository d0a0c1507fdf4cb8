//! Harmonization: the set of known event fields and their value types.
//!
//! The file format is a JSON object with an `event` section mapping field
//! names to `{ "type": ..., "description": ... }`. An embedded default is
//! compiled in; deployments may point to their own file.
//!
//! Keys below `extra.` are members of the `extra` JSON dictionary and are
//! accepted whenever `extra` itself is a known field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use super::types::FieldType;
use crate::error::{SanitizeError, SchemaError, SchemaResult};

const EMBEDDED_HARMONIZATION: &str = include_str!("../../schemas/harmonization.json");

const EXTRA_FIELD: &str = "extra";
const EXTRA_PREFIX: &str = "extra.";

/// Type and description of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
struct HarmonizationFile {
    event: Option<BTreeMap<String, FieldSpec>>,
}

/// Known fields, optionally restricted by an allow-list.
#[derive(Debug, Clone)]
pub struct Harmonization {
    fields: BTreeMap<String, FieldSpec>,
    allowed: Option<BTreeSet<String>>,
}

impl Harmonization {
    /// Parse a harmonization document.
    pub fn from_json(content: &str) -> SchemaResult<Self> {
        let file: HarmonizationFile = serde_json::from_str(content)?;
        let fields = file.event.ok_or(SchemaError::MissingEventSection)?;
        Ok(Self {
            fields,
            allowed: None,
        })
    }

    /// The compiled-in default harmonization.
    pub fn embedded() -> SchemaResult<Self> {
        Self::from_json(EMBEDDED_HARMONIZATION)
    }

    pub fn from_file(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Restrict which field names callers may supply.
    pub fn with_allowed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Type of a field, resolving `extra.*` to the `extra` dictionary.
    pub fn field_type(&self, key: &str) -> Option<FieldType> {
        if let Some(spec) = self.fields.get(key) {
            return Some(spec.field_type);
        }
        if key.starts_with(EXTRA_PREFIX) && key.len() > EXTRA_PREFIX.len() {
            return self
                .fields
                .get(EXTRA_FIELD)
                .filter(|spec| spec.field_type == FieldType::JsonDict)
                .map(|spec| spec.field_type);
        }
        None
    }

    /// Whether the harmonization knows this field at all.
    pub fn knows(&self, key: &str) -> bool {
        self.field_type(key).is_some()
    }

    /// Whether a caller may supply this field: known, and on the allow-list if one is set.
    pub fn is_valid_key(&self, key: &str) -> bool {
        if !self.knows(key) {
            return false;
        }
        match &self.allowed {
            None => true,
            Some(allowed) => {
                allowed.contains(key)
                    || (key.starts_with(EXTRA_PREFIX) && allowed.contains(EXTRA_FIELD))
            }
        }
    }

    /// Sanitize `value` for `key`.
    ///
    /// Members of `extra` keep any JSON value; text that parses as JSON is
    /// stored parsed.
    pub fn sanitize(&self, key: &str, value: &Value) -> Result<Value, SanitizeError> {
        let field_type = self
            .field_type(key)
            .ok_or_else(|| SanitizeError::UnknownField(key.to_string()))?;

        if key.starts_with(EXTRA_PREFIX) && !self.fields.contains_key(key) {
            return sanitize_extra(key, value);
        }

        field_type
            .sanitize(value)
            .ok_or_else(|| SanitizeError::InvalidValue {
                key: key.to_string(),
                value: display_value(value),
            })
    }

    /// All known fields, sorted by name.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn sanitize_extra(key: &str, value: &Value) -> Result<Value, SanitizeError> {
    match value {
        Value::Null => Err(SanitizeError::InvalidValue {
            key: key.to_string(),
            value: "null".to_string(),
        }),
        Value::String(s) if s.trim().is_empty() => Err(SanitizeError::InvalidValue {
            key: key.to_string(),
            value: s.clone(),
        }),
        Value::String(s) => Ok(serde_json::from_str(s).unwrap_or_else(|_| value.clone())),
        other => Ok(other.clone()),
    }
}

/// Raw text of a value for error messages, without JSON quoting of strings.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_embedded_harmonization_loads() {
        let schema = Harmonization::embedded().unwrap();
        assert_eq!(schema.field_type("source.ip"), Some(FieldType::IpAddress));
        assert_eq!(schema.field_type("time.source"), Some(FieldType::DateTime));
        assert!(schema.knows("extra.note"));
        assert!(!schema.knows("extra."));
        assert!(!schema.knows("source.unknown"));
    }

    #[test]
    fn test_missing_event_section() {
        let err = Harmonization::from_json(r#"{"report": {}}"#).unwrap_err();
        assert!(matches!(err, SchemaError::MissingEventSection));
    }

    #[test]
    fn test_allow_list_restricts_caller_fields() {
        let schema = Harmonization::embedded()
            .unwrap()
            .with_allowed_fields(["source.ip", "extra"]);

        assert!(schema.is_valid_key("source.ip"));
        assert!(schema.is_valid_key("extra.ticket"));
        assert!(!schema.is_valid_key("source.asn"));
        // the allow-list does not change what the schema can sanitize
        assert_eq!(schema.sanitize("source.asn", &json!("1")).unwrap(), json!(1));
    }

    #[test]
    fn test_sanitize_errors() {
        let schema = Harmonization::embedded().unwrap();
        assert_eq!(
            schema.sanitize("source.ip", &json!("1270.0.0.1")),
            Err(SanitizeError::InvalidValue {
                key: "source.ip".into(),
                value: "1270.0.0.1".into()
            })
        );
        assert_eq!(
            schema.sanitize("bogus", &json!("x")),
            Err(SanitizeError::UnknownField("bogus".into()))
        );
    }

    #[test]
    fn test_extra_members_parse_json() {
        let schema = Harmonization::embedded().unwrap();
        assert_eq!(schema.sanitize("extra.count", &json!("3")).unwrap(), json!(3));
        assert_eq!(
            schema.sanitize("extra.note", &json!("free text")).unwrap(),
            json!("free text")
        );
        assert!(schema.sanitize("extra.note", &json!("  ")).is_err());
    }
}
