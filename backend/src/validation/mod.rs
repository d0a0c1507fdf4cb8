//! Validation: field schema (harmonization) and JSON Schema checks.
//!
//! - [`harmonization`] - known event fields, their types and the allow-list
//! - [`types`] - per-type sanitation of raw values
//! - [`taxonomy`] - classification taxonomy
//! - [`time`] - lenient timestamp parsing
//!
//! The JSON Schema helpers ([`validate`], [`is_valid`]) check documents such
//! as the application configuration against an embedded Draft 7 schema.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use webinput::validation::Harmonization;
//!
//! let schema = Harmonization::embedded()?;
//! assert_eq!(schema.sanitize("source.asn", &json!("AS64496"))?, json!(64496));
//! assert!(schema.sanitize("source.ip", &json!("1270.0.0.1")).is_err());
//! ```

pub mod harmonization;
pub mod taxonomy;
pub mod time;
pub mod types;

pub use harmonization::{FieldSpec, Harmonization};
pub use types::FieldType;

use serde_json::Value;

/// Validate a JSON document against a JSON Schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every violation otherwise
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick check: true/false only.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}
