//! Record builder: one input row to one record.
//!
//! Order of operations:
//!
//! 1. every non-empty cell is checked against the allow-list and sanitized;
//!    all failures of the line are collected, none short-circuits
//! 2. custom input fields the request supplies as `custom_<field>`; only
//!    fields declared in `custom_input_fields` are taken
//! 3. constant fields from the configuration
//! 4. defaults for classification, feed code and `time.observation`
//! 5. dry runs force `classification.type`/`identifier` to `test`
//!
//! Steps 2-4 never overwrite a field the row already provided.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::sanitizer::{sanitize, SanitizeContext};
use crate::config::FieldDefaults;
use crate::error::SanitizeError;
use crate::models::{FieldError, Record, Row};
use crate::validation::time::canonical_now;
use crate::validation::Harmonization;

/// Classification forced onto dry-run records.
pub const DRYRUN_CLASSIFICATION: &str = "test";

/// Prefix of per-request overrides for custom input fields.
pub const CUSTOM_PREFIX: &str = "custom_";

/// Per-batch options of the builder.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub dryrun: bool,
    /// Offset for timestamps without one.
    pub timezone: String,
    /// Request-level custom values, keyed `custom_<field>`.
    pub custom: BTreeMap<String, String>,
    /// Batch start, used for `time.observation`.
    pub now: DateTime<Utc>,
}

impl BuildOptions {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            dryrun: false,
            timezone: "+00:00".to_string(),
            custom: BTreeMap::new(),
            now,
        }
    }
}

/// Result of building one line.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub record: Record,
    /// False when any field error was recorded.
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

/// Builds records for one batch.
pub struct RecordBuilder<'a> {
    schema: &'a Harmonization,
    custom_input_fields: &'a Map<String, Value>,
    constant_fields: &'a Map<String, Value>,
    defaults: &'a FieldDefaults,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(
        schema: &'a Harmonization,
        custom_input_fields: &'a Map<String, Value>,
        constant_fields: &'a Map<String, Value>,
        defaults: &'a FieldDefaults,
    ) -> Self {
        Self {
            schema,
            custom_input_fields,
            constant_fields,
            defaults,
        }
    }

    /// Build one line.
    ///
    /// Returns `Err` only for a line that carries no data at all; the error is
    /// attributed to the whole line.
    pub fn build(&self, row: &Row, options: &BuildOptions) -> Result<BuildOutcome, FieldError> {
        if row.values().all(|raw| raw.trim().is_empty()) {
            return Err(FieldError::line("Line is empty"));
        }

        let mut record = Record::new();
        let mut errors = Vec::new();
        let context = SanitizeContext {
            timezone: &options.timezone,
        };

        for (field, raw) in row {
            if raw.trim().is_empty() {
                continue;
            }
            if !self.schema.is_valid_key(field) {
                let err = SanitizeError::UnknownField(field.clone());
                errors.push(FieldError::rejected(field, raw, &err));
                continue;
            }
            let added = sanitize(self.schema, field, raw, &context)
                .and_then(|value| record.add(self.schema, field, &value));
            if let Err(err) = added {
                errors.push(FieldError::rejected(field, raw, &err));
            }
        }

        for field in self.custom_input_fields.keys() {
            if let Some(raw) = options.custom.get(&format!("{CUSTOM_PREFIX}{field}")) {
                self.inject(&mut record, &mut errors, field, &Value::String(raw.clone()));
            }
        }

        for (field, value) in self.constant_fields {
            self.inject(&mut record, &mut errors, field, value);
        }

        let defaults = [
            ("classification.type", Value::from(self.defaults.classification_type.as_str())),
            (
                "classification.identifier",
                Value::from(self.defaults.classification_identifier.as_str()),
            ),
            ("feed.code", Value::from(self.defaults.feed_code.as_str())),
            ("time.observation", Value::from(canonical_now(&options.now))),
        ];
        for (field, value) in &defaults {
            self.inject(&mut record, &mut errors, field, value);
        }

        if options.dryrun {
            let test = Value::from(DRYRUN_CLASSIFICATION);
            for field in ["classification.type", "classification.identifier"] {
                if let Err(err) = record.set(self.schema, field, &test) {
                    errors.push(FieldError::rejected(field, DRYRUN_CLASSIFICATION, &err));
                }
            }
        }

        Ok(BuildOutcome {
            record,
            valid: errors.is_empty(),
            errors,
        })
    }

    /// Add a configured value unless the field is already set or the value is blank.
    fn inject(&self, record: &mut Record, errors: &mut Vec<FieldError>, field: &str, value: &Value) {
        if record.contains(field) || is_blank(value) {
            return;
        }
        if let Err(err) = record.add(self.schema, field, value) {
            errors.push(FieldError::rejected(field, &display(value), &err));
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
