//! Built-in record-to-record stages.
//!
//! | kind           | output                                      |
//! |----------------|---------------------------------------------|
//! | `url`          | one record, host/port/path derived from URLs |
//! | `taxonomy`     | one record, taxonomy derived from the type  |
//! | `filter`       | zero or one record                          |
//! | `remove_affix` | one record, prefix or suffix stripped       |
//! | `set_field`    | one record, fixed fields set                |
//! | `split`        | one record per suffix                       |

use regex::Regex;
use serde_json::{Map, Value};
use std::net::IpAddr;

use super::registry::Parameters;
use super::{Stage, StageResources, StageSpec};
use crate::error::{RegistryResult, StageError, StageResult};
use crate::models::Record;
use crate::validation::{taxonomy, Harmonization};

/// Schemes whose transport is always TCP.
const TCP_SCHEMES: &[&str] = &["http", "https", "ftp", "ws", "wss"];

/// Add `key` unless the record already has it.
fn add_missing(
    record: &mut Record,
    schema: &Harmonization,
    key: &str,
    value: Value,
) -> StageResult<()> {
    if !record.contains(key) {
        record.add(schema, key, &value)?;
    }
    Ok(())
}

/// Text form of a field value for comparisons.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// url
// =============================================================================

/// Derives host, port, path and protocol from `source.url` / `destination.url`.
pub struct UrlStage<'r> {
    id: String,
    schema: &'r Harmonization,
}

pub fn url_stage<'r>(
    spec: &StageSpec,
    resources: &StageResources<'r>,
) -> RegistryResult<Box<dyn Stage + 'r>> {
    Ok(Box::new(UrlStage {
        id: spec.id.clone(),
        schema: resources.schema,
    }))
}

impl UrlStage<'_> {
    fn expand(&self, record: &mut Record, side: &str) -> StageResult<()> {
        let Some(text) = record.get_str(&format!("{side}.url")).map(str::to_string) else {
            return Ok(());
        };
        let url = url::Url::parse(&text)
            .map_err(|e| StageError::failed(format!("could not parse URL '{}': {}", text, e)))?;

        if let Some(host) = url.host_str() {
            let host = host.trim_start_matches('[').trim_end_matches(']');
            if host.parse::<IpAddr>().is_ok() {
                add_missing(record, self.schema, &format!("{side}.ip"), Value::from(host))?;
            } else {
                add_missing(record, self.schema, &format!("{side}.fqdn"), Value::from(host))?;
            }
        }
        if let Some(port) = url.port_or_known_default() {
            add_missing(record, self.schema, &format!("{side}.port"), Value::from(port))?;
        }
        if !url.path().is_empty() {
            add_missing(record, self.schema, &format!("{side}.urlpath"), Value::from(url.path()))?;
        }

        let scheme = url.scheme().to_lowercase();
        if TCP_SCHEMES.contains(&scheme.as_str()) {
            add_missing(record, self.schema, "protocol.transport", Value::from("tcp"))?;
        }
        add_missing(record, self.schema, "protocol.application", Value::from(scheme))?;
        Ok(())
    }
}

impl Stage for UrlStage<'_> {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&mut self, mut record: Record) -> StageResult<Vec<Record>> {
        self.expand(&mut record, "source")?;
        self.expand(&mut record, "destination")?;
        Ok(vec![record])
    }
}

// =============================================================================
// taxonomy
// =============================================================================

/// Sets `classification.taxonomy` from `classification.type`.
pub struct TaxonomyStage<'r> {
    id: String,
    schema: &'r Harmonization,
}

pub fn taxonomy_stage<'r>(
    spec: &StageSpec,
    resources: &StageResources<'r>,
) -> RegistryResult<Box<dyn Stage + 'r>> {
    Ok(Box::new(TaxonomyStage {
        id: spec.id.clone(),
        schema: resources.schema,
    }))
}

impl Stage for TaxonomyStage<'_> {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&mut self, mut record: Record) -> StageResult<Vec<Record>> {
        let derived = record
            .get_str("classification.type")
            .and_then(taxonomy::taxonomy_of);
        if let Some(derived) = derived {
            record.set(self.schema, "classification.taxonomy", &Value::from(derived))?;
        }
        Ok(vec![record])
    }
}

// =============================================================================
// filter
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterAction {
    Keep,
    Drop,
}

enum Matcher {
    /// Any value matches.
    Present,
    Equals(String),
    Pattern(Regex),
}

/// Keeps or drops records by the value of one field.
pub struct FilterStage {
    id: String,
    key: String,
    matcher: Matcher,
    action: FilterAction,
}

pub fn filter_stage<'r>(
    spec: &StageSpec,
    _resources: &StageResources<'r>,
) -> RegistryResult<Box<dyn Stage + 'r>> {
    let params = Parameters::of(spec);
    let key = params.string("filter_key")?.to_string();
    let action = match params.string("filter_action")? {
        "keep" => FilterAction::Keep,
        "drop" => FilterAction::Drop,
        other => {
            return Err(params.invalid(
                "filter_action",
                format!("must be 'keep' or 'drop', got '{}'", other),
            ))
        }
    };
    let matcher = match params.optional_string("filter_value")? {
        None => Matcher::Present,
        Some(value) if params.bool_or("filter_regex", false)? => Matcher::Pattern(
            Regex::new(value).map_err(|e| params.invalid("filter_value", e.to_string()))?,
        ),
        Some(value) => Matcher::Equals(value.to_string()),
    };
    Ok(Box::new(FilterStage {
        id: spec.id.clone(),
        key,
        matcher,
        action,
    }))
}

impl FilterStage {
    fn matches(&self, record: &Record) -> bool {
        let Some(value) = record.get(&self.key) else {
            return false;
        };
        match &self.matcher {
            Matcher::Present => true,
            Matcher::Equals(expected) => value_text(value) == *expected,
            Matcher::Pattern(regex) => regex.is_match(&value_text(value)),
        }
    }
}

impl Stage for FilterStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&mut self, record: Record) -> StageResult<Vec<Record>> {
        let pass = match self.action {
            FilterAction::Keep => self.matches(&record),
            FilterAction::Drop => !self.matches(&record),
        };
        Ok(if pass { vec![record] } else { Vec::new() })
    }
}

// =============================================================================
// remove_affix
// =============================================================================

/// Strips a fixed prefix or suffix from a text field.
pub struct RemoveAffixStage<'r> {
    id: String,
    schema: &'r Harmonization,
    field: String,
    affix: String,
    remove_prefix: bool,
}

pub fn remove_affix_stage<'r>(
    spec: &StageSpec,
    resources: &StageResources<'r>,
) -> RegistryResult<Box<dyn Stage + 'r>> {
    let params = Parameters::of(spec);
    let affix = params.string("affix")?;
    if affix.is_empty() {
        return Err(params.invalid("affix", "must not be empty"));
    }
    Ok(Box::new(RemoveAffixStage {
        id: spec.id.clone(),
        schema: resources.schema,
        field: params.string("field")?.to_string(),
        affix: affix.to_string(),
        remove_prefix: params.bool_or("remove_prefix", true)?,
    }))
}

impl Stage for RemoveAffixStage<'_> {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&mut self, mut record: Record) -> StageResult<Vec<Record>> {
        let stripped = record.get_str(&self.field).and_then(|value| {
            let rest = if self.remove_prefix {
                value.strip_prefix(self.affix.as_str())
            } else {
                value.strip_suffix(self.affix.as_str())
            };
            rest.map(str::to_string)
        });
        if let Some(stripped) = stripped {
            record.set(self.schema, &self.field, &Value::String(stripped))?;
        }
        Ok(vec![record])
    }
}

// =============================================================================
// set_field
// =============================================================================

/// Sets fixed field values.
pub struct SetFieldStage<'r> {
    id: String,
    schema: &'r Harmonization,
    fields: Map<String, Value>,
    overwrite: bool,
}

pub fn set_field_stage<'r>(
    spec: &StageSpec,
    resources: &StageResources<'r>,
) -> RegistryResult<Box<dyn Stage + 'r>> {
    let params = Parameters::of(spec);
    let fields = params.object("fields")?.clone();
    if let Some(unknown) = fields.keys().find(|key| !resources.schema.knows(key)) {
        return Err(params.invalid("fields", format!("unknown field '{}'", unknown)));
    }
    Ok(Box::new(SetFieldStage {
        id: spec.id.clone(),
        schema: resources.schema,
        fields,
        overwrite: params.bool_or("overwrite", false)?,
    }))
}

impl Stage for SetFieldStage<'_> {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&mut self, mut record: Record) -> StageResult<Vec<Record>> {
        for (key, value) in &self.fields {
            if self.overwrite || !record.contains(key) {
                record.set(self.schema, key, value)?;
            }
        }
        Ok(vec![record])
    }
}

// =============================================================================
// split
// =============================================================================

/// Emits one copy of the record per suffix, each with the suffix appended to `field`.
pub struct SplitStage<'r> {
    id: String,
    schema: &'r Harmonization,
    field: String,
    suffixes: Vec<String>,
}

pub fn split_stage<'r>(
    spec: &StageSpec,
    resources: &StageResources<'r>,
) -> RegistryResult<Box<dyn Stage + 'r>> {
    let params = Parameters::of(spec);
    let suffixes = params
        .optional_string_list("suffixes")?
        .unwrap_or_else(|| vec!["0".to_string(), "1".to_string()]);
    if suffixes.is_empty() {
        return Err(params.invalid("suffixes", "must not be empty"));
    }
    Ok(Box::new(SplitStage {
        id: spec.id.clone(),
        schema: resources.schema,
        field: params.string("field")?.to_string(),
        suffixes,
    }))
}

impl Stage for SplitStage<'_> {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&mut self, record: Record) -> StageResult<Vec<Record>> {
        let base = record
            .get(&self.field)
            .map(value_text)
            .ok_or_else(|| StageError::failed(format!("field '{}' is missing", self.field)))?;

        self.suffixes
            .iter()
            .map(|suffix| -> StageResult<Record> {
                let mut copy = record.clone();
                copy.set(self.schema, &self.field, &Value::String(format!("{base}{suffix}")))?;
                Ok(copy)
            })
            .collect()
    }
}
