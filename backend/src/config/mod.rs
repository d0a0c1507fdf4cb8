//! Application configuration.
//!
//! Loaded once from a JSON file, validated against the embedded JSON Schema
//! `schemas/webinput-config.json`, then shared read-only (`Arc<AppConfig>`).
//! A missing file means the defaults below.
//!
//! # Environment
//!
//! - `WEBINPUT_CONFIG` - path of the configuration file
//! - `WEBINPUT_API_TOKEN` - overrides `api_token`
//!
//! Both may come from a `.env` file.
//!
//! # Example
//!
//! ```json
//! {
//!   "destination": { "type": "file", "path": "/var/spool/webinput/events.jsonl" },
//!   "constant_fields": { "feed.provider": "my-organization" },
//!   "custom_input_fields": { "classification.identifier": "manual" },
//!   "required_fields": ["source.ip"],
//!   "stages": [
//!     { "id": "url", "kind": "url" },
//!     { "id": "taxonomy", "kind": "taxonomy" }
//!   ]
//! }
//! ```

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::queue::DestinationConfig;
use crate::stages::StageSpec;
use crate::validation::{self, Harmonization};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "WEBINPUT_CONFIG";

/// Environment variable overriding the submission token.
pub const TOKEN_ENV: &str = "WEBINPUT_API_TOKEN";

const CONFIG_SCHEMA: &str = include_str!("../../schemas/webinput-config.json");

static CONFIG_SCHEMA_JSON: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(CONFIG_SCHEMA).expect("embedded configuration schema is valid JSON")
});

/// Values injected when a record lacks them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDefaults {
    pub classification_type: String,
    pub classification_identifier: String,
    pub feed_code: String,
    /// Timezone for requests that do not name one.
    pub timezone: String,
}

impl Default for FieldDefaults {
    fn default() -> Self {
        Self {
            classification_type: "test".to_string(),
            classification_identifier: "test".to_string(),
            feed_code: "webinput".to_string(),
            timezone: "+00:00".to_string(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub destination: DestinationConfig,
    /// Always injected when absent.
    pub constant_fields: Map<String, Value>,
    /// Fields a request may set with `custom_<field>`. The values are
    /// suggestions for clients and are never injected on their own.
    pub custom_input_fields: Map<String, Value>,
    /// Checked by the submission gate.
    pub required_fields: Vec<String>,
    /// Field names callers may supply; all known fields when unset.
    pub allowed_fields: Option<Vec<String>>,
    pub harmonization_file: Option<PathBuf>,
    /// Stage chain, in execution order.
    pub stages: Vec<StageSpec>,
    /// SQLite database shared by `sql_output` stages.
    pub database: Option<PathBuf>,
    /// Bearer token required for submissions.
    pub api_token: Option<String>,
    pub defaults: FieldDefaults,
}

impl AppConfig {
    /// Parse and validate a configuration document.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let raw: Value = serde_json::from_str(content)?;
        validation::validate(&CONFIG_SCHEMA_JSON, &raw).map_err(ConfigError::Invalid)?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Load from a file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Load from `path`, or from `WEBINPUT_CONFIG`, or fall back to defaults.
    pub fn from_env(path: Option<&Path>) -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
        {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Ok(token) = env::var(TOKEN_ENV) {
            if !token.is_empty() {
                config.api_token = Some(token);
            }
        }
        Ok(config)
    }

    /// The harmonization in effect: configured file or embedded default,
    /// restricted by `allowed_fields`.
    pub fn harmonization(&self) -> ConfigResult<Harmonization> {
        let schema = match &self.harmonization_file {
            Some(path) => Harmonization::from_file(path)?,
            None => Harmonization::embedded()?,
        };
        Ok(match &self.allowed_fields {
            Some(allowed) => schema.with_allowed_fields(allowed.iter().cloned()),
            None => schema,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config.destination, DestinationConfig::Memory);
        assert!(config.stages.is_empty());
        assert_eq!(config.defaults.feed_code, "webinput");
        assert_eq!(config.defaults.timezone, "+00:00");
    }

    #[test]
    fn test_full_document() {
        let config = AppConfig::from_json(
            &json!({
                "destination": { "type": "file", "path": "/tmp/events.jsonl" },
                "constant_fields": { "feed.provider": "my-organization" },
                "required_fields": ["source.ip", "source.as_name"],
                "stages": [
                    { "id": "split", "kind": "split", "parameters": { "field": "comment" } }
                ],
                "defaults": { "feed_code": "oneshot" }
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(
            config.destination,
            DestinationConfig::File {
                path: "/tmp/events.jsonl".into()
            }
        );
        assert_eq!(config.required_fields, vec!["source.ip", "source.as_name"]);
        assert_eq!(config.stages[0].parameters["field"], "comment");
        assert_eq!(config.defaults.feed_code, "oneshot");
        assert_eq!(config.defaults.classification_type, "test");
    }

    #[test]
    fn test_schema_violations_are_reported() {
        let err = AppConfig::from_json(
            &json!({
                "destination": { "type": "http" },
                "stages": [ { "kind": "url" } ],
                "unknown_key": true
            })
            .to_string(),
        )
        .unwrap_err();

        match err {
            ConfigError::Invalid(errors) => assert!(errors.len() >= 3, "{:?}", errors),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "allowed_fields": ["source.ip"] }}"#).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        let schema = config.harmonization().unwrap();
        assert!(schema.is_valid_key("source.ip"));
        assert!(!schema.is_valid_key("source.fqdn"));
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load("/nonexistent/webinput.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
