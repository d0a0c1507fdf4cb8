//! Field sanitizer: turns one raw cell into a stored value.
//!
//! Time fields (`time.*`) get lenient parsing first. A timestamp without an
//! offset is completed with the batch timezone and normalised to UTC; every
//! other field goes straight to the harmonization.

use serde_json::Value;

use crate::error::SanitizeError;
use crate::validation::time::{canonical, parse_fuzzy, parse_offset, ParsedTime};
use crate::validation::Harmonization;

const TIME_PREFIX: &str = "time.";

/// Per-batch sanitation settings.
#[derive(Debug, Clone, Copy)]
pub struct SanitizeContext<'a> {
    /// Offset applied to timestamps that carry none, e.g. `+02:00`.
    pub timezone: &'a str,
}

/// Sanitize `raw` for `field`.
pub fn sanitize(
    schema: &Harmonization,
    field: &str,
    raw: &str,
    context: &SanitizeContext<'_>,
) -> Result<Value, SanitizeError> {
    if field.starts_with(TIME_PREFIX) && schema.knows(field) {
        let normalized = normalize_time(field, raw, context.timezone)?;
        return schema.sanitize(field, &Value::String(normalized));
    }
    schema.sanitize(field, &Value::String(raw.to_string()))
}

/// Lenient timestamp to canonical UTC text.
pub fn normalize_time(field: &str, raw: &str, timezone: &str) -> Result<String, SanitizeError> {
    let invalid = || SanitizeError::InvalidTime {
        key: field.to_string(),
        value: raw.to_string(),
    };

    match parse_fuzzy(raw).ok_or_else(invalid)? {
        ParsedTime::Aware(dt) => Ok(canonical(&dt)),
        ParsedTime::Naive(_) => {
            if parse_offset(timezone).is_none() {
                return Err(SanitizeError::InvalidTimezone(timezone.to_string()));
            }
            let completed = format!("{} {}", raw.trim(), timezone.trim());
            match parse_fuzzy(&completed) {
                Some(ParsedTime::Aware(dt)) => Ok(canonical(&dt)),
                _ => Err(invalid()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(timezone: &str) -> SanitizeContext<'_> {
        SanitizeContext { timezone }
    }

    #[test]
    fn test_naive_time_uses_batch_timezone() {
        let schema = Harmonization::embedded().unwrap();
        let value = sanitize(&schema, "time.source", "2023-01-08 19:01:01", &context("+02:00")).unwrap();
        assert_eq!(value, json!("2023-01-08T17:01:01+00:00"));
    }

    #[test]
    fn test_aware_time_ignores_batch_timezone() {
        let schema = Harmonization::embedded().unwrap();
        let value = sanitize(
            &schema,
            "time.source",
            "2023-01-08T19:01:01-01:00",
            &context("+02:00"),
        )
        .unwrap();
        assert_eq!(value, json!("2023-01-08T20:01:01+00:00"));
    }

    #[test]
    fn test_unparseable_time() {
        let schema = Harmonization::embedded().unwrap();
        let err = sanitize(&schema, "time.source", "yesterday-ish", &context("+00:00")).unwrap_err();
        assert!(matches!(err, SanitizeError::InvalidTime { .. }));
    }

    #[test]
    fn test_malformed_timezone() {
        let schema = Harmonization::embedded().unwrap();
        let err = sanitize(&schema, "time.source", "2023-01-08 19:01", &context("Mars/Olympus")).unwrap_err();
        assert_eq!(err, SanitizeError::InvalidTimezone("Mars/Olympus".into()));
    }

    #[test]
    fn test_other_fields_use_harmonization() {
        let schema = Harmonization::embedded().unwrap();
        assert_eq!(
            sanitize(&schema, "source.asn", "AS64496", &context("+00:00")).unwrap(),
            json!(64496)
        );
        let err = sanitize(&schema, "source.ip", "1270.0.0.1", &context("+00:00")).unwrap_err();
        assert_eq!(err.to_string(), "invalid value '1270.0.0.1' for key 'source.ip'");
    }
}
