//! Value types of harmonized fields.
//!
//! Each type normalises a raw value (`sanitize`) or rejects it. Raw values
//! usually arrive as JSON strings straight from a CSV cell.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;

use super::taxonomy;
use super::time::{canonical, parse_fuzzy, ParsedTime};

static FQDN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-z0-9_](?:[a-z0-9_-]{0,61}[a-z0-9_])?\.)*[a-z0-9_](?:[a-z0-9_-]{0,61}[a-z0-9_])?$")
        .expect("fqdn pattern is valid")
});

const TLP_LEVELS: &[&str] = &["RED", "AMBER+STRICT", "AMBER", "GREEN", "WHITE", "CLEAR"];
const REGISTRIES: &[&str] = &["AFRINIC", "APNIC", "ARIN", "LACNIC", "RIPE"];

/// Type of a harmonized field, as named in the harmonization file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    String,
    LowercaseString,
    UppercaseString,
    #[serde(rename = "IPAddress")]
    IpAddress,
    #[serde(rename = "IPNetwork")]
    IpNetwork,
    Integer,
    #[serde(rename = "ASN")]
    Asn,
    Float,
    Accuracy,
    Boolean,
    DateTime,
    #[serde(rename = "FQDN")]
    Fqdn,
    #[serde(rename = "URL")]
    Url,
    ClassificationType,
    ClassificationTaxonomy,
    #[serde(rename = "TLP")]
    Tlp,
    Registry,
    Base64,
    #[serde(rename = "JSONDict")]
    JsonDict,
}

impl FieldType {
    /// Normalise a value, or `None` if it is malformed for this type.
    pub fn sanitize(&self, value: &Value) -> Option<Value> {
        match self {
            FieldType::String => non_empty_text(value).map(Value::String),
            FieldType::LowercaseString => {
                non_empty_text(value).map(|s| Value::String(s.to_lowercase()))
            }
            FieldType::UppercaseString => {
                non_empty_text(value).map(|s| Value::String(s.to_uppercase()))
            }
            FieldType::IpAddress => {
                let ip: IpAddr = text(value)?.trim().parse().ok()?;
                Some(Value::String(ip.to_string()))
            }
            FieldType::IpNetwork => sanitize_network(&text(value)?).map(Value::String),
            FieldType::Integer => integer(value).map(Value::from),
            FieldType::Asn => sanitize_asn(value).map(Value::from),
            FieldType::Float => float(value).and_then(float_value),
            FieldType::Accuracy => float(value)
                .filter(|f| (0.0..=100.0).contains(f))
                .and_then(float_value),
            FieldType::Boolean => boolean(value).map(Value::Bool),
            FieldType::DateTime => {
                let dt = match parse_fuzzy(&text(value)?)? {
                    ParsedTime::Aware(dt) => dt,
                    ParsedTime::Naive(naive) => naive.and_utc().fixed_offset(),
                };
                Some(Value::String(canonical(&dt)))
            }
            FieldType::Fqdn => sanitize_fqdn(&text(value)?).map(Value::String),
            FieldType::Url => sanitize_url(&text(value)?).map(Value::String),
            FieldType::ClassificationType => {
                let t = text(value)?.trim().to_lowercase();
                taxonomy::is_classification_type(&t).then_some(Value::String(t))
            }
            FieldType::ClassificationTaxonomy => {
                let t = text(value)?.trim().to_lowercase();
                taxonomy::is_taxonomy(&t).then_some(Value::String(t))
            }
            FieldType::Tlp => sanitize_tlp(&text(value)?).map(Value::String),
            FieldType::Registry => sanitize_registry(&text(value)?).map(Value::String),
            FieldType::Base64 => non_empty_text(value).map(|s| Value::String(sanitize_base64(&s))),
            FieldType::JsonDict => json_dict(value).map(Value::Object),
        }
    }

    /// Name as used in the harmonization file.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "String",
            FieldType::LowercaseString => "LowercaseString",
            FieldType::UppercaseString => "UppercaseString",
            FieldType::IpAddress => "IPAddress",
            FieldType::IpNetwork => "IPNetwork",
            FieldType::Integer => "Integer",
            FieldType::Asn => "ASN",
            FieldType::Float => "Float",
            FieldType::Accuracy => "Accuracy",
            FieldType::Boolean => "Boolean",
            FieldType::DateTime => "DateTime",
            FieldType::Fqdn => "FQDN",
            FieldType::Url => "URL",
            FieldType::ClassificationType => "ClassificationType",
            FieldType::ClassificationTaxonomy => "ClassificationTaxonomy",
            FieldType::Tlp => "TLP",
            FieldType::Registry => "Registry",
            FieldType::Base64 => "Base64",
            FieldType::JsonDict => "JSONDict",
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Scalar as text; objects, arrays and null have no text form.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty_text(value: &Value) -> Option<String> {
    text(value).filter(|s| !s.trim().is_empty())
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float(value: &Value) -> Option<f64> {
    let f = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}

fn float_value(f: f64) -> Option<Value> {
    serde_json::Number::from_f64(f).map(Value::Number)
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Some(true),
            "false" | "0" | "no" | "n" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn sanitize_asn(value: &Value) -> Option<i64> {
    let number = match value {
        Value::String(s) => {
            let s = s.trim();
            let digits = match s.get(..2) {
                Some(prefix) if prefix.eq_ignore_ascii_case("as") => &s[2..],
                _ => s,
            };
            digits.parse::<i64>().ok()?
        }
        other => integer(other)?,
    };
    (1..=4_294_967_295).contains(&number).then_some(number)
}

fn sanitize_network(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let (addr, prefix) = match raw.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (raw, None),
    };
    let ip: IpAddr = addr.trim().parse().ok()?;
    let max = if ip.is_ipv4() { 32 } else { 128 };
    let prefix: u8 = match prefix {
        Some(p) => p.trim().parse().ok()?,
        None => max,
    };
    (prefix <= max).then(|| format!("{}/{}", ip, prefix))
}

fn sanitize_fqdn(raw: &str) -> Option<String> {
    let fqdn = raw.trim().trim_end_matches('.').to_lowercase();
    if fqdn.is_empty() || fqdn.len() > 253 || fqdn.parse::<IpAddr>().is_ok() {
        return None;
    }
    FQDN_RE.is_match(&fqdn).then_some(fqdn)
}

fn sanitize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    let parsed = url::Url::parse(&with_scheme).ok()?;
    parsed.host_str()?;
    Some(with_scheme)
}

fn sanitize_tlp(raw: &str) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    let level = upper
        .strip_prefix("TLP:")
        .or_else(|| upper.strip_prefix("TLP "))
        .unwrap_or(&upper)
        .trim();
    TLP_LEVELS
        .contains(&level)
        .then(|| level.to_string())
}

fn sanitize_registry(raw: &str) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    let registry = match upper.as_str() {
        "RIPENCC" | "RIPE-NCC" | "RIPE NCC" => "RIPE",
        other => other,
    };
    REGISTRIES
        .contains(&registry)
        .then(|| registry.to_string())
}

/// Encoded data is kept as is, anything else gets encoded.
fn sanitize_base64(raw: &str) -> String {
    let trimmed = raw.trim();
    match STANDARD.decode(trimmed) {
        Ok(_) => trimmed.to_string(),
        Err(_) => STANDARD.encode(raw),
    }
}

fn json_dict(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) => match serde_json::from_str(s).ok()? {
            Value::Object(map) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ip_address() {
        let t = FieldType::IpAddress;
        assert_eq!(t.sanitize(&json!(" 127.0.0.1 ")), Some(json!("127.0.0.1")));
        assert_eq!(t.sanitize(&json!("2001:DB8::1")), Some(json!("2001:db8::1")));
        assert_eq!(t.sanitize(&json!("1270.0.0.1")), None);
        assert_eq!(t.sanitize(&json!("127.0.0.1")), Some(json!("127.0.0.1")));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(FieldType::Integer.sanitize(&json!("80")), Some(json!(80)));
        assert_eq!(FieldType::Integer.sanitize(&json!("eighty")), None);
        assert_eq!(FieldType::Asn.sanitize(&json!("AS64496")), Some(json!(64496)));
        assert_eq!(FieldType::Asn.sanitize(&json!("0")), None);
        assert_eq!(FieldType::Float.sanitize(&json!("1.5")), Some(json!(1.5)));
        assert_eq!(FieldType::Accuracy.sanitize(&json!("101")), None);
    }

    #[test]
    fn test_strings_and_case() {
        assert_eq!(FieldType::String.sanitize(&json!("")), None);
        assert_eq!(FieldType::LowercaseString.sanitize(&json!("HTTP")), Some(json!("http")));
        assert_eq!(FieldType::UppercaseString.sanitize(&json!("de")), Some(json!("DE")));
    }

    #[test]
    fn test_fqdn_and_url() {
        assert_eq!(FieldType::Fqdn.sanitize(&json!("Example.COM.")), Some(json!("example.com")));
        assert_eq!(FieldType::Fqdn.sanitize(&json!("example")), Some(json!("example")));
        assert_eq!(FieldType::Fqdn.sanitize(&json!("127.0.0.1")), None);
        assert_eq!(FieldType::Fqdn.sanitize(&json!("bad domain")), None);
        assert_eq!(
            FieldType::Url.sanitize(&json!("http://example.com/")),
            Some(json!("http://example.com/"))
        );
        assert_eq!(
            FieldType::Url.sanitize(&json!("example.com/path")),
            Some(json!("http://example.com/path"))
        );
    }

    #[test]
    fn test_enumerations() {
        assert_eq!(FieldType::Tlp.sanitize(&json!("tlp:amber")), Some(json!("AMBER")));
        assert_eq!(FieldType::Registry.sanitize(&json!("ripencc")), Some(json!("RIPE")));
        assert_eq!(
            FieldType::ClassificationType.sanitize(&json!("Phishing")),
            Some(json!("phishing"))
        );
        assert_eq!(FieldType::ClassificationType.sanitize(&json!("fishing")), None);
    }

    #[test]
    fn test_datetime_assumes_utc_without_offset() {
        assert_eq!(
            FieldType::DateTime.sanitize(&json!("2023-06-29 08:44:22")),
            Some(json!("2023-06-29T08:44:22+00:00"))
        );
        assert_eq!(
            FieldType::DateTime.sanitize(&json!("2023-06-29T08:44:22+00:00")),
            Some(json!("2023-06-29T08:44:22+00:00"))
        );
    }

    #[test]
    fn test_misc() {
        assert_eq!(FieldType::Boolean.sanitize(&json!("Yes")), Some(json!(true)));
        assert_eq!(FieldType::Boolean.sanitize(&json!("maybe")), None);
        assert_eq!(
            FieldType::IpNetwork.sanitize(&json!("198.18.0.0/15")),
            Some(json!("198.18.0.0/15"))
        );
        assert_eq!(FieldType::IpNetwork.sanitize(&json!("10.0.0.0/33")), None);
        assert_eq!(
            FieldType::JsonDict.sanitize(&json!("{\"a\": 1}")),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn test_base64_keeps_encoded_and_encodes_raw_text() {
        let t = FieldType::Base64;
        assert_eq!(
            t.sanitize(&json!(" RXhhbXBsZSBEYXRhIG9ubHkK ")),
            Some(json!("RXhhbXBsZSBEYXRhIG9ubHkK"))
        );
        assert_eq!(t.sanitize(&json!("hello world")), Some(json!("aGVsbG8gd29ybGQ=")));
        assert_eq!(t.sanitize(&json!("abc")), Some(json!("YWJj")));
        assert_eq!(t.sanitize(&json!("  ")), None);
    }

    #[test]
    fn test_type_names_round_trip_through_serde() {
        let t: FieldType = serde_json::from_value(json!("IPAddress")).unwrap();
        assert_eq!(t, FieldType::IpAddress);
        assert_eq!(t.name(), "IPAddress");
    }
}
