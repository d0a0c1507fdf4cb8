//! Lenient timestamp parsing.
//!
//! Accepts RFC 3339, RFC 2822 and a set of common spreadsheet layouts
//! (ISO-like, German `dd.mm.yyyy`, US `mm/dd/yyyy`, month names), with an
//! optional trailing offset (`Z`, `UTC`, `GMT`, `+02:00`, `+0200`, `-05`).
//! A result without offset is returned as [`ParsedTime::Naive`] so callers
//! can decide on a timezone.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static OFFSET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([+-])(\d{2})(?::?(\d{2}))?$").expect("offset pattern is valid"));

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d %b %Y %H:%M:%S",
    "%b %d %Y %H:%M:%S",
    "%a %b %d %H:%M:%S %Y",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%m/%d/%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d %Y",
    "%B %d, %Y",
];

/// Outcome of a lenient parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTime {
    /// The text carried an offset.
    Aware(DateTime<FixedOffset>),
    /// No offset was present.
    Naive(NaiveDateTime),
}

/// Parse a timezone designator: `Z`, `UTC`, `GMT`, `+HH`, `+HHMM` or `+HH:MM`.
pub fn parse_offset(text: &str) -> Option<FixedOffset> {
    let text = text.trim();
    if ["Z", "UTC", "GMT"]
        .iter()
        .any(|name| text.eq_ignore_ascii_case(name))
    {
        return FixedOffset::east_opt(0);
    }

    let caps = OFFSET_RE.captures(text)?;
    let hours: i32 = caps[2].parse().ok()?;
    let minutes: i32 = match caps.get(3) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    let seconds = hours * 3600 + minutes * 60;
    if &caps[1] == "-" {
        FixedOffset::west_opt(seconds)
    } else {
        FixedOffset::east_opt(seconds)
    }
}

/// Split a trailing timezone designator from a timestamp.
///
/// A numeric designator only counts when it follows whitespace or a time
/// component, so the day of `2023-01-08` is never read as offset `-08`.
fn split_offset(text: &str) -> (&str, Option<FixedOffset>) {
    let upper = text.to_ascii_uppercase();
    for name in ["UTC", "GMT", "Z"] {
        if upper.ends_with(name) {
            let head = &text[..text.len() - name.len()];
            if head.ends_with(|c: char| c.is_ascii_digit() || c.is_whitespace()) {
                return (head.trim_end(), FixedOffset::east_opt(0));
            }
        }
    }

    if let Some(idx) = text.rfind(|c: char| c == '+' || c == '-') {
        let (head, tail) = text.split_at(idx);
        if let Some(offset) = parse_offset(tail) {
            if head.ends_with(char::is_whitespace) || head.contains(':') {
                return (head.trim_end(), Some(offset));
            }
        }
    }

    (text, None)
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Parse a timestamp leniently.
pub fn parse_fuzzy(raw: &str) -> Option<ParsedTime> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(ParsedTime::Aware(dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(ParsedTime::Aware(dt));
    }

    let (head, offset) = split_offset(text);
    let naive = parse_naive(head)?;
    match offset {
        Some(offset) => naive
            .and_local_timezone(offset)
            .single()
            .map(ParsedTime::Aware),
        None => Some(ParsedTime::Naive(naive)),
    }
}

/// Canonical form of a timestamp: UTC, RFC 3339 with `+00:00`.
pub fn canonical(dt: &DateTime<FixedOffset>) -> String {
    dt.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Canonical form of a batch-wide "now", truncated to seconds.
pub fn canonical_now(now: &DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, false)
}
