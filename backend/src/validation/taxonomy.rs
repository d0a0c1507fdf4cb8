//! Classification taxonomy: top-level categories and their event types.

use std::collections::BTreeMap;

/// Taxonomy name to the classification types it contains.
pub const TAXONOMY: &[(&str, &[&str])] = &[
    ("abusive-content", &["spam", "harmful-speech", "violence"]),
    (
        "malicious-code",
        &[
            "infected-system",
            "c2-server",
            "malware-distribution",
            "malware-configuration",
        ],
    ),
    (
        "information-gathering",
        &["scanner", "sniffing", "social-engineering"],
    ),
    ("intrusion-attempts", &["ids-alert", "brute-force", "exploit"]),
    (
        "intrusions",
        &[
            "privileged-account-compromise",
            "unprivileged-account-compromise",
            "application-compromise",
            "system-compromise",
            "burglary",
        ],
    ),
    ("availability", &["ddos", "dos", "outage", "sabotage"]),
    (
        "information-content-security",
        &[
            "unauthorised-information-access",
            "unauthorised-information-modification",
            "data-loss",
            "data-leak",
        ],
    ),
    (
        "fraud",
        &[
            "unauthorized-use-of-resources",
            "copyright",
            "masquerade",
            "phishing",
        ],
    ),
    (
        "vulnerable",
        &[
            "weak-crypto",
            "ddos-amplifier",
            "potentially-unwanted-accessible",
            "information-disclosure",
            "vulnerable-system",
        ],
    ),
    ("other", &["other", "undetermined"]),
    ("test", &["test"]),
];

/// The taxonomy a classification type belongs to.
pub fn taxonomy_of(classification_type: &str) -> Option<&'static str> {
    TAXONOMY
        .iter()
        .find(|(_, types)| types.contains(&classification_type))
        .map(|(taxonomy, _)| *taxonomy)
}

pub fn is_classification_type(value: &str) -> bool {
    taxonomy_of(value).is_some()
}

pub fn is_taxonomy(value: &str) -> bool {
    TAXONOMY.iter().any(|(taxonomy, _)| *taxonomy == value)
}

/// The taxonomy as an owned map, for display and the HTTP API.
pub fn taxonomy_map() -> BTreeMap<&'static str, Vec<&'static str>> {
    TAXONOMY
        .iter()
        .map(|(taxonomy, types)| (*taxonomy, types.to_vec()))
        .collect()
}
