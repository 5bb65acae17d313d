//! Payload redaction.
//!
//! Two modes:
//! - [`RedactionMode::Strict`] replaces every string value with a stable
//!   `{hash, length}` descriptor.
//! - [`RedactionMode::Debug`] truncates strings to a configurable
//!   character limit; sensitive keys are still elided.
//!
//! Regardless of mode, keys that look like secrets become the literal
//! `"[REDACTED]"`, and the handful of prompt/response-shaped fields are
//! always hashed so transcripts never reach disk in the clear.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use serde_json::{Map, Value};

/// How aggressively the sink redacts string payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedactionMode {
    /// Every string value becomes `{hash, length}`.
    Strict,
    /// Strings are truncated; sensitive keys are still elided.
    Debug,
}

/// A stable hash + length descriptor substituted for a redacted string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashedValue {
    /// Hex-encoded SHA-256 of the original string's UTF-8 bytes.
    pub hash: String,
    /// Length of the original string, in UTF-8 bytes.
    pub length: usize,
}

/// Fields whose values are always hashed, even in debug mode, because
/// they tend to carry full prompts/transcripts.
const ALWAYS_HASHED_FIELDS: &[&str] = &[
    "prompt", "response", "messages", "input", "output", "body", "content",
];

/// Substrings that mark a field name as carrying a secret.
const SENSITIVE_SUBSTRINGS: &[&str] = &[
    "api_key",
    "token",
    "secret",
    "password",
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
];

static SENSITIVE_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    let alternation = SENSITIVE_SUBSTRINGS.join("|");
    Regex::new(&format!("(?i)({alternation})")).expect("static redaction pattern is valid")
});

static ENV_STYLE_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(TOKEN|SECRET|PASSWORD|API_KEY)$").expect("valid pattern"));

/// The largest integer magnitude considered safe to carry as a JSON
/// number without precision loss in common downstream consumers.
const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

fn stable_hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn hashed_value(s: &str) -> Value {
    let hashed = HashedValue {
        hash: stable_hash(s),
        length: s.len(),
    };
    serde_json::to_value(hashed).expect("HashedValue always serializes")
}

/// Insert `_` at camelCase boundaries and lowercase the result, so
/// `apiKey` and `api_key` compare equal to the substring patterns.
/// Keys already using `_`/`-` separators (including SCREAMING_CASE
/// env names) pass through unchanged aside from casing.
fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Whether a key name looks like it carries a secret.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = to_snake_case(key);
    SENSITIVE_KEY_RE.is_match(&normalized) || ENV_STYLE_SUFFIX_RE.is_match(key)
}

/// Whether a key is one of the always-hashed prompt/response fields.
pub fn is_always_hashed_field(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    ALWAYS_HASHED_FIELDS.contains(&lower.as_str())
}

/// Tag integers outside the safe-integer range as strings so they
/// survive round-tripping through JSON consumers that use f64.
fn tag_large_integers(value: Value) -> Value {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if i.abs() > MAX_SAFE_INTEGER {
                    return Value::String(i.to_string());
                }
            } else if let Some(u) = n.as_u64() {
                if u > MAX_SAFE_INTEGER as u64 {
                    return Value::String(u.to_string());
                }
            }
            Value::Number(n)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(tag_large_integers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, tag_large_integers(v)))
                .collect(),
        ),
        other => other,
    }
}

fn redact_string(mode: RedactionMode, debug_char_limit: usize, s: &str) -> Value {
    match mode {
        RedactionMode::Strict => hashed_value(s),
        RedactionMode::Debug => {
            if s.chars().count() > debug_char_limit {
                let truncated: String = s.chars().take(debug_char_limit).collect();
                Value::String(format!("{truncated}…"))
            } else {
                Value::String(s.to_owned())
            }
        }
    }
}

fn redact_value(
    value: Value,
    mode: RedactionMode,
    debug_char_limit: usize,
    parent_key_always_hashed: bool,
) -> Value {
    match value {
        Value::String(s) => {
            if parent_key_always_hashed {
                hashed_value(&s)
            } else {
                redact_string(mode, debug_char_limit, &s)
            }
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| redact_value(v, mode, debug_char_limit, parent_key_always_hashed))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                if is_sensitive_key(&key) {
                    out.insert(key, Value::String("[REDACTED]".to_string()));
                    continue;
                }
                let hashed_here = parent_key_always_hashed || is_always_hashed_field(&key);
                out.insert(key, redact_value(val, mode, debug_char_limit, hashed_here));
            }
            Value::Object(out)
        }
        other => other,
    }
}

/// Redact a payload, then tag any out-of-range integers as strings.
///
/// `serde_json::Value` is an owned tree — it cannot encode the cyclic
/// object graphs the original system had to guard against at
/// serialization time, so no sentinel substitution is needed here; the
/// representation itself rules the hazard out.
pub fn redact_payload(payload: &Value, mode: RedactionMode, debug_char_limit: usize) -> Value {
    let redacted = redact_value(payload.clone(), mode, debug_char_limit, false);
    tag_large_integers(redacted)
}

/// If `payload`'s serialized form exceeds `max_bytes`, replace it with
/// `{"truncated": true, "originalLength": N}`.
pub fn enforce_payload_cap(payload: Value, max_bytes: usize) -> Value {
    let serialized = serde_json::to_string(&payload).unwrap_or_default();
    if serialized.len() <= max_bytes {
        return payload;
    }
    serde_json::json!({
        "truncated": true,
        "originalLength": serialized.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_mode_hashes_every_string() {
        let payload = json!({"note": "hello world"});
        let redacted = redact_payload(&payload, RedactionMode::Strict, 100);
        let note = &redacted["note"];
        assert!(note.get("hash").is_some());
        assert_eq!(note["length"], json!(11));
    }

    #[test]
    fn debug_mode_truncates_long_strings() {
        let long = "a".repeat(50);
        let payload = json!({"note": long});
        let redacted = redact_payload(&payload, RedactionMode::Debug, 10);
        let note = redacted["note"].as_str().unwrap();
        assert!(note.chars().count() <= 11); // 10 chars + ellipsis marker
        assert!(note.ends_with('…'));
    }

    #[test]
    fn sensitive_keys_become_redacted_literal_in_both_modes() {
        for mode in [RedactionMode::Strict, RedactionMode::Debug] {
            let payload = json!({
                "apiKey": "x",
                "nested": {"token": "y", "authorization": "Bearer z"},
            });
            let redacted = redact_payload(&payload, mode, 200);
            let s = redacted.to_string();
            assert!(!s.contains('x'));
            assert!(!s.contains('y'));
            assert!(!s.contains("Bearer z"));
            assert_eq!(s.matches("[REDACTED]").count(), 3);
        }
    }

    #[test]
    fn prompt_field_is_hashed_even_in_debug_mode() {
        let payload = json!({"prompt": "hello"});
        let redacted = redact_payload(&payload, RedactionMode::Debug, 1000);
        assert!(redacted["prompt"].get("hash").is_some());
    }

    #[test]
    fn seed_scenario_6_full_redaction() {
        let payload = json!({
            "apiKey": "x",
            "nested": {"token": "y", "authorization": "Bearer z"},
            "prompt": "hello",
        });
        let redacted = redact_payload(&payload, RedactionMode::Strict, 256);
        let s = redacted.to_string();
        assert!(s.contains("[REDACTED]"));
        assert!(redacted["prompt"].get("hash").is_some());
        assert!(!s.contains('x'));
        assert!(!s.contains('y'));
        assert!(!s.contains("Bearer z"));
    }

    #[test]
    fn large_integers_are_tagged_as_strings() {
        let payload = json!({"big": 9_007_199_254_740_999_i64, "small": 42});
        let redacted = redact_payload(&payload, RedactionMode::Debug, 1000);
        assert_eq!(redacted["big"], json!("9007199254740999"));
        assert_eq!(redacted["small"], json!(42));
    }

    #[test]
    fn payload_cap_replaces_oversized_payload() {
        let payload = json!({"blob": "x".repeat(1000)});
        let capped = enforce_payload_cap(payload, 100);
        assert_eq!(capped["truncated"], json!(true));
        assert!(capped["originalLength"].as_u64().unwrap() > 100);
    }

    #[test]
    fn payload_within_cap_is_untouched() {
        let payload = json!({"note": "small"});
        let capped = enforce_payload_cap(payload.clone(), 1000);
        assert_eq!(capped, payload);
    }

    #[test]
    fn env_style_suffix_is_sensitive_even_without_substring_match() {
        assert!(is_sensitive_key("DB_PASSWORD"));
        assert!(is_sensitive_key("GH_TOKEN"));
        assert!(!is_sensitive_key("username"));
    }

    #[test]
    fn camel_case_keys_are_sensitive_too() {
        assert!(is_sensitive_key("apiKey"));
        assert!(is_sensitive_key("apiToken"));
        assert!(is_sensitive_key("xApiKey"));
        assert!(!is_sensitive_key("displayName"));
    }
}
