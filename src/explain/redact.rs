//! Output redaction.
//!
//! Every serializer output passes through [`redact_value`] before emission:
//! any object property whose name contains one of the sensitive fragments
//! (case-insensitive substring match, deliberately not word-bounded) has
//! its value replaced with `"[REDACTED]"`. Effective parameter documents
//! additionally have **all** leaves blanked via [`redact_all_leaves`].

use serde_json::{Map, Value};

pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_KEY_FRAGMENTS: [&str; 9] = [
    "token",
    "password",
    "secret",
    "api_key",
    "apikey",
    "authorization",
    "cookie",
    "credential",
    "session",
];

/// Case-insensitive substring match against the sensitive-key list.
#[must_use]
pub fn key_is_sensitive(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

/// Replace the value of every sensitively-named property, at any depth.
#[must_use]
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, member) in map {
                let redacted = if key_is_sensitive(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    redact_value(member)
                };
                out.insert(key.clone(), redacted);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}

/// Keep object structure, blank every leaf (scalars, arrays, nulls).
#[must_use]
pub fn redact_all_leaves(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, member) in map {
                out.insert(key.clone(), redact_all_leaves(member));
            }
            Value::Object(out)
        }
        _ => Value::String(REDACTED.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_substring_match_is_case_insensitive() {
        assert!(key_is_sensitive("ApiKey"));
        assert!(key_is_sensitive("x_session_id"));
        assert!(key_is_sensitive("AUTHORIZATION"));
        assert!(!key_is_sensitive("rate_limit"));
        // Substring matching is deliberate: this matches even mid-word.
        assert!(key_is_sensitive("tokens_per_second"));
    }

    #[test]
    fn test_redact_nested_and_arrays() {
        let value = json!({
            "password": "hunter2",
            "nested": {"api_key": 42, "plain": 1},
            "list": [{"cookie": "c"}]
        });
        let redacted = redact_value(&value);
        assert_eq!(redacted["password"], REDACTED);
        assert_eq!(redacted["nested"]["api_key"], REDACTED);
        assert_eq!(redacted["nested"]["plain"], 1);
        assert_eq!(redacted["list"][0]["cookie"], REDACTED);
    }

    #[test]
    fn test_redact_all_leaves_keeps_shape() {
        let value = json!({"a": 1, "b": {"c": [1, 2]}});
        let redacted = redact_all_leaves(&value);
        assert_eq!(redacted, json!({"a": REDACTED, "b": {"c": REDACTED}}));
    }
}
