//! Canonical JSON emission.
//!
//! Every serializer in this crate emits maps with keys in codepoint-sorted
//! order and no insignificant whitespace, so equal documents always produce
//! equal bytes. The params hash is defined over exactly these bytes.

use serde_json::Value;
use std::collections::BTreeMap;

/// Serialize a JSON value canonically: object keys sorted by codepoint,
/// compact separators, `serde_json` string escaping.
#[must_use]
pub fn to_canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Canonical UTF-8 bytes of a JSON value.
#[must_use]
pub fn to_canonical_bytes(value: &Value) -> Vec<u8> {
    to_canonical_string(value).into_bytes()
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Re-key through a BTreeMap so ordering never depends on how
            // the map was built.
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, member)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, member);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    // serde_json's escaping rules, reused rather than re-implemented.
    out.push_str(&serde_json::to_string(s).expect("string serialization is infallible"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_and_compact() {
        let value = json!({"b": {"z": 1, "a": [1, 2]}, "a": "x\"y"});
        assert_eq!(
            to_canonical_string(&value),
            r#"{"a":"x\"y","b":{"a":[1,2],"z":1}}"#
        );
    }

    #[test]
    fn test_idempotent_under_reparse() {
        let value = json!({"m": {"k2": 2, "k1": {"n": null}}, "arr": [{"b": 1, "a": 2}]});
        let first = to_canonical_string(&value);
        let reparsed: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(to_canonical_string(&reparsed), first);
    }
}
