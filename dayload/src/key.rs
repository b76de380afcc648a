//! Canonical cache keys
//!
//! A query is identified by its name plus its parameters. Object members are
//! emitted in sorted order at every depth so that `{"a":1,"b":2}` and
//! `{"b":2,"a":1}` share a key; arrays keep their order.

use serde_json::Value;
use std::fmt::Write;

/// Build the cache key for `query_key` with optional `params`.
///
/// Absent or `null` params collapse to the bare query name.
pub fn cache_key(query_key: &str, params: Option<&Value>) -> String {
    match params {
        None | Some(Value::Null) => query_key.to_string(),
        Some(params) => {
            let mut key = String::with_capacity(query_key.len() + 16);
            key.push_str(query_key);
            write_canonical(&mut key, params);
            key
        }
    }
}

/// Serialize a JSON value with object keys sorted recursively.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (name, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, name);
                out.push(':');
                write_canonical(out, item);
            }
            out.push('}');
        }
        Value::String(s) => write_string(out, s),
        // scalars already have a single textual form
        other => {
            let _ = write!(out, "{}", other);
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    // serde_json escaping keeps keys identical to JSON.stringify output
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_params_is_bare_query() {
        assert_eq!(cache_key("getX", None), "getX");
        assert_eq!(cache_key("getX", Some(&Value::Null)), "getX");
    }

    #[test]
    fn test_empty_array_is_serialized() {
        assert_eq!(cache_key("getX", Some(&json!([]))), "getX[]");
        assert_eq!(cache_key("getX", Some(&json!({}))), "getX{}");
    }

    #[test]
    fn test_array_params_keep_order() {
        let a = cache_key("sales", Some(&json!(["2024-01-01", 3])));
        let b = cache_key("sales", Some(&json!([3, "2024-01-01"])));
        assert_eq!(a, r#"sales["2024-01-01",3]"#);
        assert_ne!(a, b);
    }

    #[test]
    fn test_object_params_are_order_insensitive() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(cache_key("q", Some(&a)), cache_key("q", Some(&b)));
        assert_eq!(cache_key("q", Some(&a)), r#"q{"a":1,"b":2}"#);
    }

    #[test]
    fn test_nested_objects_sorted() {
        let v = json!({"z": {"y": 1, "x": [ {"b": true, "a": null} ]}, "m": "s"});
        assert_eq!(
            canonical_json(&v),
            r#"{"m":"s","z":{"x":[{"a":null,"b":true}],"y":1}}"#
        );
    }

    #[test]
    fn test_deterministic() {
        let p = json!({"region": "north", "limit": 10});
        assert_eq!(cache_key("top", Some(&p)), cache_key("top", Some(&p)));
    }

    #[test]
    fn test_string_escaping() {
        let p = json!(["a\"b"]);
        assert_eq!(cache_key("q", Some(&p)), r#"q["a\"b"]"#);
    }
}
