//! sre_common
//!
//! SHA-256 hashing + deterministic JSON serialization utilities.
//! This exists to guarantee determinism for:
//! - audit record output hashes
//! - evidence artifact hashes
//! - index files that must diff cleanly across runs
//!
//! IMPORTANT: Index JSON is pretty-printed with sorted keys; hashes are
//! computed over the exact bytes that were written.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonError {
    #[error("failed to serialize json: {0}")]
    Json(#[from] serde_json::Error),
}

/// SHA-256 hex digest of UTF-8 text.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Serialize to compact JSON bytes with stable key ordering.
pub fn sorted_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, JsonError> {
    let v = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&sort_json_value(v))?)
}

/// Serialize to pretty JSON bytes with stable key ordering.
/// Used for everything under `index/` so reruns produce byte-stable files.
pub fn sorted_pretty_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, JsonError> {
    let v = serde_json::to_value(value)?;
    let mut bytes = serde_json::to_vec_pretty(&sort_json_value(v))?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn sort_json_value(v: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k, sort_json_value(v));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_json_value).collect()),
        other => other,
    }
}

/// ISO-8601 UTC timestamp, second precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Time-sortable session id (UTC), e.g. `20260801_142233`.
pub fn new_session_id() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Obj {
        b: u32,
        a: u32,
    }

    #[test]
    fn sha256_hex_is_stable() {
        // Known vector: sha256("abc")
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_hex("abc"), sha256_hex("abc"));
    }

    #[test]
    fn sorted_bytes_ignore_field_order() {
        let x = serde_json::json!({"b": 2, "a": 1});
        let y = Obj { b: 2, a: 1 };
        assert_eq!(
            sorted_json_bytes(&x).unwrap(),
            sorted_json_bytes(&serde_json::to_value(&y).unwrap()).unwrap()
        );
    }

    #[test]
    fn pretty_bytes_are_sorted_and_newline_terminated() {
        let v = serde_json::json!({"z": 1, "a": {"d": 1, "c": 2}});
        let s = String::from_utf8(sorted_pretty_json_bytes(&v).unwrap()).unwrap();
        assert!(s.find("\"a\"").unwrap() < s.find("\"z\"").unwrap());
        assert!(s.find("\"c\"").unwrap() < s.find("\"d\"").unwrap());
        assert!(s.ends_with('\n'));
    }

    #[test]
    fn session_id_is_time_sortable_shape() {
        let id = new_session_id();
        assert_eq!(id.len(), 15);
        assert_eq!(id.as_bytes()[8], b'_');
    }
}
