//! Content digests over canonical JSON.
//!
//! Object keys are emitted in sorted order, integer-valued floats collapse to
//! integers, and the compact encoding is hashed with SHA-256. Two values that
//! differ only in key order or in `1.0` vs `1` share a digest.

use serde::Serialize;
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

use crate::domain::error::Result;

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 && f.abs() < 9e15 => {
                Value::Number(Number::from(f as i64))
            }
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

/// Render `value` as canonical compact JSON.
pub fn canonical_json(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(&canonicalize(value))?)
}

/// SHA-256 hex digest of the canonical JSON form of `value`.
pub fn content_digest<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_value(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&json)?.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
