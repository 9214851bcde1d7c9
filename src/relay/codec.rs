// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Canonical JSON encoding for hashed and signed structures.
//!
//! Servicers recompute the request hash and the proof hash from the bytes
//! they receive, so every structure that is hashed or signed goes through
//! this encoder:
//!
//! - object keys are emitted in lexicographic (byte) order
//! - no insignificant whitespace
//! - numbers must be integers and are rendered without exponent
//! - strings are UTF-8 with the minimal JSON escape set
//!
//! The hash is SHA-256 of the canonical bytes.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Errors produced while canonicalising a value.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Non-integer number cannot be canonically encoded: {0}")]
    NonIntegerNumber(String),

    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode `value` into its canonical JSON byte form.
pub fn canonical_encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    let value = serde_json::to_value(value)?;
    let mut out = Vec::with_capacity(256);
    write_value(&value, &mut out)?;
    Ok(out)
}

/// SHA-256 over the canonical encoding of `value`.
pub fn canonical_hash<T: Serialize + ?Sized>(value: &T) -> Result<[u8; 32], CodecError> {
    let bytes = canonical_encode(value)?;
    Ok(Sha256::digest(&bytes).into())
}

/// Lowercase hex of [`canonical_hash`].
pub fn canonical_hash_hex<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    canonical_hash(value).map(hex::encode)
}

/// Rewrite a JSON text into canonical form.
///
/// Text that is not JSON, or that carries numbers the canonical form cannot
/// represent, is returned untouched: upstream RPC bodies stay opaque unless
/// they can be normalised losslessly.
pub fn normalize_json_text(text: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return text.to_string();
    };
    let mut out = Vec::with_capacity(text.len());
    match write_value(&value, &mut out) {
        Ok(()) => String::from_utf8(out).unwrap_or_else(|_| text.to_string()),
        Err(_) => text.to_string(),
    }
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                write!(out, "{i}")?;
            } else if let Some(u) = n.as_u64() {
                write!(out, "{u}")?;
            } else {
                return Err(CodecError::NonIntegerNumber(n.to_string()));
            }
        }
        Value::String(s) => serde_json::to_writer(&mut *out, s)?,
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_value(item, out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode_str(value: &Value) -> String {
        String::from_utf8(canonical_encode(value).unwrap()).unwrap()
    }

    #[test]
    fn keys_are_sorted_recursively() {
        let value = json!({"z": {"b": 1, "a": [ {"y": true, "x": null} ]}, "a": "s"});
        assert_eq!(
            encode_str(&value),
            r#"{"a":"s","z":{"a":[{"x":null,"y":true}],"b":1}}"#
        );
    }

    #[test]
    fn input_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":2,"c":{"e":5,"d":4}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{ "c" : {"d":4,"e":5}, "a":2, "b":1 }"#).unwrap();
        assert_eq!(canonical_encode(&a).unwrap(), canonical_encode(&b).unwrap());
        assert_eq!(canonical_hash(&a).unwrap(), canonical_hash(&b).unwrap());
    }

    #[test]
    fn large_integers_render_without_exponent() {
        let value = json!({"n": u64::MAX, "m": -42});
        assert_eq!(encode_str(&value), r#"{"m":-42,"n":18446744073709551615}"#);
    }

    #[test]
    fn floats_are_rejected() {
        let err = canonical_encode(&json!({"f": 1.5})).unwrap_err();
        assert!(matches!(err, CodecError::NonIntegerNumber(_)));
    }

    #[test]
    fn strings_use_minimal_escapes() {
        let value = json!({"s": "line\n\"quoted\" / é \u{0001}"});
        assert_eq!(
            encode_str(&value),
            "{\"s\":\"line\\n\\\"quoted\\\" / é \\u0001\"}"
        );
    }

    #[test]
    fn hash_is_sha256_of_encoding() {
        let value = json!({"a": 1});
        let expected: [u8; 32] = Sha256::digest(br#"{"a":1}"#).into();
        assert_eq!(canonical_hash(&value).unwrap(), expected);
        assert_eq!(canonical_hash_hex(&value).unwrap(), hex::encode(expected));
    }

    #[test]
    fn normalize_json_text_canonicalises_json() {
        assert_eq!(
            normalize_json_text(r#"{"b":1, "a":2}"#),
            normalize_json_text(r#"{"a":2,"b":1}"#)
        );
        assert_eq!(normalize_json_text(r#"{"b":1, "a":2}"#), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn normalize_json_text_leaves_opaque_bodies_alone() {
        assert_eq!(normalize_json_text("not json"), "not json");
        assert_eq!(
            normalize_json_text(r#"{"price": 1.25}"#),
            r#"{"price": 1.25}"#
        );
    }
}
