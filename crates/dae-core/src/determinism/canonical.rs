//! Canonical JSON encoding.
//!
//! Keys are emitted in byte order regardless of how the source map was
//! ordered, strings use `serde_json`'s minimal escaping, and numbers use
//! `serde_json`'s shortest round-trip formatting. Two values that compare
//! equal always encode to identical bytes. Non-finite floats are rejected
//! rather than written as `null`.

use std::fmt::{self, Write as _};

use serde::Serialize;
use serde::ser::{self, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Maximum nesting depth accepted by the encoder.
pub const MAX_DEPTH: usize = 128;

/// Errors that can occur during canonical encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CanonicalError {
    /// The value could not be converted into a JSON tree.
    #[error("value is not JSON-serializable: {message}")]
    Serialize {
        /// Description of the serializer failure.
        message: String,
    },

    /// The value contains NaN or an infinity.
    #[error("non-finite number {value} has no JSON representation")]
    NonFiniteNumber {
        /// The offending value, as text.
        value: String,
    },

    /// The value nests deeper than [`MAX_DEPTH`].
    #[error("max depth exceeded: value nested deeper than {max_depth} levels")]
    MaxDepthExceeded {
        /// The depth limit that was exceeded.
        max_depth: usize,
    },
}

/// Converts any serializable value into a JSON tree.
///
/// # Errors
///
/// - [`CanonicalError::NonFiniteNumber`] if any float is NaN or infinite
/// - [`CanonicalError::Serialize`] if serialization fails (for example a map
///   with non-string keys)
pub fn canonical_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, CanonicalError> {
    value.serialize(FiniteFloats).map_err(|err| match err {
        WalkError::NonFinite(value) => CanonicalError::NonFiniteNumber {
            value: value.to_string(),
        },
        WalkError::Custom(message) => CanonicalError::Serialize { message },
    })?;
    serde_json::to_value(value).map_err(|e| CanonicalError::Serialize {
        message: e.to_string(),
    })
}

/// Encodes a serializable value as canonical JSON bytes.
///
/// # Errors
///
/// Returns [`CanonicalError`] if the value cannot be serialized or nests
/// deeper than [`MAX_DEPTH`].
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let tree = canonical_value(value)?;
    let mut out = String::new();
    emit_value(&tree, &mut out, 0)?;
    Ok(out.into_bytes())
}

fn emit_value(value: &Value, out: &mut String, depth: usize) -> Result<(), CanonicalError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalError::MaxDepthExceeded {
            max_depth: MAX_DEPTH,
        });
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        },
        Value::String(s) => emit_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                emit_value(item, out, depth + 1)?;
            }
            out.push(']');
        },
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                emit_string(key, out);
                out.push(':');
                emit_value(item, out, depth + 1)?;
            }
            out.push('}');
        },
    }
    Ok(())
}

fn emit_string(s: &str, out: &mut String) {
    // Serializing a &str cannot fail.
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => out.push_str("\"\""),
    }
}

#[derive(Debug)]
enum WalkError {
    NonFinite(f64),
    Custom(String),
}

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite(value) => write!(f, "non-finite number {value}"),
            Self::Custom(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for WalkError {}

impl ser::Error for WalkError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

/// Serializer that only visits values, failing on the first non-finite
/// float. `serde_json` would otherwise encode those as `null`.
#[derive(Clone, Copy)]
struct FiniteFloats;

fn finite(value: f64) -> Result<(), WalkError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(WalkError::NonFinite(value))
    }
}

impl Serializer for FiniteFloats {
    type Ok = ();
    type Error = WalkError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_i16(self, _: i16) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_i32(self, _: i32) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_i64(self, _: i64) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_i128(self, _: i128) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_u8(self, _: u8) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_u16(self, _: u16) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_u32(self, _: u32) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_u64(self, _: u64) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_u128(self, _: u128) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<(), WalkError> {
        finite(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<(), WalkError> {
        finite(v)
    }

    fn serialize_char(self, _: char) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_str(self, _: &str) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_bytes(self, _: &[u8]) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_none(self) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), WalkError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<(), WalkError> {
        Ok(())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<(), WalkError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Result<(), WalkError> {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self, WalkError> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self, WalkError> {
        Ok(self)
    }

    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, WalkError> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, WalkError> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self, WalkError> {
        Ok(self)
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, WalkError> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, WalkError> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloats {
    type Ok = ();
    type Error = WalkError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), WalkError> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), WalkError> {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloats {
    type Ok = ();
    type Error = WalkError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), WalkError> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), WalkError> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloats {
    type Ok = ();
    type Error = WalkError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), WalkError> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), WalkError> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloats {
    type Ok = ();
    type Error = WalkError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), WalkError> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), WalkError> {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = WalkError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), WalkError> {
        key.serialize(*self)
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), WalkError> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), WalkError> {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = WalkError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> Result<(), WalkError> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), WalkError> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = WalkError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> Result<(), WalkError> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), WalkError> {
        Ok(())
    }
}

#[cfg(test)]
mod unit_tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_keys_sorted_recursively() {
        let value = json!({"b": {"z": 1, "a": 2}, "a": [3, {"y": 0, "x": 1}]});
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(bytes, br#"{"a":[3,{"x":1,"y":0}],"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn test_hashmap_order_irrelevant() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for key in ["delta", "alpha", "charlie", "bravo"] {
            first.insert(key, 1);
        }
        for key in ["bravo", "charlie", "alpha", "delta"] {
            second.insert(key, 1);
        }
        assert_eq!(
            canonical_json(&first).unwrap(),
            canonical_json(&second).unwrap()
        );
    }

    #[test]
    fn test_floats_stable() {
        let bytes = canonical_json(&json!({"delta": 0.005, "amount": 10050.0})).unwrap();
        assert_eq!(bytes, br#"{"amount":10050.0,"delta":0.005}"#);
    }

    #[test]
    fn test_non_finite_floats_rejected() {
        let nan: HashMap<&str, f64> = HashMap::from([("delta", f64::NAN)]);
        assert_eq!(
            canonical_json(&nan),
            Err(CanonicalError::NonFiniteNumber {
                value: "NaN".to_string()
            })
        );

        let nested = vec![Some(1.5_f32), None, Some(f32::INFINITY)];
        assert_eq!(
            canonical_value(&nested),
            Err(CanonicalError::NonFiniteNumber {
                value: "inf".to_string()
            })
        );
        assert_eq!(canonical_json(&[1.5_f64, -0.25]).unwrap(), b"[1.5,-0.25]");
    }

    #[test]
    fn test_string_escaping() {
        let bytes = canonical_json(&json!({"msg": "quote \" and \n newline"})).unwrap();
        assert_eq!(bytes, br#"{"msg":"quote \" and \n newline"}"#);
    }

    #[test]
    fn test_depth_limit() {
        let mut value = json!(1);
        for _ in 0..=MAX_DEPTH {
            value = json!([value]);
        }
        assert_eq!(
            canonical_json(&value),
            Err(CanonicalError::MaxDepthExceeded {
                max_depth: MAX_DEPTH
            })
        );
    }
}
