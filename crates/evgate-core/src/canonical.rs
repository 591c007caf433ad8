//! # Canonical Serialization — JCS-Compatible Byte Production
//!
//! This module defines `CanonicalBytes`, the sole construction path for bytes
//! used in structured-data digest computation across the evidence engine.
//! The manifest builder and the verifier both hash through it, so there is
//! exactly one canonicalization implementation in the workspace.
//!
//! ## Security Invariant
//!
//! The `CanonicalBytes` newtype has a private inner field. The only ways to
//! construct it are [`CanonicalBytes::new()`] and
//! [`CanonicalBytes::from_value()`], both of which apply the full
//! normalization pipeline before JCS serialization. Any function requiring
//! canonical bytes for digest computation accepts `&CanonicalBytes`.
//!
//! ## Rules
//!
//! 1. **Reject non-finite numbers.** NaN and ±Infinity fail explicitly.
//!    `serde_json` would otherwise turn them into `null`, so typed input is
//!    probed before it is converted to a JSON value.
//! 2. **NFC-normalize strings.** Keys and string values are normalized to
//!    Unicode NFC. Two keys of one object that normalize to the same string
//!    are rejected.
//! 3. **Bound nesting.** Structures deeper than [`MAX_DEPTH`] are rejected.
//! 4. **Sort keys, preserve arrays.** Serialization uses `serde_jcs`:
//!    object keys sorted recursively by Unicode code point, array order
//!    untouched, compact separators, no whitespace. Code-point order matches
//!    RFC 8785's UTF-16 order for every key below U+E000; keys containing
//!    astral characters can sort differently than in other RFC 8785
//!    implementations.
//!
//! Finite floats are accepted and rendered with the RFC 8785 number rules.

use serde::ser::{self, Serialize};
use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;

use crate::error::CanonicalizationError;

/// Maximum nesting depth accepted by the canonicalizer.
pub const MAX_DEPTH: usize = 128;

/// Bytes produced exclusively by JCS canonicalization with the normalization
/// rules above.
///
/// # Invariants
///
/// - The only constructors are `CanonicalBytes::new()` and `from_value()`.
/// - No NaN or infinite numbers.
/// - Every string is NFC-normalized.
/// - Object keys are sorted at every depth, arrays keep their order.
/// - Output is minified UTF-8 JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::NonFiniteNumber` if the value contains
    /// NaN or an infinity, `DuplicateKey` if NFC normalization merges two keys,
    /// `DepthExceeded` past [`MAX_DEPTH`], and `SerializationFailed` if
    /// `serde_json` rejects the value.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        reject_non_finite(obj)?;
        let value = serde_json::to_value(obj)?;
        Self::from_value(value)
    }

    /// Construct canonical bytes from an already-parsed JSON value.
    ///
    /// A `serde_json::Value` cannot hold non-finite numbers, so only the
    /// normalization and depth rules apply.
    pub fn from_value(value: Value) -> Result<Self, CanonicalizationError> {
        let mut path = Vec::new();
        let normalized = normalize_value(value, &mut path)?;
        let s = serde_jcs::to_string(&normalized)?;
        Ok(Self(s.into_bytes()))
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// View the canonical bytes as a string. Canonical output is always UTF-8.
    pub fn as_str(&self) -> &str {
        // serde_jcs produced these bytes from a String.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume and return the inner bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Canonicalize any serializable value.
///
/// Shorthand for [`CanonicalBytes::new()`].
pub fn canonicalize(obj: &impl Serialize) -> Result<CanonicalBytes, CanonicalizationError> {
    CanonicalBytes::new(obj)
}

fn location(path: &[String]) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", path.join("/"))
    }
}

/// Recursively normalize a JSON value: NFC strings, duplicate-key detection,
/// depth bound.
fn normalize_value(value: Value, path: &mut Vec<String>) -> Result<Value, CanonicalizationError> {
    if path.len() > MAX_DEPTH {
        return Err(CanonicalizationError::DepthExceeded {
            location: location(path),
            max: MAX_DEPTH,
        });
    }
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(value),
        Value::String(s) => Ok(Value::String(nfc(s))),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                path.push(i.to_string());
                out.push(normalize_value(item, path)?);
                path.pop();
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let key = nfc(k);
                if out.contains_key(&key) {
                    return Err(CanonicalizationError::DuplicateKey {
                        location: location(path),
                        key,
                    });
                }
                path.push(key.clone());
                let v = normalize_value(v, path)?;
                path.pop();
                out.insert(key, v);
            }
            Ok(Value::Object(out))
        }
    }
}

fn nfc(s: String) -> String {
    if unicode_normalization::is_nfc(&s) {
        s
    } else {
        s.nfc().collect()
    }
}

// ---------------------------------------------------------------------------
// Non-finite probe
// ---------------------------------------------------------------------------

/// Walk a `Serialize` value and fail on the first NaN or infinity.
///
/// Errors raised by the value's own `Serialize` impl are ignored here; the
/// subsequent `serde_json::to_value` call reports them properly.
fn reject_non_finite(obj: &impl Serialize) -> Result<(), CanonicalizationError> {
    let mut probe = FiniteProbe::default();
    match obj.serialize(&mut probe) {
        Ok(()) | Err(ProbeError::Custom(_)) => Ok(()),
        Err(ProbeError::NonFinite { location, value }) => {
            Err(CanonicalizationError::NonFiniteNumber { location, value })
        }
    }
}

#[derive(Debug)]
enum ProbeError {
    NonFinite { location: String, value: String },
    Custom(String),
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFinite { location, value } => {
                write!(f, "non-finite number at {location}: {value}")
            }
            Self::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ProbeError {}

impl ser::Error for ProbeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

#[derive(Default)]
struct FiniteProbe {
    path: Vec<String>,
    indices: Vec<usize>,
    pending_key: Option<String>,
}

impl FiniteProbe {
    fn check(&self, v: f64) -> Result<(), ProbeError> {
        if v.is_finite() {
            Ok(())
        } else {
            Err(ProbeError::NonFinite {
                location: location(&self.path),
                value: v.to_string(),
            })
        }
    }

    fn element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        let idx = self.indices.last().copied().unwrap_or(0);
        self.path.push(idx.to_string());
        let res = value.serialize(&mut *self);
        self.path.pop();
        if let Some(last) = self.indices.last_mut() {
            *last += 1;
        }
        res
    }

    fn field<T: ?Sized + Serialize>(&mut self, key: &str, value: &T) -> Result<(), ProbeError> {
        self.path.push(key.to_string());
        let res = value.serialize(&mut *self);
        self.path.pop();
        res
    }

    fn open_seq(&mut self) -> &mut Self {
        self.indices.push(0);
        self
    }

    fn close_seq(&mut self) {
        self.indices.pop();
    }
}

impl<'a> ser::Serializer for &'a mut FiniteProbe {
    type Ok = ();
    type Error = ProbeError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i8(self, _: i8) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i16(self, _: i16) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i32(self, _: i32) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i64(self, _: i64) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i128(self, _: i128) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u8(self, _: u8) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u16(self, _: u16) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u32(self, _: u32) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u64(self, _: u64) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u128(self, _: u128) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_f32(self, v: f32) -> Result<(), ProbeError> {
        self.check(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> Result<(), ProbeError> {
        self.check(v)
    }
    fn serialize_char(self, _: char) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_str(self, _: &str) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_bytes(self, _: &[u8]) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_none(self) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), ProbeError> {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<(), ProbeError> {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<(), ProbeError> {
        self.field(variant, value)
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self, ProbeError> {
        Ok(self.open_seq())
    }
    fn serialize_tuple(self, _: usize) -> Result<Self, ProbeError> {
        Ok(self.open_seq())
    }
    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, ProbeError> {
        Ok(self.open_seq())
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Self, ProbeError> {
        self.path.push(variant.to_string());
        Ok(self.open_seq())
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self, ProbeError> {
        Ok(self)
    }
    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, ProbeError> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Self, ProbeError> {
        self.path.push(variant.to_string());
        Ok(self)
    }
}

impl<'a> ser::SerializeSeq for &'a mut FiniteProbe {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        self.element(value)
    }
    fn end(self) -> Result<(), ProbeError> {
        self.close_seq();
        Ok(())
    }
}

impl<'a> ser::SerializeTuple for &'a mut FiniteProbe {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        self.element(value)
    }
    fn end(self) -> Result<(), ProbeError> {
        self.close_seq();
        Ok(())
    }
}

impl<'a> ser::SerializeTupleStruct for &'a mut FiniteProbe {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        self.element(value)
    }
    fn end(self) -> Result<(), ProbeError> {
        self.close_seq();
        Ok(())
    }
}

impl<'a> ser::SerializeTupleVariant for &'a mut FiniteProbe {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        self.element(value)
    }
    fn end(self) -> Result<(), ProbeError> {
        self.close_seq();
        self.path.pop();
        Ok(())
    }
}

impl<'a> ser::SerializeMap for &'a mut FiniteProbe {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), ProbeError> {
        let label = match serde_json::to_value(key) {
            Ok(Value::String(s)) => s,
            Ok(other) => other.to_string(),
            Err(_) => "?".to_string(),
        };
        self.pending_key = Some(label);
        Ok(())
    }
    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        let key = self.pending_key.take().unwrap_or_default();
        self.field(&key, value)
    }
    fn end(self) -> Result<(), ProbeError> {
        Ok(())
    }
}

impl<'a> ser::SerializeStruct for &'a mut FiniteProbe {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ProbeError> {
        self.field(key, value)
    }
    fn end(self) -> Result<(), ProbeError> {
        Ok(())
    }
}

impl<'a> ser::SerializeStructVariant for &'a mut FiniteProbe {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ProbeError> {
        self.field(key, value)
    }
    fn end(self) -> Result<(), ProbeError> {
        self.path.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_two_key_object_is_minified_and_sorted() {
        let data = serde_json::json!({"b": 2, "a": 1});
        let cb = CanonicalBytes::new(&data).expect("should canonicalize");
        assert_eq!(cb.as_str(), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn test_canonical_bytes_sorted_keys() {
        let data = serde_json::json!({"z": 1, "m": 2, "a": 3});
        let cb = CanonicalBytes::new(&data).expect("should canonicalize");
        assert_eq!(cb.as_str(), r#"{"a":3,"m":2,"z":1}"#);
    }

    #[test]
    fn test_canonical_bytes_nested() {
        let data = serde_json::json!({
            "outer": {"b": 2, "a": 1},
            "list": [3, 2, 1]
        });
        let cb = CanonicalBytes::new(&data).expect("should canonicalize");
        // Nested objects sorted, array order kept.
        assert_eq!(cb.as_str(), r#"{"list":[3,2,1],"outer":{"a":1,"b":2}}"#);
    }

    #[test]
    fn test_objects_inside_arrays_are_sorted() {
        let data = serde_json::json!([{"y": 1, "x": 2}, {"b": [], "a": null}]);
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_str(), r#"[{"x":2,"y":1},{"a":null,"b":[]}]"#);
    }

    #[test]
    fn test_hash_map_matches_btree_map() {
        let mut hm = HashMap::new();
        let mut bm = BTreeMap::new();
        for (k, v) in [("sbom", 3), ("logs", 1), ("attest", 2), ("zeta", 9)] {
            hm.insert(k, v);
            bm.insert(k, v);
        }
        assert_eq!(
            CanonicalBytes::new(&hm).unwrap(),
            CanonicalBytes::new(&bm).unwrap()
        );
    }

    #[test]
    fn test_nan_rejected_with_location() {
        #[derive(serde::Serialize)]
        struct Metrics {
            name: &'static str,
            ratio: f64,
        }
        let err = CanonicalBytes::new(&Metrics {
            name: "coverage",
            ratio: f64::NAN,
        })
        .unwrap_err();
        match err {
            CanonicalizationError::NonFiniteNumber { location, value } => {
                assert_eq!(location, "/ratio");
                assert_eq!(value, "NaN");
            }
            other => panic!("expected NonFiniteNumber, got: {other}"),
        }
    }

    #[test]
    fn test_infinity_in_nested_sequence_rejected() {
        let mut data: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        data.insert("samples", vec![1.0, 2.5, f64::INFINITY]);
        let err = CanonicalBytes::new(&data).unwrap_err();
        match err {
            CanonicalizationError::NonFiniteNumber { location, .. } => {
                assert_eq!(location, "/samples/2");
            }
            other => panic!("expected NonFiniteNumber, got: {other}"),
        }
    }

    #[test]
    fn test_negative_infinity_f32_rejected() {
        assert!(CanonicalBytes::new(&f32::NEG_INFINITY).is_err());
    }

    #[test]
    fn test_finite_float_accepted() {
        let data = serde_json::json!({"ratio": 1.5});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_str(), r#"{"ratio":1.5}"#);
    }

    #[test]
    fn test_nfc_normalizes_values_and_keys() {
        // "e" + combining acute accent normalizes to U+00E9.
        let decomposed = serde_json::json!({"cafe\u{0301}": "re\u{0301}sume\u{0301}"});
        let composed = serde_json::json!({"caf\u{00e9}": "r\u{00e9}sum\u{00e9}"});
        assert_eq!(
            CanonicalBytes::new(&decomposed).unwrap(),
            CanonicalBytes::new(&composed).unwrap()
        );
    }

    #[test]
    fn test_keys_colliding_after_nfc_rejected() {
        let data = serde_json::json!({"cafe\u{0301}": 1, "caf\u{00e9}": 2});
        let err = CanonicalBytes::new(&data).unwrap_err();
        assert!(matches!(err, CanonicalizationError::DuplicateKey { .. }));
    }

    #[test]
    fn test_depth_limit() {
        let mut v = serde_json::json!(0);
        for _ in 0..(MAX_DEPTH + 5) {
            v = serde_json::json!([v]);
        }
        let err = CanonicalBytes::from_value(v).unwrap_err();
        assert!(matches!(err, CanonicalizationError::DepthExceeded { max: MAX_DEPTH, .. }));
    }

    #[test]
    fn test_depth_at_limit_accepted() {
        let mut v = serde_json::json!(0);
        for _ in 0..MAX_DEPTH {
            v = serde_json::json!([v]);
        }
        assert!(CanonicalBytes::from_value(v).is_ok());
    }

    #[test]
    fn test_array_order_is_significant() {
        let ab = CanonicalBytes::new(&serde_json::json!(["a", "b"])).unwrap();
        let ba = CanonicalBytes::new(&serde_json::json!(["b", "a"])).unwrap();
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_empty_containers() {
        assert_eq!(CanonicalBytes::new(&serde_json::json!({})).unwrap().as_bytes(), b"{}");
        assert_eq!(CanonicalBytes::new(&serde_json::json!([])).unwrap().as_bytes(), b"[]");
    }

    #[test]
    fn test_string_value() {
        let cb = CanonicalBytes::new(&"hello world").expect("string should work");
        assert_eq!(cb.as_bytes(), b"\"hello world\"");
    }

    #[test]
    fn test_enum_variants_probe_cleanly() {
        #[derive(serde::Serialize)]
        enum Outcome {
            Passed { score: f64 },
            Skipped(String),
        }
        assert!(CanonicalBytes::new(&vec![
            Outcome::Passed { score: 0.75 },
            Outcome::Skipped("flaky".into()),
        ])
        .is_ok());
        assert!(CanonicalBytes::new(&Outcome::Passed { score: f64::NAN }).is_err());
    }

    #[test]
    fn test_len_and_is_empty() {
        let cb = CanonicalBytes::new(&serde_json::json!({"a": 1})).unwrap();
        assert!(!cb.is_empty());
        assert_eq!(cb.len(), 7);
    }
}
