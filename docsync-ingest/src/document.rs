//! Canonical document model
//!
//! Uploaded JSON is parsed into `serde_json::Value` and normalized into
//! [`Value`], a closed variant type that adds a native timestamp. Records are
//! [`Document`]s: field maps that keep insertion order.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{json, Number, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Field name → value, in insertion order
pub type Document = IndexMap<String, Value>;

/// Normalized JSON value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<Value>),
    Object(Document),
}

impl Value {
    pub fn as_object(&self) -> Option<&Document> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Encode as MongoDB Extended JSON
    ///
    /// Timestamps become `{"$date": "<RFC 3339 with microseconds>Z"}`, which
    /// normalizes back to the same timestamp.
    pub fn to_extended_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => JsonValue::Number(n.clone()),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Timestamp(ts) => {
                json!({ "$date": ts.to_rfc3339_opts(SecondsFormat::Micros, true) })
            }
            Value::Array(items) => {
                JsonValue::Array(items.iter().map(Value::to_extended_json).collect())
            }
            Value::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_extended_json()))
                    .collect(),
            ),
        }
    }
}

/// Identifier text that is not 24 hexadecimal characters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid record identifier {0:?}: expected 24 hexadecimal characters")]
pub struct InvalidRecordId(pub String);

/// 12-byte document key, written as 24 lowercase hex characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId([u8; 12]);

impl RecordId {
    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }
}

impl FromStr for RecordId {
    type Err = InvalidRecordId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 24 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidRecordId(s.to_string()));
        }

        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| InvalidRecordId(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_id_parse_and_display() {
        let id: RecordId = "507f1f77bcf86cd799439011".parse().unwrap();
        assert_eq!(id.to_string(), "507f1f77bcf86cd799439011");
        assert_eq!(id.bytes()[0], 0x50);
        assert_eq!(id.bytes()[11], 0x11);
    }

    #[test]
    fn test_record_id_uppercase_displays_lowercase() {
        let id: RecordId = "507F1F77BCF86CD799439011".parse().unwrap();
        assert_eq!(id.to_string(), "507f1f77bcf86cd799439011");
    }

    #[test]
    fn test_record_id_rejects_bad_shapes() {
        for text in [
            "",
            "507f1f77bcf86cd79943901",
            "507f1f77bcf86cd7994390111",
            "507f1f77bcf86cd79943901g",
            "not-an-object-id-at-all!",
            "507f1f77bcf86cd79943901é",
        ] {
            let err = text.parse::<RecordId>().unwrap_err();
            assert_eq!(err, InvalidRecordId(text.to_string()));
        }
    }

    #[test]
    fn test_timestamp_encodes_as_date_wrapper() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let encoded = Value::Timestamp(ts).to_extended_json();
        assert_eq!(encoded, json!({ "$date": "2023-01-01T00:00:00.000000Z" }));
    }

    #[test]
    fn test_nested_encoding_keeps_field_order() {
        let mut inner = Document::new();
        inner.insert("z".to_string(), Value::Bool(true));
        inner.insert("a".to_string(), Value::Null);
        let value = Value::Array(vec![Value::Object(inner), Value::String("x".to_string())]);

        let encoded = serde_json::to_string(&value.to_extended_json()).unwrap();
        assert_eq!(encoded, r#"[{"z":true,"a":null},"x"]"#);
    }
}
