//! Export-wrapper normalization
//!
//! Rewrites MongoDB export date wrappers (`{"$date": "..."}`) into native
//! timestamps anywhere in a parsed JSON tree. The `_id` field's `$oid`
//! wrapper is left alone; the reconciler consumes it.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value as JsonValue};

use crate::document::{Document, Value};
use crate::error::ImportError;

const DATE_WRAPPER: &str = "$date";

/// `YYYY-MM-DDTHH:MM:SS.ffffffZ`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
const MAX_FRACTION_DIGITS: usize = 6;

/// Normalize a parsed JSON value
///
/// Only an object whose single key is `$date` with a string value counts as
/// a date wrapper. Objects with extra keys, or a non-string `$date`, are
/// recursed into like any other object.
pub fn normalize(raw: JsonValue) -> Result<Value, ImportError> {
    match raw {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Bool(b)),
        JsonValue::Number(n) => Ok(Value::Number(n)),
        JsonValue::String(s) => Ok(Value::String(s)),
        JsonValue::Array(items) => items
            .into_iter()
            .map(normalize)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        JsonValue::Object(map) => match date_wrapper(&map) {
            Some(text) => parse_timestamp(text).map(Value::Timestamp),
            None => normalize_object(map).map(Value::Object),
        },
    }
}

fn normalize_object(map: Map<String, JsonValue>) -> Result<Document, ImportError> {
    map.into_iter()
        .map(|(key, value)| Ok((key, normalize(value)?)))
        .collect()
}

fn date_wrapper(map: &Map<String, JsonValue>) -> Option<&str> {
    if map.len() != 1 {
        return None;
    }
    map.get(DATE_WRAPPER)?.as_str()
}

/// Fixed-width `YYYY-MM-DDTHH:MM:SS` prefix; `D` marks an ASCII digit
const DATE_TIME_LAYOUT: &[u8; 19] = b"DDDD-DD-DDTDD:DD:DD";

/// Parse an export timestamp, e.g. `2023-01-01T00:00:00.000Z`, as UTC
///
/// The layout is fixed width: no signs, no padding spaces, seconds below 60.
/// The fractional part (1 to 6 digits) and the literal `Z` are required.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, ImportError> {
    let malformed = |reason: String| ImportError::MalformedTimestamp {
        value: text.to_string(),
        reason,
    };

    let body = text
        .strip_suffix('Z')
        .ok_or_else(|| malformed("missing UTC 'Z' suffix".to_string()))?;
    if !matches_layout(body.as_bytes()) {
        return Err(malformed(
            "expected YYYY-MM-DDTHH:MM:SS.f with ASCII digits".to_string(),
        ));
    }
    // Seconds tens digit; rules out leap second 60
    if body.as_bytes()[17] > b'5' {
        return Err(malformed("second out of range".to_string()));
    }

    let fraction = body.get(DATE_TIME_LAYOUT.len() + 1..).unwrap_or_default();
    if body.as_bytes().get(DATE_TIME_LAYOUT.len()) != Some(&b'.') {
        return Err(malformed("missing fractional seconds".to_string()));
    }
    if fraction.is_empty()
        || fraction.len() > MAX_FRACTION_DIGITS
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(malformed(format!(
            "fractional seconds must be 1 to {} digits",
            MAX_FRACTION_DIGITS
        )));
    }

    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| malformed(e.to_string()))
}

fn matches_layout(body: &[u8]) -> bool {
    body.len() >= DATE_TIME_LAYOUT.len()
        && DATE_TIME_LAYOUT
            .iter()
            .zip(body)
            .all(|(&expected, &actual)| match expected {
                b'D' => actual.is_ascii_digit(),
                _ => actual == expected,
            })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn contains_date_wrapper(value: &Value) -> bool {
        match value {
            Value::Object(map) => {
                (map.len() == 1 && matches!(map.get(DATE_WRAPPER), Some(Value::String(_))))
                    || map.values().any(contains_date_wrapper)
            }
            Value::Array(items) => items.iter().any(contains_date_wrapper),
            _ => false,
        }
    }

    #[test]
    fn test_scalars_unchanged() {
        assert_eq!(normalize(json!(null)).unwrap(), Value::Null);
        assert_eq!(normalize(json!(true)).unwrap(), Value::Bool(true));
        assert_eq!(normalize(json!(4.5)).unwrap(), Value::Number(serde_json::Number::from_f64(4.5).unwrap()));
        assert_eq!(normalize(json!("x")).unwrap(), Value::String("x".to_string()));
    }

    #[test]
    fn test_field_date_wrapper_becomes_timestamp() {
        let value = normalize(json!({ "created": { "$date": "2023-01-01T00:00:00.000Z" } })).unwrap();

        let expected = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(value.as_object().unwrap()["created"], Value::Timestamp(expected));
    }

    #[test]
    fn test_nested_wrappers_at_any_depth() {
        let raw = json!({
            "a": { "b": [ { "c": { "$date": "2021-06-15T12:30:45.123456Z" } } ] },
            "list": [ { "$date": "2020-02-29T23:59:59.9Z" }, 1, "two" ],
            "plain": { "deeper": { "deepest": { "$date": "1999-12-31T23:59:59.000Z" } } }
        });

        let value = normalize(raw).unwrap();

        assert!(!contains_date_wrapper(&value));
        let list = match &value.as_object().unwrap()["list"] {
            Value::Array(items) => items,
            other => panic!("expected array, got {:?}", other),
        };
        assert_eq!(list.len(), 3);
        assert_eq!(
            list[0],
            Value::Timestamp(Utc.with_ymd_and_hms(2020, 2, 29, 23, 59, 59).unwrap() + chrono::Duration::milliseconds(900))
        );
    }

    #[test]
    fn test_root_wrapper_becomes_timestamp() {
        let value = normalize(json!({ "$date": "2023-01-01T00:00:00.000Z" })).unwrap();
        assert!(matches!(value, Value::Timestamp(_)));
    }

    #[test]
    fn test_field_order_preserved() {
        let raw: JsonValue = serde_json::from_str(r#"{"zeta":1,"alpha":2,"mid":{"y":1,"b":2}}"#).unwrap();

        let value = normalize(raw).unwrap();

        let map = value.as_object().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        let mid = map["mid"].as_object().unwrap();
        assert_eq!(mid.keys().collect::<Vec<_>>(), vec!["y", "b"]);
    }

    #[test]
    fn test_partial_wrapper_is_left_as_object() {
        let value = normalize(json!({
            "when": { "$date": "2023-01-01T00:00:00.000Z", "tz": "UTC" },
            "numeric": { "$date": 1672531200000i64 }
        }))
        .unwrap();

        let map = value.as_object().unwrap();
        let when = map["when"].as_object().unwrap();
        assert_eq!(when["$date"], Value::String("2023-01-01T00:00:00.000Z".to_string()));
        assert_eq!(when["tz"], Value::String("UTC".to_string()));
        assert!(matches!(map["numeric"].as_object().unwrap()["$date"], Value::Number(_)));
    }

    #[test]
    fn test_oid_wrapper_untouched() {
        let value = normalize(json!({ "_id": { "$oid": "507f1f77bcf86cd799439011" } })).unwrap();

        let id = value.as_object().unwrap()["_id"].as_object().unwrap();
        assert_eq!(id["$oid"].as_str(), Some("507f1f77bcf86cd799439011"));
    }

    #[test]
    fn test_malformed_timestamp_propagates() {
        let err = normalize(json!([{ "ok": 1 }, { "bad": { "$date": "yesterday" } }])).unwrap_err();

        match err {
            ImportError::MalformedTimestamp { value, .. } => assert_eq!(value, "yesterday"),
            other => panic!("expected MalformedTimestamp, got {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_shape_rules() {
        assert!(parse_timestamp("2023-01-01T00:00:00.000Z").is_ok());
        assert!(parse_timestamp("2023-01-01T00:00:00.1Z").is_ok());
        assert!(parse_timestamp("2023-01-01T00:00:00.123456Z").is_ok());

        // fraction required, at most six digits
        assert!(parse_timestamp("2023-01-01T00:00:00Z").is_err());
        assert!(parse_timestamp("2023-01-01T00:00:00.Z").is_err());
        assert!(parse_timestamp("2023-01-01T00:00:00.1234567Z").is_err());
        // literal Z required
        assert!(parse_timestamp("2023-01-01T00:00:00.000+00:00").is_err());
        assert!(parse_timestamp("2023-01-01T00:00:00.000").is_err());
        // calendar must be valid
        assert!(parse_timestamp("2023-02-30T00:00:00.000Z").is_err());
        assert!(parse_timestamp("2023-01-01 00:00:00.000Z").is_err());
        // fixed width digits only, no padding or signs
        assert!(parse_timestamp(" 2023-01-01T00:00:00.000Z").is_err());
        assert!(parse_timestamp("2023-01-01T 0:00:00.000Z").is_err());
        assert!(parse_timestamp("2023-01-01T00:00: 0.000Z").is_err());
        assert!(parse_timestamp("+2023-01-01T00:00:00.000Z").is_err());
        assert!(parse_timestamp("2023-1-01T00:00:00.000Z").is_err());
        // no leap seconds
        assert!(parse_timestamp("2023-01-01T00:00:60.000Z").is_err());
        assert!(parse_timestamp("2023-01-01T00:00:59.999Z").is_ok());
    }

    #[test]
    fn test_layout_failure_is_malformed_timestamp() {
        let err = parse_timestamp(" 2023-01-01T00:00:00.000Z").unwrap_err();
        assert!(matches!(
            err,
            ImportError::MalformedTimestamp { ref value, .. } if value == " 2023-01-01T00:00:00.000Z"
        ));
    }

    #[test]
    fn test_microsecond_precision_kept() {
        let ts = parse_timestamp("2021-06-15T12:30:45.123456Z").unwrap();
        assert_eq!(ts.timestamp_subsec_micros(), 123456);
    }
}
