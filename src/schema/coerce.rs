//! Converting incoming JSON or form strings to the native shape of a field kind.

use crate::config::FieldKind;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// RFC 3339, `YYYY-MM-DD[T ]HH:MM:SS[.f]` (taken as UTC) or a bare date (midnight UTC).
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(n) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(n.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// Primary-key reference: an integer, or its decimal string when it came from a form.
pub fn coerce_id(v: &Value, from_form: bool) -> Result<Value, String> {
    match v {
        Value::Number(n) if n.is_i64() => Ok(v.clone()),
        Value::String(s) if from_form => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| "must be an integer id".to_string()),
        _ => Err("must be an integer id".to_string()),
    }
}

/// Non-null input to the JSON shape the column expects. Datetimes are normalized to RFC 3339.
pub fn coerce(kind: FieldKind, v: &Value, from_form: bool) -> Result<Value, String> {
    match (kind, v) {
        (FieldKind::Integer, Value::Number(n)) if n.is_i64() => Ok(v.clone()),
        (FieldKind::Integer, Value::String(s)) if from_form => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| "not a valid integer".to_string()),
        (FieldKind::Integer, _) => Err("not a valid integer".to_string()),

        (FieldKind::Text | FieldKind::Password, Value::String(_)) => Ok(v.clone()),
        (FieldKind::Text | FieldKind::Password, _) => Err("not a valid string".to_string()),

        (FieldKind::Boolean, Value::Bool(_)) => Ok(v.clone()),
        (FieldKind::Boolean, Value::String(s)) if from_form => parse_bool(s)
            .map(Value::Bool)
            .ok_or_else(|| "not a valid boolean".to_string()),
        (FieldKind::Boolean, _) => Err("not a valid boolean".to_string()),

        (FieldKind::Datetime, Value::String(s)) => parse_datetime(s)
            .map(|d| Value::String(d.to_rfc3339()))
            .ok_or_else(|| "not a valid datetime".to_string()),
        (FieldKind::Datetime, _) => Err("not a valid datetime".to_string()),

        (FieldKind::File, _) => Err("must be uploaded as a file".to_string()),
    }
}
