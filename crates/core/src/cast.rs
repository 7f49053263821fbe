//! Explicit `CAST(x AS T)` conversions.
//!
//! Casting is more permissive than implicit coercion: it may narrow (FLOAT to
//! INTEGER) and may fail per value (unparsable strings).

use crate::error::{Error, Result};
use crate::types::ScalarType;
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Casts a single value to `target`.
pub fn cast_value(value: &Value, target: ScalarType) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if value.scalar_type() == Some(target) {
        return Ok(value.clone());
    }
    let converted = match (value, target) {
        (Value::Bytes(b), ScalarType::String) => {
            Some(Value::String(String::from_utf8_lossy(b).into_owned()))
        }
        (v, ScalarType::String) => Some(Value::String(v.to_string())),

        (Value::Float(f), ScalarType::Integer) => float_to_integer(*f),
        (Value::Boolean(b), ScalarType::Integer) => Some(Value::Integer(*b as i64)),
        (Value::String(s), ScalarType::Integer) => s.trim().parse::<i64>().ok().map(Value::Integer),

        (Value::Integer(i), ScalarType::Float) => Some(Value::Float(*i as f64)),
        (Value::String(s), ScalarType::Float) => s.trim().parse::<f64>().ok().map(Value::Float),

        (Value::Integer(i), ScalarType::Boolean) => Some(Value::Boolean(*i != 0)),
        (Value::String(s), ScalarType::Boolean) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Boolean(true)),
            "false" => Some(Value::Boolean(false)),
            _ => None,
        },

        (Value::String(s), ScalarType::Bytes) => Some(Value::Bytes(s.as_bytes().to_vec())),

        (Value::String(s), ScalarType::Date) => parse_date(s).map(Value::Date),
        (Value::Datetime(d), ScalarType::Date) => Some(Value::Date(d.date())),
        (Value::Timestamp(t), ScalarType::Date) => Some(Value::Date(t.date_naive())),

        (Value::String(s), ScalarType::Datetime) => parse_datetime(s).map(Value::Datetime),
        (Value::Date(d), ScalarType::Datetime) => d.and_hms_opt(0, 0, 0).map(Value::Datetime),
        (Value::Timestamp(t), ScalarType::Datetime) => Some(Value::Datetime(t.naive_utc())),

        (Value::String(s), ScalarType::Timestamp) => parse_timestamp(s).map(Value::Timestamp),
        (Value::Date(d), ScalarType::Timestamp) => d
            .and_hms_opt(0, 0, 0)
            .map(|dt| Value::Timestamp(Utc.from_utc_datetime(&dt))),
        (Value::Datetime(d), ScalarType::Timestamp) => {
            Some(Value::Timestamp(Utc.from_utc_datetime(d)))
        }

        _ => None,
    };
    converted.ok_or_else(|| {
        Error::evaluation(format!("Cannot cast {:?} to {}", value, target))
    })
}

fn float_to_integer(f: f64) -> Option<Value> {
    // Rounds half away from zero.
    let rounded = f.round();
    if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64 {
        Some(Value::Integer(rounded as i64))
    } else {
        None
    }
}

/// Parses `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Parses `YYYY-MM-DD[( |T)HH:MM:SS[.f]]`.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Parses an RFC 3339 timestamp, or a civil date/time taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let civil = s
        .strip_suffix(" UTC")
        .or_else(|| s.strip_suffix("+00"))
        .unwrap_or(s);
    parse_datetime(civil).map(|dt| Utc.from_utc_datetime(&dt))
}
