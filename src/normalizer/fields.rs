//! Loosely-typed field access over a JSON object

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};

use super::NormalizeError;
use crate::models::TimestampMs;

/// Values at or above this are taken to be epoch milliseconds already
/// (1e11 seconds is roughly the year 5138).
const MILLIS_THRESHOLD: f64 = 1e11;

/// Latest accepted instant, 9999-12-31T23:59:59.999Z
const MAX_TIMESTAMP_MS: i64 = 253_402_300_799_999;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Borrowed view of one raw record. `null` counts as absent.
pub(crate) struct Record<'a> {
    obj: &'a Map<String, Value>,
}

impl<'a> Record<'a> {
    pub(crate) fn new(value: &'a Value) -> Result<Self, NormalizeError> {
        value
            .as_object()
            .map(|obj| Record { obj })
            .ok_or(NormalizeError::NotAnObject)
    }

    /// First non-null value among `names`
    pub(crate) fn get(&self, names: &[&str]) -> Option<&'a Value> {
        names
            .iter()
            .filter_map(|n| self.obj.get(*n))
            .find(|v| !v.is_null())
    }

    pub(crate) fn required_str(
        &self,
        field: &'static str,
        names: &[&str],
    ) -> Result<&'a str, NormalizeError> {
        match self.get(names) {
            None => Err(NormalizeError::MissingField(field)),
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => Err(invalid(field, other)),
        }
    }

    /// Identifier given either as a string or a number
    pub(crate) fn required_id_string(
        &self,
        field: &'static str,
        names: &[&str],
    ) -> Result<String, NormalizeError> {
        match self.get(names) {
            None => Err(NormalizeError::MissingField(field)),
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(invalid(field, other)),
        }
    }

    /// Unsigned integer given as a number or a numeric string
    pub(crate) fn required_u64(
        &self,
        field: &'static str,
        names: &[&str],
    ) -> Result<u64, NormalizeError> {
        let value = self.get(names).ok_or(NormalizeError::MissingField(field))?;
        as_u64(value).ok_or_else(|| invalid(field, value))
    }

    pub(crate) fn u64_or_default(
        &self,
        field: &'static str,
        names: &[&str],
    ) -> Result<u64, NormalizeError> {
        match self.get(names) {
            None => Ok(0),
            Some(value) => as_u64(value).ok_or_else(|| invalid(field, value)),
        }
    }

    pub(crate) fn f64_or_default(
        &self,
        field: &'static str,
        names: &[&str],
    ) -> Result<f64, NormalizeError> {
        match self.get(names) {
            None => Ok(0.0),
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(field, &Value::Number(n.clone()))),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| NormalizeError::InvalidField {
                field,
                value: s.clone(),
            }),
            Some(other) => Err(invalid(field, other)),
        }
    }

    pub(crate) fn string_or_default(&self, names: &[&str]) -> String {
        self.optional_string(names).unwrap_or_default()
    }

    pub(crate) fn optional_string(&self, names: &[&str]) -> Option<String> {
        match self.get(names)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Booleans, plus the 0/1 integers SQLite-backed services tend to emit
    pub(crate) fn bool_or_default(&self, names: &[&str]) -> bool {
        match self.get(names) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(false),
            Some(Value::String(s)) => matches!(s.trim(), "true" | "1"),
            _ => false,
        }
    }

    pub(crate) fn required_timestamp(
        &self,
        field: &'static str,
        names: &[&str],
    ) -> Result<TimestampMs, NormalizeError> {
        let value = self.get(names).ok_or(NormalizeError::MissingField(field))?;
        timestamp_ms(value).ok_or_else(|| invalid(field, value))
    }

    /// Absent timestamps default to 0; present but unparseable ones are errors
    pub(crate) fn timestamp_or_default(
        &self,
        field: &'static str,
        names: &[&str],
    ) -> Result<TimestampMs, NormalizeError> {
        match self.get(names) {
            None => Ok(0),
            Some(value) => timestamp_ms(value).ok_or_else(|| invalid(field, value)),
        }
    }
}

fn invalid(field: &'static str, value: &Value) -> NormalizeError {
    NormalizeError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Convert a raw timestamp to epoch milliseconds
///
/// Accepts epoch seconds (integer or fractional), epoch milliseconds,
/// numeric strings, RFC 3339 strings and `YYYY-MM-DD HH:MM:SS` strings. The
/// latter carry no offset and are read as UTC.
pub fn timestamp_ms(value: &Value) -> Option<TimestampMs> {
    match value {
        Value::Number(n) => n.as_f64().and_then(number_to_ms),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(f) = s.parse::<f64>() {
                return number_to_ms(f);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return in_range(dt.timestamp_millis());
            }
            NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                .ok()
                .and_then(|dt| in_range(dt.and_utc().timestamp_millis()))
        }
        _ => None,
    }
}

fn number_to_ms(f: f64) -> Option<TimestampMs> {
    if !f.is_finite() {
        return None;
    }
    let ms = if f.abs() >= MILLIS_THRESHOLD { f } else { f * 1000.0 };
    let ms = ms.round();
    if ms < 0.0 || ms > MAX_TIMESTAMP_MS as f64 {
        return None;
    }
    in_range(ms as TimestampMs)
}

/// Instants before the epoch or past year 9999 are not event times
fn in_range(ms: TimestampMs) -> Option<TimestampMs> {
    (0..=MAX_TIMESTAMP_MS).contains(&ms).then_some(ms)
}
