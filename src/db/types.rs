//! Shared type definitions for the backend adapter.

use std::path::PathBuf;

use chrono::NaiveDate;
use rusqlite::types::Value;
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database file not found: {0}")]
    NotFound(PathBuf),
}

/// Render a cell as text. Integral reals lose their fractional part so a
/// flag stored as `1.0` reads as `"1"`.
pub(crate) fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) if f.is_nan() => None,
        Value::Real(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            Some((f as i64).to_string())
        }
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    }
}

pub(crate) fn value_to_f64(value: Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(i as f64),
        Value::Real(f) if f.is_finite() => Some(f),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn value_to_i64(value: Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(i),
        Value::Real(f) if f.is_finite() => Some(f as i64),
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// Parse the date part of a `yyyy-mm-dd[ hh:mm:ss]` cell.
pub(crate) fn value_to_date(value: Value) -> Option<NaiveDate> {
    let text = value_to_string(value)?;
    let date_part = text.trim().get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
