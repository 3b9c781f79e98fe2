//! Core types for the DBC comparison library
//!
//! This module defines the error type shared by every fallible operation and the
//! tagged [`Value`] that every compared column is projected to. DBC files mix
//! numeric and string representations freely, so values are resolved into a
//! `Value` once at build time and the diff engine only ever compares typed values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, CompareError>;

/// Errors that can occur while loading or comparing DBC files
///
/// Parse anomalies are never errors: they are recovered and recorded as
/// [`Diagnostic`](crate::model::Diagnostic)s on the database. Only I/O and
/// encoding problems are fatal, and only for the file concerned.
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("Failed to read DBC file {path:?}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("DBC file {path:?} is not valid UTF-8")]
    Encoding { path: PathBuf },

    #[error("Failed to list folder {path:?}: {source}")]
    FolderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a directory: {0:?}")]
    NotADirectory(PathBuf),
}

/// A typed attribute or column value
///
/// Equality is normalized rather than structural:
/// - integral floats equal the matching integer (`100.0 == 100`)
/// - empty text, empty lists and empty tables equal [`Value::Absent`]
/// - an enum label equals a plain text value with the same content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Not present (or explicitly empty)
    #[default]
    Absent,
    /// Integer value (decimal or `0x` hexadecimal in the source)
    Int(i64),
    /// Floating-point value
    Float(f64),
    /// Free text
    Text(String),
    /// Enum label resolved from an `ENUM` attribute definition
    Enum(String),
    /// Ordered list of names (e.g. receiver nodes)
    List(Vec<String>),
    /// Value description table (raw value -> label)
    Table(BTreeMap<i64, String>),
}

impl Value {
    /// Build a text value, mapping the empty string to `Absent`
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Value::Absent
        } else {
            Value::Text(s)
        }
    }

    /// Parse a numeric literal as written in a DBC file (`100`, `-3`, `0x64`, `1.5E-3`)
    pub fn parse_number(raw: &str) -> Option<Self> {
        if let Some(int) = parse_int(raw) {
            return Some(Value::Int(int));
        }
        raw.trim().parse::<f64>().ok().map(Value::Float)
    }

    /// True for `Absent` and anything that normalizes to it
    pub fn is_absent(&self) -> bool {
        matches!(self.normalized(), Value::Absent)
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Canonical form used for comparisons
    pub fn normalized(&self) -> Value {
        match self {
            Value::Text(s) | Value::Enum(s) if s.is_empty() => Value::Absent,
            Value::List(items) if items.is_empty() => Value::Absent,
            Value::Table(table) if table.is_empty() => Value::Absent,
            Value::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => Value::Int(*v as i64),
            other => other.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self.normalized(), other.normalized()) {
            (Value::Absent, Value::Absent) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => a as f64 == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Text(a), Value::Text(b))
            | (Value::Enum(a), Value::Enum(b))
            | (Value::Text(a), Value::Enum(b))
            | (Value::Enum(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => Ok(()),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => match self.normalized() {
                Value::Int(i) => write!(f, "{}", i),
                _ => write!(f, "{}", v),
            },
            Value::Text(s) | Value::Enum(s) => write!(f, "{}", s),
            Value::List(items) => write!(f, "{}", items.join(", ")),
            Value::Table(table) => {
                let entries: Vec<String> = table
                    .iter()
                    .map(|(raw, label)| format!("{}: {}", raw, label))
                    .collect();
                write!(f, "{}", entries.join(", "))
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

/// Parse an integer literal, accepting an optional sign and a `0x` prefix
pub(crate) fn parse_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };

    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<i64>().ok()?
    };

    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_normalization() {
        assert_eq!(Value::parse_number("100"), Value::parse_number("0x64"));
        assert_eq!(Value::Int(100), Value::Float(100.0));
        assert_ne!(Value::Int(100), Value::Float(100.5));
        assert_eq!(Value::parse_number("1.5E-3"), Some(Value::Float(0.0015)));
        assert_eq!(Value::parse_number("-0x10"), Some(Value::Int(-16)));
        assert_eq!(Value::parse_number("abc"), None);
    }

    #[test]
    fn test_absent_equivalence() {
        assert_eq!(Value::Absent, Value::Text(String::new()));
        assert_eq!(Value::Absent, Value::List(Vec::new()));
        assert_eq!(Value::Absent, Value::Table(BTreeMap::new()));
        assert_ne!(Value::Absent, Value::Int(0));
        assert!(Value::text("").is_absent());
    }

    #[test]
    fn test_enum_label_matches_text() {
        assert_eq!(Value::Enum("Cyclic".into()), Value::Text("Cyclic".into()));
        assert_ne!(Value::Enum("Cyclic".into()), Value::Enum("IfActive".into()));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Float(8.0).to_string(), "8");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::List(vec!["A".into(), "B".into()]).to_string(), "A, B");
        let table = BTreeMap::from([(1, "On".to_string()), (0, "Off".to_string())]);
        assert_eq!(Value::Table(table).to_string(), "0: Off, 1: On");
        assert_eq!(Value::Absent.to_string(), "");
    }
}
