//! Values exchanged with database drivers.
//!
//! Every binding passed to a connection and every column read back from it
//! is a [`Value`]. Result rows are ordered maps from column name to value.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A result row: column name to value, in select order.
pub type Row = IndexMap<String, Value>;

/// A SQL value that can be used as a parameter or read from a row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer payload, accepting booleans as 0/1.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Returns the float payload, widening integers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Returns the text payload.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean payload, accepting integers as SQLite stores them.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(n) => Some(*n != 0),
            _ => None,
        }
    }

    /// Compares two values the way they compare once stored: a boolean
    /// equals the integer 0 or 1 it is written as.
    #[must_use]
    pub fn same_stored(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(b), Self::Int(n)) | (Self::Int(n), Self::Bool(b)) => i64::from(*b) == *n,
            _ => self == other,
        }
    }

    /// Returns the value as a hashable key, if it can identify a row.
    ///
    /// Only integers, text and blobs qualify; booleans collapse to integers
    /// the way SQLite stores them.
    #[must_use]
    pub fn key(&self) -> Option<Key> {
        match self {
            Self::Int(n) => Some(Key::Int(*n)),
            Self::Bool(b) => Some(Key::Int(i64::from(*b))),
            Self::Text(s) => Some(Key::Text(s.clone())),
            Self::Blob(b) => Some(Key::Bytes(b.clone())),
            Self::Null | Self::Float(_) => None,
        }
    }

    /// Returns the SQL representation for inline use (escaped).
    ///
    /// Only used where a dialect cannot take a parameter, such as column
    /// defaults in DDL.
    #[must_use]
    pub fn to_sql_inline(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Bool(true) => String::from("TRUE"),
            Self::Bool(false) => String::from("FALSE"),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// A hashable identity derived from a [`Value`].
///
/// Used to group rows by primary or foreign key during relation matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Integer key.
    Int(i64),
    /// Text key.
    Text(String),
    /// Binary key.
    Bytes(Vec<u8>),
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Int(n) => Self::Int(n),
            Key::Text(s) => Self::Text(s),
            Key::Bytes(b) => Self::Blob(b),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(n) => Self::from(*n),
            Value::Float(f) => Self::from(*f),
            Value::Text(s) => Self::String(s.clone()),
            Value::Blob(b) => Self::Array(b.iter().map(|byte| Self::from(*byte)).collect()),
        }
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Self::Int(i64::from(n))
                }
            }
        )*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Self::Float(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(String::from(s))
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Blob(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::Text(dt.to_rfc3339())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Self::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Text(d.format("%Y-%m-%d").to_string())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_escaping() {
        assert_eq!(Value::from("O'Brien").to_sql_inline(), "'O''Brien'");
        assert_eq!(Value::Null.to_sql_inline(), "NULL");
        assert_eq!(Value::Blob(vec![0xde, 0xad]).to_sql_inline(), "X'DEAD'");
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn test_same_stored() {
        assert!(Value::Bool(true).same_stored(&Value::Int(1)));
        assert!(Value::Int(0).same_stored(&Value::Bool(false)));
        assert!(!Value::Bool(true).same_stored(&Value::Int(2)));
        assert!(!Value::Int(1).same_stored(&Value::from("1")));
    }

    #[test]
    fn test_keys() {
        assert_eq!(Value::Int(3).key(), Some(Key::Int(3)));
        assert_eq!(Value::Bool(true).key(), Some(Key::Int(1)));
        assert_eq!(Value::Null.key(), None);
        assert_eq!(Value::Float(1.5).key(), None);
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::Value::from(&Value::Text("a".into()));
        assert_eq!(json, serde_json::json!("a"));
        assert_eq!(serde_json::Value::from(&Value::Null), serde_json::Value::Null);
    }

    #[test]
    fn test_untagged_serde() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 3, 1.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(3),
                Value::Float(1.5),
                Value::Text("x".into())
            ]
        );
    }
}
