//! Dynamic SQL values.

use crate::error::{Error, UnsupportedTypeError};
use serde::{Deserialize, Serialize};

/// A dynamically-typed SQL value.
///
/// Mirrors SQLite's storage classes, plus `Bool` which is stored as an
/// integer 0/1. Used for both parameter binding and result fetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// Boolean value, stored natively as INTEGER 0/1
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit floating point
    Float(f64),

    /// Text string
    Text(String),

    /// Binary data
    Blob(Vec<u8>),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
        }
    }

    /// Try to convert this value to a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Try to convert this value to an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Try to convert this value to an f64.
    ///
    /// Integers beyond 2^53 lose precision.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a byte slice.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

// Conversion implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

fn out_of_range(type_name: &'static str, v: impl std::fmt::Display) -> Error {
    Error::UnsupportedType(UnsupportedTypeError {
        type_name,
        reason: format!(
            "value {} is outside the 64-bit integer range [{}, {}]",
            v,
            i64::MIN,
            i64::MAX
        ),
    })
}

/// SQLite integers are signed 64-bit; larger values are rejected rather
/// than truncated or promoted to REAL.
impl TryFrom<u64> for Value {
    type Error = Error;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| out_of_range("u64", v))
    }
}

impl TryFrom<usize> for Value {
    type Error = Error;

    fn try_from(v: usize) -> Result<Self, Self::Error> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| out_of_range("usize", v))
    }
}

impl TryFrom<i128> for Value {
    type Error = Error;

    fn try_from(v: i128) -> Result<Self, Self::Error> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| out_of_range("i128", v))
    }
}

impl TryFrom<u128> for Value {
    type Error = Error;

    fn try_from(v: u128) -> Result<Self, Self::Error> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| out_of_range("u128", v))
    }
}

/// Scalar JSON values map onto SQL values; arrays and objects are
/// rejected instead of being stringified.
impl TryFrom<serde_json::Value> for Value {
    type Error = Error;

    fn try_from(v: serde_json::Value) -> Result<Self, Self::Error> {
        match v {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::String(s) => Ok(Value::Text(s)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Err(out_of_range("JSON number", u))
                } else {
                    n.as_f64().map(Value::Float).ok_or_else(|| {
                        Error::UnsupportedType(UnsupportedTypeError {
                            type_name: "JSON number",
                            reason: format!("{} is not representable as f64", n),
                        })
                    })
                }
            }
            serde_json::Value::Array(_) => Err(Error::UnsupportedType(UnsupportedTypeError {
                type_name: "JSON array",
                reason: "composite values cannot be bound; serialize explicitly".to_string(),
            })),
            serde_json::Value::Object(_) => Err(Error::UnsupportedType(UnsupportedTypeError {
                type_name: "JSON object",
                reason: "composite values cannot be bound; serialize explicitly".to_string(),
            })),
        }
    }
}

/// Build a `Vec<Value>` of bind parameters from heterogeneous expressions.
///
/// ```
/// use litestmt_core::{params, Value};
///
/// let p = params![1, "two", 3.0, None::<i64>];
/// assert_eq!(p[1], Value::Text("two".into()));
/// assert_eq!(p[3], Value::Null);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($value)),+]
    };
}
