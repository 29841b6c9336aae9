//! Cell values and declared storage types.
//!
//! `Value` is the unit of exchange between the compiler (parameters and
//! inlined literals), the result cursor (cells) and entity records (fields).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared storage type of an entity field or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Int,
    Float,
    Decimal,
    Text,
    Bytes,
    Date,
    Timestamp,
}

impl DataType {
    /// Whether values of this type are compared as text (LIKE, concatenation).
    pub fn is_textual(&self) -> bool {
        matches!(self, DataType::Text)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Float | DataType::Decimal)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Decimal => "decimal",
            DataType::Text => "text",
            DataType::Bytes => "bytes",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// A single typed cell value.
///
/// Decimal, date and timestamp values travel as their canonical text form;
/// the executor binding a parameter is responsible for the native conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(String),
    Timestamp(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Storage type inferred from the value itself. `None` for NULL.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(DataType::Bool),
            Value::Int(_) => Some(DataType::Int),
            Value::Float(_) => Some(DataType::Float),
            Value::Decimal(_) => Some(DataType::Decimal),
            Value::Text(_) => Some(DataType::Text),
            Value::Bytes(_) => Some(DataType::Bytes),
            Value::Date(_) => Some(DataType::Date),
            Value::Timestamp(_) => Some(DataType::Timestamp),
        }
    }

    /// Short name of the variant, used in conversion diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
        }
    }

    /// Key fragment used when comparing primary keys across rows.
    ///
    /// Two values produce the same key fragment iff they compare equal,
    /// with the exception that floats compare by bit pattern.
    pub(crate) fn key_fragment(&self) -> KeyPart {
        match self {
            Value::Null => KeyPart::Null,
            Value::Bool(b) => KeyPart::Int(*b as i64),
            Value::Int(n) => KeyPart::Int(*n),
            Value::Float(f) => KeyPart::Bits(f.to_bits()),
            Value::Decimal(s) | Value::Text(s) | Value::Date(s) | Value::Timestamp(s) => {
                KeyPart::Text(s.clone())
            }
            Value::Bytes(b) => KeyPart::Bytes(b.clone()),
        }
    }
}

/// Hashable projection of a `Value`, used for row identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyPart {
    Null,
    Int(i64),
    Bits(u64),
    Text(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Decimal(s) => f.write_str(s),
            Value::Text(s) => write!(f, "\"{}\"", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Date(s) | Value::Timestamp(s) => write!(f, "'{}'", s),
        }
    }
}

// =============================================================================
// Conversions into Value
// =============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

// =============================================================================
// Conversions out of Value
// =============================================================================

/// A cell could not be converted into the requested Rust type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("expected {expected}, found {found}")]
pub struct ConversionError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl ConversionError {
    pub fn new(expected: &'static str, found: &Value) -> Self {
        Self {
            expected,
            found: found.kind(),
        }
    }
}

/// Decode a `Value` into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(b),
            // 1/0 booleans come back as integers on T-SQL and MySQL
            Value::Int(n) => Ok(n != 0),
            other => Err(ConversionError::new("bool", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Int(n) => Ok(n),
            Value::Bool(b) => Ok(b as i64),
            other => Err(ConversionError::new("int", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Int(n) => i32::try_from(n).map_err(|_| ConversionError {
                expected: "i32",
                found: "int out of range",
            }),
            other => Err(ConversionError::new("int", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Float(x) => Ok(x),
            Value::Int(n) => Ok(n as f64),
            Value::Decimal(ref s) => s
                .parse::<f64>()
                .map_err(|_| ConversionError::new("float", &value)),
            other => Err(ConversionError::new("float", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Text(s) | Value::Decimal(s) | Value::Date(s) | Value::Timestamp(s) => Ok(s),
            other => Err(ConversionError::new("text", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(ConversionError::new("bytes", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
