//! Value model for the Mica object store
//!
//! One unified enum covers every storable cell value. Different variants are
//! never equal, even when numerically equivalent: `Int(1) != Double(1.0)`.
//! Float equality follows IEEE-754 (`NaN != NaN`, `-0.0 == 0.0`).

use crate::types::{ColumnType, ObjKey};
use serde::{Deserialize, Serialize};

/// A single cell value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Null (legal only in nullable columns)
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit double
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Binary(Vec<u8>),
    /// Link to an object; the target table comes from the column schema
    Link(ObjKey),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // IEEE-754: NaN != NaN, -0.0 == 0.0
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Link(a), Value::Link(b)) => a == b,
            // Different types are never equal
            _ => false,
        }
    }
}

impl Value {
    /// Type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Double(_) => "Double",
            Value::String(_) => "String",
            Value::Binary(_) => "Binary",
            Value::Link(_) => "Link",
        }
    }

    /// Whether this is the null value
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The column type this value belongs to, or None for null
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Bool),
            Value::Int(_) => Some(ColumnType::Int),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Double(_) => Some(ColumnType::Double),
            Value::String(_) => Some(ColumnType::String),
            Value::Binary(_) => Some(ColumnType::Binary),
            Value::Link(_) => Some(ColumnType::Link),
        }
    }

    /// Whether this value can be stored in a column of the given shape
    pub fn fits(&self, ty: ColumnType, nullable: bool) -> bool {
        match self {
            Value::Null => nullable || ty == ColumnType::Link,
            _ => self.column_type() == Some(ty),
        }
    }

    /// Extract an integer, if this is one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract a bool, if this is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract a string slice, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract the link target, if this is a link
    pub fn as_link(&self) -> Option<ObjKey> {
        match self {
            Value::Link(k) => Some(*k),
            _ => None,
        }
    }

    /// Numeric view used by aggregation: integers widen to i64, floats
    /// promote to double. Non-numeric values return None.
    pub fn as_double_lossy(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<ObjKey> for Value {
    fn from(v: ObjKey) -> Self {
        Value::Link(v)
    }
}
