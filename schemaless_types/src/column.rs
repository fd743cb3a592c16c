//! Column types of the supertable model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes of storage per character of an `NCHAR` value.
pub const NCHAR_BYTES_PER_CHAR: u32 = 4;

/// The concrete scalar type of a column.
///
/// Each literal form of the line protocol maps to exactly one of these; see the type
/// inference table in `schemaless_line_protocol`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// `b` suffix
    TinyInt,
    /// `s` suffix
    SmallInt,
    /// `i` suffix
    Int,
    /// `w` suffix: a 4 byte signed integer kept apart from [`ScalarType::Int`]
    IntW,
    /// `u` suffix
    UInt,
    /// bare integer
    BigInt,
    /// `f` suffix
    Float,
    /// bare decimal
    Double,
    Bool,
    /// `"..."`, width counted in bytes
    Binary,
    /// `L"..."`, width counted in characters
    NChar,
    Timestamp,
}

impl ScalarType {
    /// Storage size of fixed width types, `None` for the variable width string types.
    pub fn fixed_width(&self) -> Option<u32> {
        match self {
            Self::TinyInt | Self::Bool => Some(1),
            Self::SmallInt => Some(2),
            Self::Int | Self::IntW | Self::UInt | Self::Float => Some(4),
            Self::BigInt | Self::Double | Self::Timestamp => Some(8),
            Self::Binary | Self::NChar => None,
        }
    }

    pub fn is_variable_width(&self) -> bool {
        self.fixed_width().is_none()
    }

    /// Bytes needed to store a value of this type whose declared width is `width`.
    pub fn storage_bytes(&self, width: u32) -> u32 {
        match self {
            Self::Binary => width,
            Self::NChar => width.saturating_mul(NCHAR_BYTES_PER_CHAR),
            _ => self.fixed_width().unwrap_or(width),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Int => "INT",
            Self::IntW => "INT_W",
            Self::UInt => "INT UNSIGNED",
            Self::BigInt => "BIGINT",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Bool => "BOOL",
            Self::Binary => "BINARY",
            Self::NChar => "NCHAR",
            Self::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The role a column plays in a supertable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Timestamp,
    Field,
    Tag,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp => f.write_str("timestamp"),
            Self::Field => f.write_str("field"),
            Self::Tag => f.write_str("tag"),
        }
    }
}

/// An owned, typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    IntW(i32),
    UInt(u32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Binary(String),
    NChar(String),
    Timestamp(i64),
}

impl Value {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::TinyInt(_) => ScalarType::TinyInt,
            Self::SmallInt(_) => ScalarType::SmallInt,
            Self::Int(_) => ScalarType::Int,
            Self::IntW(_) => ScalarType::IntW,
            Self::UInt(_) => ScalarType::UInt,
            Self::BigInt(_) => ScalarType::BigInt,
            Self::Float(_) => ScalarType::Float,
            Self::Double(_) => ScalarType::Double,
            Self::Bool(_) => ScalarType::Bool,
            Self::Binary(_) => ScalarType::Binary,
            Self::NChar(_) => ScalarType::NChar,
            Self::Timestamp(_) => ScalarType::Timestamp,
        }
    }
}

/// Renders the value with its type suffix or quoting, so two values render the same only
/// when they have the same type and value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TinyInt(v) => write!(f, "{v}b"),
            Self::SmallInt(v) => write!(f, "{v}s"),
            Self::Int(v) => write!(f, "{v}i"),
            Self::IntW(v) => write!(f, "{v}w"),
            Self::UInt(v) => write!(f, "{v}u"),
            Self::BigInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}f"),
            Self::Double(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Binary(s) => write!(f, "{s:?}"),
            Self::NChar(s) => write!(f, "L{s:?}"),
            Self::Timestamp(v) => write!(f, "{v}b"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(ScalarType::TinyInt.fixed_width(), Some(1));
        assert_eq!(ScalarType::IntW.fixed_width(), Some(4));
        assert_eq!(ScalarType::Double.fixed_width(), Some(8));
        assert!(ScalarType::Binary.is_variable_width());
        assert_eq!(ScalarType::Binary.storage_bytes(14), 14);
        assert_eq!(ScalarType::NChar.storage_bytes(14), 56);
        assert_eq!(ScalarType::Bool.storage_bytes(14), 1);
    }

    #[test]
    fn int_variants_are_distinct() {
        assert_ne!(ScalarType::Int, ScalarType::IntW);
        assert_ne!(ScalarType::Int.name(), ScalarType::IntW.name());
    }

    #[test]
    fn value_rendering_keeps_type() {
        assert_eq!(Value::BigInt(4).to_string(), "4");
        assert_eq!(Value::Int(4).to_string(), "4i");
        assert_eq!(Value::Double(4.0).to_string(), "4.0");
        assert_eq!(Value::NChar("ste".into()).to_string(), r#"L"ste""#);
        assert_eq!(Value::Binary("t3".into()).scalar_type(), ScalarType::Binary);
    }

    #[test]
    fn value_serde() {
        let json = serde_json::to_string(&Value::UInt(7)).unwrap();
        assert_eq!(json, r#"{"type":"uint","value":7}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::UInt(7));
    }
}
