use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    schema::Value,
    util::{Result, Status},
};

/// Storage type of a column
///
/// Serialized in lowercase, as the table service spells it
/// (`"int32"`, `"double"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Float,
    Double,
    String,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Uint8 => "uint8",
            ColumnType::Int16 => "int16",
            ColumnType::Uint16 => "uint16",
            ColumnType::Int32 => "int32",
            ColumnType::Uint32 => "uint32",
            ColumnType::Int64 => "int64",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::String => "string",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::Uint8
                | ColumnType::Int16
                | ColumnType::Uint16
                | ColumnType::Int32
                | ColumnType::Uint32
                | ColumnType::Int64
        )
    }

    /// Check whether `value` can be stored in a column of this type
    ///
    /// Integers are range-checked against the column width. Floating point
    /// columns also take integers.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ColumnType::Boolean, Value::Bool(_)) => true,
            (ColumnType::String, Value::String(_)) => true,
            (ColumnType::Float | ColumnType::Double, Value::Float(_) | Value::Int(_)) => true,
            (ColumnType::Uint8, Value::Int(v)) => u8::try_from(*v).is_ok(),
            (ColumnType::Int16, Value::Int(v)) => i16::try_from(*v).is_ok(),
            (ColumnType::Uint16, Value::Int(v)) => u16::try_from(*v).is_ok(),
            (ColumnType::Int32, Value::Int(v)) => i32::try_from(*v).is_ok(),
            (ColumnType::Uint32, Value::Int(v)) => u32::try_from(*v).is_ok(),
            (ColumnType::Int64, Value::Int(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = Status;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "boolean" => Ok(ColumnType::Boolean),
            "uint8" => Ok(ColumnType::Uint8),
            "int16" => Ok(ColumnType::Int16),
            "uint16" => Ok(ColumnType::Uint16),
            "int32" => Ok(ColumnType::Int32),
            "uint32" => Ok(ColumnType::Uint32),
            "int64" => Ok(ColumnType::Int64),
            "float" => Ok(ColumnType::Float),
            "double" => Ok(ColumnType::Double),
            "string" => Ok(ColumnType::String),
            other => Err(Status::invalid_argument(format!(
                "unknown column type '{other}'"
            ))),
        }
    }
}

/// A named, typed column
///
/// The position of a descriptor in its sequence is the column position.
///
/// # Example
///
/// ```ignore
/// use gtable::{ColumnDescriptor, ColumnType};
///
/// let columns = vec![
///     ColumnDescriptor::new("a", ColumnType::String),
///     ColumnDescriptor::new("b", ColumnType::Int32),
/// ];
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,

    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnDescriptor {
    pub fn new<S: Into<String>>(name: S, column_type: ColumnType) -> Self {
        ColumnDescriptor {
            name: name.into(),
            column_type,
        }
    }

    /// Build a descriptor from the textual type name, e.g. `"int32"`
    pub fn parse<S: Into<String>>(name: S, column_type: &str) -> Result<Self> {
        Ok(ColumnDescriptor::new(name, column_type.parse()?))
    }
}

/// Check that every column has a non-empty name and that names are unique
pub fn validate_columns(columns: &[ColumnDescriptor]) -> Result<()> {
    for (i, col) in columns.iter().enumerate() {
        if col.name.is_empty() {
            return Err(Status::schema_conflict(format!(
                "column at position {i} has an empty name"
            )));
        }
        if columns[..i].iter().any(|c| c.name == col.name) {
            return Err(Status::schema_conflict(format!(
                "duplicate column '{}'",
                col.name
            )));
        }
    }
    Ok(())
}
