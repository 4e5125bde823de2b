//! Core value and parameter types shared by every engine.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A value crossing the boundary between plugin code and a native driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    Uuid(Uuid),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Short name of the variant, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Uuid(_) => "uuid",
        }
    }
}

macro_rules! int_into_db_value {
    ($($t:ty),*) => {
        $(impl From<$t> for DbValue {
            fn from(v: $t) -> Self {
                Self::Int(i64::from(v))
            }
        })*
    };
}

int_into_db_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f32> for DbValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl From<&[u8]> for DbValue {
    fn from(v: &[u8]) -> Self {
        Self::Blob(v.to_vec())
    }
}

impl From<Uuid> for DbValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Parameter type as declared by plugin code when registering a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Float,
    Double,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Bool,
    Uuid,
    Bytes,
    Other,
}

/// Engine-neutral native parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeType {
    VarChar,
    Float,
    Int32,
    Int64,
    Bit,
    Guid,
    Binary,
    Blob,
    Decimal,
    Temporal,
    Opaque,
}

impl NativeType {
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int32 | Self::Int64 | Self::Float | Self::Decimal)
    }
}

/// Native parameter descriptor built for one named SQL parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeParam {
    pub name: String,
    pub native_type: NativeType,
    pub size: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    /// True when the type came from a live table schema rather than the
    /// declared parameter type.
    pub from_schema: bool,
}

impl NativeParam {
    pub fn declared(name: impl Into<String>, native_type: NativeType) -> Self {
        Self {
            name: name.into(),
            native_type,
            size: None,
            precision: None,
            scale: None,
            from_schema: false,
        }
    }
}

// ── Rows ────────────────────────────────────────────────────────────────

/// One result row handed to a row callback.
///
/// Column names are shared between all rows of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<DbValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<DbValue>) -> Self {
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[DbValue] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> Option<&DbValue> {
        self.values.get(idx)
    }

    /// Case-insensitive column lookup.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn value(&self, column: &str) -> Option<&DbValue> {
        self.index_of(column).and_then(|i| self.values.get(i))
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.value(column).and_then(DbValue::as_str)
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        self.value(column).and_then(DbValue::as_i64)
    }

    pub fn blob(&self, column: &str) -> Option<&[u8]> {
        self.value(column).and_then(DbValue::as_bytes)
    }
}
