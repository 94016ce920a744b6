//! Column types, values, and default expressions.

use crate::Lit;
use std::fmt;

/// Postgres column types used by the tracker schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PgType {
    /// SMALLINT
    SmallInt,
    /// INTEGER
    Integer,
    /// BIGINT
    BigInt,
    /// SERIAL (auto-incrementing INTEGER)
    Serial,
    /// BIGSERIAL (auto-incrementing BIGINT)
    BigSerial,
    /// DOUBLE PRECISION
    DoublePrecision,
    /// BOOLEAN
    Boolean,
    /// TEXT
    Text,
    /// VARCHAR(n)
    Varchar(u32),
    /// TIMESTAMP (without time zone)
    Timestamp,
    /// TIMESTAMPTZ
    Timestamptz,
    /// DATE
    Date,
    /// JSON
    Json,
}

impl PgType {
    /// Whether values of this type are assigned from a sequence when omitted.
    pub fn is_serial(&self) -> bool {
        matches!(self, PgType::Serial | PgType::BigSerial)
    }

    /// The `data_type` reported by `information_schema.columns`.
    pub fn information_schema_name(&self) -> &'static str {
        match self {
            PgType::SmallInt => "smallint",
            PgType::Integer | PgType::Serial => "integer",
            PgType::BigInt | PgType::BigSerial => "bigint",
            PgType::DoublePrecision => "double precision",
            PgType::Boolean => "boolean",
            PgType::Text => "text",
            PgType::Varchar(_) => "character varying",
            PgType::Timestamp => "timestamp without time zone",
            PgType::Timestamptz => "timestamp with time zone",
            PgType::Date => "date",
            PgType::Json => "json",
        }
    }

    /// Whether `value` can be stored in a column of this type.
    ///
    /// Temporal and JSON columns take their textual representation.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (
                PgType::SmallInt
                | PgType::Integer
                | PgType::BigInt
                | PgType::Serial
                | PgType::BigSerial,
                Value::Int(_),
            ) => true,
            (PgType::DoublePrecision, Value::Int(_) | Value::Float(_)) => true,
            (PgType::Boolean, Value::Bool(_)) => true,
            (PgType::Varchar(max), Value::Text(s)) => s.chars().count() <= *max as usize,
            (
                PgType::Text
                | PgType::Timestamp
                | PgType::Timestamptz
                | PgType::Date
                | PgType::Json,
                Value::Text(_),
            ) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgType::SmallInt => write!(f, "SMALLINT"),
            PgType::Integer => write!(f, "INTEGER"),
            PgType::BigInt => write!(f, "BIGINT"),
            PgType::Serial => write!(f, "SERIAL"),
            PgType::BigSerial => write!(f, "BIGSERIAL"),
            PgType::DoublePrecision => write!(f, "DOUBLE PRECISION"),
            PgType::Boolean => write!(f, "BOOLEAN"),
            PgType::Text => write!(f, "TEXT"),
            PgType::Varchar(n) => write!(f, "VARCHAR({})", n),
            PgType::Timestamp => write!(f, "TIMESTAMP"),
            PgType::Timestamptz => write!(f, "TIMESTAMPTZ"),
            PgType::Date => write!(f, "DATE"),
            PgType::Json => write!(f, "JSON"),
        }
    }
}

/// A scalar SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Compare two values the way Postgres would, `None` when either side
    /// is NULL or the types are not comparable.
    pub fn sql_cmp(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Text(s) => write!(f, "{}", Lit(s)),
            Value::Bool(true) => write!(f, "TRUE"),
            Value::Bool(false) => write!(f, "FALSE"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Default value expression for a column.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultExpr {
    /// A constant.
    Value(Value),
    /// `now()`
    Now,
}

impl fmt::Display for DefaultExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultExpr::Value(v) => write!(f, "{}", v),
            DefaultExpr::Now => write!(f, "now()"),
        }
    }
}
