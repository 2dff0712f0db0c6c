//! Column types and cell values carried between source and warehouse.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::time::format_timestamp;

/// Declared type class of a column, derived from the backend type name.
///
/// The row transformer picks its fill rule from this class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Timestamp,
    Text,
}

impl ColumnType {
    /// Classify a backend type name (`BIGINT`, `NUMERIC(10,2)`,
    /// `timestamp without time zone`, `WVARCHAR`, ...).
    ///
    /// Numeric types with an explicit zero scale count as integers; other
    /// numeric types are floats. Unknown names fall back to text.
    #[must_use]
    pub fn from_type_name(type_name: &str) -> Self {
        let upper = type_name.trim().to_ascii_uppercase();

        // Time-of-day types carry no date and stay text.
        if upper.starts_with("TIMESTAMP") || upper.starts_with("DATE") {
            return Self::Timestamp;
        }
        if upper.starts_with("BOOL") || upper == "BIT" {
            return Self::Boolean;
        }
        if (upper.contains("INT") && !upper.starts_with("INTERVAL") && upper != "POINT")
            || upper == "SERIAL"
            || upper == "BIGSERIAL"
        {
            return Self::Integer;
        }
        if upper.starts_with("NUMERIC") || upper.starts_with("NUMBER") || upper.starts_with("DECIMAL")
        {
            return if upper.ends_with(",0)") || upper.ends_with(", 0)") {
                Self::Integer
            } else {
                Self::Float
            };
        }
        if upper.starts_with("REAL")
            || upper.starts_with("FLOA")
            || upper.starts_with("DOUB")
            || upper == "MONEY"
            || upper == "CURRENCY"
        {
            return Self::Float;
        }
        Self::Text
    }

    /// Wire-format string for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text rendering used when binding through a text parameter.
    ///
    /// Returns `None` for [`Value::Null`]. Timestamps use the canonical format.
    #[must_use]
    pub fn to_sql_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::Bool(v) => Some(v.to_string()),
            Self::Text(v) => Some(v.clone()),
            Self::Timestamp(ts) => Some(format_timestamp(ts)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Timestamp(ts) => f.write_str(&format_timestamp(ts)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_timestamp;

    #[test]
    fn classifies_netsuite_and_pg_type_names() {
        assert_eq!(ColumnType::from_type_name("BIGINT"), ColumnType::Integer);
        assert_eq!(ColumnType::from_type_name("integer"), ColumnType::Integer);
        assert_eq!(ColumnType::from_type_name("DOUBLE"), ColumnType::Float);
        assert_eq!(ColumnType::from_type_name("double precision"), ColumnType::Float);
        assert_eq!(ColumnType::from_type_name("NUMERIC(10,2)"), ColumnType::Float);
        assert_eq!(ColumnType::from_type_name("NUMBER(38,0)"), ColumnType::Integer);
        assert_eq!(ColumnType::from_type_name("TIMESTAMP"), ColumnType::Timestamp);
        assert_eq!(
            ColumnType::from_type_name("timestamp without time zone"),
            ColumnType::Timestamp
        );
        assert_eq!(ColumnType::from_type_name("DATE"), ColumnType::Timestamp);
        assert_eq!(ColumnType::from_type_name("boolean"), ColumnType::Boolean);
        assert_eq!(ColumnType::from_type_name("WVARCHAR"), ColumnType::Text);
        assert_eq!(ColumnType::from_type_name("VARCHAR(100)"), ColumnType::Text);
        assert_eq!(ColumnType::from_type_name(""), ColumnType::Text);
    }

    #[test]
    fn time_of_day_is_text() {
        assert_eq!(ColumnType::from_type_name("TIME"), ColumnType::Text);
        assert_eq!(
            ColumnType::from_type_name("time without time zone"),
            ColumnType::Text
        );
        assert_eq!(ColumnType::from_type_name("DATETIME"), ColumnType::Timestamp);
    }

    #[test]
    fn sql_text_rendering() {
        assert_eq!(Value::Null.to_sql_text(), None);
        assert_eq!(Value::Int(42).to_sql_text().as_deref(), Some("42"));
        assert_eq!(Value::Float(1.5).to_sql_text().as_deref(), Some("1.5"));
        assert_eq!(Value::Bool(true).to_sql_text().as_deref(), Some("true"));
        let ts = parse_timestamp("2024-01-02 03:04:05").unwrap();
        assert_eq!(
            Value::Timestamp(ts).to_sql_text().as_deref(),
            Some("2024-01-02 03:04:05")
        );
    }

    #[test]
    fn option_conversion_maps_none_to_null() {
        let v: Value = Option::<i64>::None.into();
        assert!(v.is_null());
        let v: Value = Some("x").into();
        assert_eq!(v, Value::Text("x".into()));
    }
}
