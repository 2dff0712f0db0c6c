//! The source reader contract and column metadata.

use chrono::NaiveDateTime;
use suitesync_types::{ColumnType, Dataset};

use crate::error;

/// Column metadata as reported by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumn {
    pub name: String,
    /// Bare type name without modifiers (`VARCHAR`, `NUMERIC`, `TIMESTAMP`).
    pub type_name: String,
    pub length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
}

impl SourceColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            length: None,
            precision: None,
            scale: None,
        }
    }

    /// Type class used to pick the transformer's fill rule.
    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        let upper = self.type_name.to_ascii_uppercase();
        let is_decimal = matches!(upper.as_str(), "NUMERIC" | "NUMBER" | "DECIMAL");
        if is_decimal && self.scale == Some(0) {
            return ColumnType::Integer;
        }
        ColumnType::from_type_name(&upper)
    }

    /// Build from a declared type such as `VARCHAR(100)` or `NUMERIC(10, 2)`.
    ///
    /// One modifier on a character type is a length, otherwise it is a
    /// precision; a second modifier is the scale.
    #[must_use]
    pub fn from_declared(name: impl Into<String>, declared: &str) -> Self {
        let declared = declared.trim();
        let (base, modifiers) = match declared.split_once('(') {
            Some((base, rest)) => (base.trim(), rest.trim_end_matches(')')),
            None => (declared, ""),
        };
        let mut nums = modifiers
            .split(',')
            .filter_map(|part| part.trim().parse::<i64>().ok());
        let first = nums.next();
        let second = nums.next();

        let upper = base.to_ascii_uppercase();
        let is_char = upper.contains("CHAR") || upper.contains("TEXT") || upper == "STRING";

        Self {
            name: name.into(),
            type_name: upper,
            length: if is_char { first } else { None },
            precision: if is_char { None } else { first },
            scale: second,
        }
    }
}

/// Incremental filter: rows whose `column` is strictly greater than `after`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Since {
    pub column: String,
    pub after: NaiveDateTime,
}

impl Since {
    pub fn new(column: impl Into<String>, after: NaiveDateTime) -> Self {
        Self {
            column: column.into(),
            after,
        }
    }
}

/// Read access to an external tabular source.
///
/// Implementations must be `Send + Sync` for use behind `Box<dyn SourceReader>`.
pub trait SourceReader: Send + Sync {
    /// Short backend label for logs.
    fn kind(&self) -> &'static str;

    /// Column metadata for `table` in ordinal order.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::TableNotFound`](crate::SourceError::TableNotFound)
    /// when the table has no columns in the catalog.
    fn describe(&self, table: &str) -> error::Result<Vec<SourceColumn>>;

    /// All rows of `table`, or only those newer than `since` when given.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`](crate::SourceError) when the query fails or a
    /// value cannot be decoded.
    fn fetch(&self, table: &str, since: Option<&Since>) -> error::Result<Dataset>;

    /// Current wall-clock time on the source, whole seconds.
    ///
    /// This is the clock the source stamps its modification columns with,
    /// in the source's local time zone. Watermarks are taken from it.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`](crate::SourceError) when the query fails or
    /// the returned time cannot be parsed.
    fn now(&self) -> error::Result<NaiveDateTime>;
}
