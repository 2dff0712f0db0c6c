//! Landing table DDL from source column metadata.

use std::collections::BTreeMap;

use suitesync_source::SourceColumn;
use suitesync_types::{SyncError, SyncStage, TableRef};
use suitesync_warehouse::{TableDef, TargetColumn};

/// Largest precision carried through to a `NUMERIC`/`NUMBER` column.
const MAX_NUMERIC_PRECISION: i64 = 37;

/// Built-in source type name to warehouse type mapping. Covers NetSuite
/// ODBC type names plus the names `PostgreSQL` and `SQLite` sources report.
const DEFAULT_TYPES: &[(&str, &str)] = &[
    ("VARCHAR", "VARCHAR"),
    ("WVARCHAR", "VARCHAR"),
    ("CHAR", "VARCHAR"),
    ("WCHAR", "VARCHAR"),
    ("CHARACTER", "VARCHAR"),
    ("CHARACTER VARYING", "VARCHAR"),
    ("LONGVARCHAR", "TEXT"),
    ("WLONGVARCHAR", "TEXT"),
    ("CLOB", "TEXT"),
    ("TEXT", "TEXT"),
    ("INTEGER", "BIGINT"),
    ("INT", "BIGINT"),
    ("BIGINT", "BIGINT"),
    ("SMALLINT", "BIGINT"),
    ("TINYINT", "BIGINT"),
    ("DECIMAL", "NUMERIC"),
    ("NUMERIC", "NUMERIC"),
    ("DOUBLE", "FLOAT"),
    ("DOUBLE PRECISION", "FLOAT"),
    ("FLOAT", "FLOAT"),
    ("REAL", "FLOAT"),
    ("TIMESTAMP", "TIMESTAMP"),
    ("TIMESTAMP WITHOUT TIME ZONE", "TIMESTAMP"),
    ("DATETIME", "TIMESTAMP"),
    ("DATE", "DATE"),
    ("BIT", "BOOLEAN"),
    ("BOOLEAN", "BOOLEAN"),
];

/// Source type name to warehouse type. Lookups ignore case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMap(BTreeMap<String, String>);

impl Default for TypeMap {
    fn default() -> Self {
        Self(
            DEFAULT_TYPES
                .iter()
                .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
                .collect(),
        )
    }
}

impl TypeMap {
    /// The built-in map with `overrides` applied on top.
    #[must_use]
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut map = Self::default();
        for (from, to) in overrides {
            map.0.insert(normalize(from), to.trim().to_string());
        }
        map
    }

    #[must_use]
    pub fn lookup(&self, source_type: &str) -> Option<&str> {
        self.0.get(&normalize(source_type)).map(String::as_str)
    }

    /// Full warehouse type for `column`, with length or precision applied.
    ///
    /// # Errors
    ///
    /// Returns a message when the source type has no mapping.
    pub fn column_type(&self, column: &SourceColumn) -> Result<String, String> {
        let mapped = self.lookup(&column.type_name).ok_or_else(|| {
            format!(
                "no warehouse type mapped for source type '{}' (column '{}')",
                column.type_name, column.name
            )
        })?;
        if mapped.contains('(') {
            return Ok(mapped.to_string());
        }

        let upper = mapped.to_ascii_uppercase();
        if upper == "NUMBER" || upper == "NUMERIC" {
            return Ok(match column.precision {
                Some(p) if p > MAX_NUMERIC_PRECISION => format!("{mapped}(38,0)"),
                Some(p) => format!("{mapped}({p},{})", column.scale.unwrap_or(0)),
                None => mapped.to_string(),
            });
        }
        if upper == "VARCHAR" {
            return Ok(match column.length.or(column.precision) {
                Some(n) if n > 0 => format!("{mapped}({n})"),
                _ => mapped.to_string(),
            });
        }
        Ok(mapped.to_string())
    }
}

fn normalize(type_name: &str) -> String {
    type_name.trim().to_ascii_uppercase()
}

/// Build the landing table definition for `table` from its source columns.
///
/// Key names are matched case-insensitively and take the source spelling.
///
/// # Errors
///
/// Returns a schema error when the description is empty, a source type is
/// unmapped, or a key column is not among the source columns.
pub fn landing_table(
    table: TableRef,
    columns: &[SourceColumn],
    primary_key: &[String],
    types: &TypeMap,
) -> Result<TableDef, SyncError> {
    if columns.is_empty() {
        return Err(SyncError::schema(
            SyncStage::Fetch,
            format!("source describes no columns for {table}"),
        ));
    }

    let target_columns = columns
        .iter()
        .map(|c| {
            types
                .column_type(c)
                .map(|data_type| TargetColumn::new(c.name.clone(), data_type))
                .map_err(|e| SyncError::schema(SyncStage::Write, e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let primary_key = primary_key
        .iter()
        .map(|k| {
            columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(k))
                .map(|c| c.name.clone())
                .ok_or_else(|| {
                    SyncError::schema(
                        SyncStage::Write,
                        format!("primary key column '{k}' not in source columns of {table}"),
                    )
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TableDef {
        table,
        columns: target_columns,
        primary_key,
    })
}
