//! In-flight tabular dataset: ordered columns plus row tuples.

use std::collections::HashMap;

use crate::value::{ColumnType, Value};

/// A row is a tuple of cells in column order.
pub type Row = Vec<Value>;

/// Column name plus its declared type class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Rows fetched by one sync operation. Lives only for that operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl Dataset {
    #[must_use]
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Position of a column, matched case-insensitively.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Collapse rows that share the same key, keeping the last occurrence
    /// in its original position relative to other survivors.
    ///
    /// Returns the number of rows removed.
    pub fn dedup_by_key(&mut self, key_indices: &[usize]) -> usize {
        if key_indices.is_empty() || self.rows.len() < 2 {
            return 0;
        }

        let mut last_seen: HashMap<Vec<String>, usize> = HashMap::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            last_seen.insert(key_of(row, key_indices), i);
        }
        if last_seen.len() == self.rows.len() {
            return 0;
        }

        let before = self.rows.len();
        let mut idx = 0usize;
        self.rows.retain(|row| {
            let keep = last_seen.get(&key_of(row, key_indices)) == Some(&idx);
            idx += 1;
            keep
        });
        before - self.rows.len()
    }
}

fn key_of(row: &Row, key_indices: &[usize]) -> Vec<String> {
    key_indices
        .iter()
        .map(|&i| row.get(i).map_or_else(String::new, ToString::to_string))
        .collect()
}
