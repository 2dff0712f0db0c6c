//! Watermark store model types.
//!
//! Pure data types used by `WatermarkStore` implementations. Kept in the
//! types crate so both the state and engine crates can share them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Environment label stored in the landing control table's `ENV` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment(String);

impl Environment {
    #[must_use]
    pub fn new(env: impl Into<String>) -> Self {
        Self(env.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for Environment {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Source table name as tracked by the control table.
///
/// Control rows match case-insensitively; [`TableName::key`] gives the
/// stored (upper-cased) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableName(String);

impl TableName {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upper-cased form written to and compared against the control table.
    #[must_use]
    pub fn key(&self) -> String {
        self.0.to_ascii_uppercase()
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for TableName {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

// ---------------------------------------------------------------------------
// Control records
// ---------------------------------------------------------------------------

/// One row of the landing control table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkRecord {
    pub environment: Environment,
    pub table_name: TableName,
    pub last_modified_date: NaiveDateTime,
}

/// One row of the staging control table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingControlRecord {
    pub row_num: i64,
    pub src_db: String,
    pub src_schema: String,
    pub src_table: String,
    pub src_view: String,
    pub tgt_db: String,
    pub tgt_schema: String,
    pub tgt_table: String,
    pub last_run_date_time: NaiveDateTime,
}

impl StagingControlRecord {
    /// The source/target association without the store-assigned fields.
    #[must_use]
    pub fn entry(&self) -> StagingEntry {
        StagingEntry {
            src_db: self.src_db.clone(),
            src_schema: self.src_schema.clone(),
            src_table: self.src_table.clone(),
            src_view: self.src_view.clone(),
            tgt_db: self.tgt_db.clone(),
            tgt_schema: self.tgt_schema.clone(),
            tgt_table: self.tgt_table.clone(),
        }
    }
}

/// Fields needed to register a staging control row. `ROW_NUM` and the
/// initial last-run time are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingEntry {
    pub src_db: String,
    pub src_schema: String,
    pub src_table: String,
    pub src_view: String,
    pub tgt_db: String,
    pub tgt_schema: String,
    pub tgt_table: String,
}

// ---------------------------------------------------------------------------
// Run tracking
// ---------------------------------------------------------------------------

/// Terminal status of a per-table run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Skipped,
    Failed,
}

impl RunStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate statistics for one per-table run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub records_read: u64,
    pub records_written: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
