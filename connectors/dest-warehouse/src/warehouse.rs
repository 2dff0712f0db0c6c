//! The warehouse contract and the table/merge descriptions it consumes.

use chrono::NaiveDateTime;
use serde::Deserialize;
use suitesync_types::{Dataset, TableRef};

use crate::error::{self, WarehouseError};

/// SQL dialect spoken by a warehouse backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

/// How [`Warehouse::create_table`] treats an existing table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// Drop and recreate.
    #[default]
    Replace,
    /// Leave an existing table untouched.
    IfNotExists,
}

/// A column of an existing warehouse table or view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetColumn {
    pub name: String,
    pub data_type: String,
}

impl TargetColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Table definition for `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub table: TableRef,
    pub columns: Vec<TargetColumn>,
    pub primary_key: Vec<String>,
}

/// A column carried through a merge, spelled as each side spells it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeColumn {
    pub source: String,
    pub target: String,
}

impl MergeColumn {
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: name.clone(),
            target: name,
        }
    }
}

/// Insert-only column set to a fixed timestamp on newly inserted rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditColumn {
    pub name: String,
    pub value: NaiveDateTime,
}

/// MERGE of one table (or view) into another on a key.
///
/// `columns` lists every carried column, key columns included. Matched rows
/// get their non-key columns updated; unmatched rows are inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub source: TableRef,
    pub target: TableRef,
    pub key: Vec<MergeColumn>,
    pub columns: Vec<MergeColumn>,
    pub audit: Option<AuditColumn>,
}

impl MergePlan {
    /// Carried columns that are not part of the key.
    pub fn update_columns(&self) -> impl Iterator<Item = &MergeColumn> {
        self.columns.iter().filter(move |c| {
            !self
                .key
                .iter()
                .any(|k| k.target.eq_ignore_ascii_case(&c.target))
        })
    }
}

/// Rows inserted and updated by an upsert or merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeCounts {
    pub inserted: u64,
    pub updated: u64,
}

impl MergeCounts {
    #[must_use]
    pub fn total(self) -> u64 {
        self.inserted + self.updated
    }

    /// Split a source row count given how many keys already existed.
    #[must_use]
    pub fn from_matched(source_rows: u64, matched: u64, updates_columns: bool) -> Self {
        Self {
            inserted: source_rows.saturating_sub(matched),
            updated: if updates_columns { matched } else { 0 },
        }
    }
}

/// Write access to the warehouse layers.
///
/// Schemas are created with [`ensure_schema`](Warehouse::ensure_schema)
/// before any transaction is opened. Implementations must be `Send + Sync`
/// for use behind `Box<dyn Warehouse>`.
pub trait Warehouse: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Make `schema` available (create it, or attach its database).
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`] when the schema cannot be created.
    fn ensure_schema(&self, schema: &str) -> error::Result<()>;

    /// Run a raw statement, returning affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Statement`] when the statement fails.
    fn execute(&self, sql: &str) -> error::Result<u64>;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Statement`] when `BEGIN` fails.
    fn begin(&self) -> error::Result<()>;

    /// Commit the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Statement`] when `COMMIT` fails.
    fn commit(&self) -> error::Result<()>;

    /// Roll back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Statement`] when `ROLLBACK` fails.
    fn rollback(&self) -> error::Result<()>;

    /// Whether a table or view exists.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`] when the catalog cannot be read.
    fn table_exists(&self, table: &TableRef) -> error::Result<bool>;

    /// Base table names in `schema`, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`] when the catalog cannot be read.
    fn list_tables(&self, schema: &str) -> error::Result<Vec<String>>;

    /// Columns of a table or view in ordinal order; empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`] when the catalog cannot be read.
    fn columns(&self, table: &TableRef) -> error::Result<Vec<TargetColumn>>;

    /// Create a table according to `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`] when the DDL fails.
    fn create_table(&self, def: &TableDef, mode: CreateMode) -> error::Result<()>;

    /// (Re)create `to` with the columns of `from` and no rows.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`] when the DDL fails.
    fn clone_table_structure(&self, from: &TableRef, to: &TableRef) -> error::Result<()>;

    /// Remove every row from `table`.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`] when the statement fails.
    fn truncate(&self, table: &TableRef) -> error::Result<()>;

    /// Append every dataset row to `table`, returning rows written.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Schema`] when a dataset column is missing
    /// from the target, or [`WarehouseError::Statement`] on insert failure.
    fn append(&self, table: &TableRef, data: &Dataset) -> error::Result<u64>;

    /// Insert-or-update every dataset row into `table` by `key`.
    ///
    /// The dataset must not contain duplicate keys.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`] as for [`append`](Warehouse::append).
    fn upsert(&self, table: &TableRef, data: &Dataset, key: &[String])
        -> error::Result<MergeCounts>;

    /// Merge one table or view into another.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Statement`] when the merge fails.
    fn merge_table(&self, plan: &MergePlan) -> error::Result<MergeCounts>;

    /// Rows of `table` whose `column` is strictly after `after`.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`] when the query fails.
    fn count_newer(&self, table: &TableRef, column: &str, after: NaiveDateTime)
        -> error::Result<u64>;

    /// Insert rows of `from` newer than `after` into `to`, over the columns
    /// the two share. Returns rows inserted.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Schema`] when the tables share no columns.
    fn insert_newer(
        &self,
        from: &TableRef,
        to: &TableRef,
        column: &str,
        after: NaiveDateTime,
    ) -> error::Result<u64>;

    /// Number of rows in `table`.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`] when the query fails.
    fn row_count(&self, table: &TableRef) -> error::Result<u64>;

    /// Every row of `table`, ordered by its first column.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`] when the query fails.
    fn read_table(&self, table: &TableRef) -> error::Result<Dataset>;
}

/// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
///
/// A failed rollback is logged and the original error is returned.
///
/// # Errors
///
/// Returns the error from `begin`, from `f`, or from `commit`.
pub fn with_transaction<T, E>(
    warehouse: &dyn Warehouse,
    f: impl FnOnce(&dyn Warehouse) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<WarehouseError>,
{
    warehouse.begin()?;
    match f(warehouse) {
        Ok(value) => {
            warehouse.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = warehouse.rollback() {
                tracing::error!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

/// Map each dataset column onto the target column with the same name
/// (case-insensitive).
///
/// # Errors
///
/// Returns [`WarehouseError::Schema`] naming the first unmatched column.
pub(crate) fn match_columns<'a>(
    table: &TableRef,
    data: &Dataset,
    target: &'a [TargetColumn],
) -> error::Result<Vec<&'a TargetColumn>> {
    data.columns
        .iter()
        .map(|c| {
            target
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(&c.name))
                .ok_or_else(|| {
                    WarehouseError::Schema(format!("column '{}' not found in {table}", c.name))
                })
        })
        .collect()
}

/// Resolve key names against the matched target columns.
pub(crate) fn key_positions(
    table: &TableRef,
    matched: &[&TargetColumn],
    key: &[String],
) -> error::Result<Vec<usize>> {
    if key.is_empty() {
        return Err(WarehouseError::Schema(format!("no key given for {table}")));
    }
    key.iter()
        .map(|k| {
            matched
                .iter()
                .position(|t| t.name.eq_ignore_ascii_case(k))
                .ok_or_else(|| {
                    WarehouseError::Schema(format!("key column '{k}' not in dataset for {table}"))
                })
        })
        .collect()
}

/// Columns shared by `from` and `to`, spelled per side.
pub(crate) fn shared_columns(from: &[TargetColumn], to: &[TargetColumn]) -> Vec<MergeColumn> {
    to.iter()
        .filter_map(|t| {
            from.iter()
                .find(|f| f.name.eq_ignore_ascii_case(&t.name))
                .map(|f| MergeColumn {
                    source: f.name.clone(),
                    target: t.name.clone(),
                })
        })
        .collect()
}
