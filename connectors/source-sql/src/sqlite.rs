//! `SQLite` source reader.
//!
//! Column metadata comes from `pragma_table_info`; declared types drive the
//! column type classes. Timestamps are compared as canonical text.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use pg_escape::quote_identifier;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use chrono::NaiveDateTime;
use suitesync_types::time::{format_timestamp, parse_timestamp};
use suitesync_types::{Column, Dataset, Row, Value};

use crate::error::{self, SourceError};
use crate::reader::{Since, SourceColumn, SourceReader};

/// Reads tables from a `SQLite` database.
pub struct SqliteSource {
    conn: Mutex<Connection>,
}

impl SqliteSource {
    /// Open an existing database file read-only.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Connection`] when the file cannot be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(SourceError::connection)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-open connection.
    #[must_use]
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SourceError::LockPoisoned)
    }

    fn describe_locked(conn: &Connection, table: &str) -> error::Result<Vec<SourceColumn>> {
        let mut stmt = conn
            .prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
            .map_err(|e| SourceError::query(format!("describe {table}"), e))?;
        let rows = stmt
            .query_map([table], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| SourceError::query(format!("describe {table}"), e))?;

        let mut columns = Vec::new();
        for row in rows {
            let (name, declared) =
                row.map_err(|e| SourceError::query(format!("describe {table}"), e))?;
            columns.push(SourceColumn::from_declared(name, &declared));
        }
        if columns.is_empty() {
            return Err(SourceError::TableNotFound(table.to_string()));
        }
        Ok(columns)
    }
}

fn decode(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl SourceReader for SqliteSource {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn describe(&self, table: &str) -> error::Result<Vec<SourceColumn>> {
        let conn = self.lock_conn()?;
        Self::describe_locked(&conn, table)
    }

    fn fetch(&self, table: &str, since: Option<&Since>) -> error::Result<Dataset> {
        let conn = self.lock_conn()?;
        let described = Self::describe_locked(&conn, table)?;

        let col_list = described
            .iter()
            .map(|c| quote_identifier(&c.name).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {col_list} FROM {}", quote_identifier(table));
        let mut params: Vec<String> = Vec::new();
        if let Some(since) = since {
            sql.push_str(&format!(" WHERE {} > ?1", quote_identifier(&since.column)));
            params.push(format_timestamp(&since.after));
        }
        tracing::debug!(table, sql = %sql, "Source query");

        let ctx = format!("fetch {table}");
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| SourceError::query(ctx.clone(), e))?;
        let width = described.len();
        let mapped = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(decode))
                    .collect::<rusqlite::Result<Row>>()
            })
            .map_err(|e| SourceError::query(ctx.clone(), e))?;

        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row.map_err(|e| SourceError::query(ctx.clone(), e))?);
        }

        let columns = described
            .iter()
            .map(|c| Column::new(c.name.clone(), c.column_type()))
            .collect();
        Ok(Dataset::new(columns, rows))
    }

    fn now(&self) -> error::Result<NaiveDateTime> {
        let conn = self.lock_conn()?;
        let raw: String = conn
            .query_row("SELECT datetime('now', 'localtime')", [], |row| row.get(0))
            .map_err(|e| SourceError::query("read source clock", e))?;
        parse_timestamp(&raw).map_err(|message| SourceError::Decode {
            column: "now".to_string(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use suitesync_types::ColumnType;

    fn source() -> SqliteSource {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE VENDORS (
                VENDOR_ID INTEGER,
                NAME VARCHAR(100),
                BALANCE NUMERIC(12,2),
                DATE_LAST_MODIFIED TIMESTAMP
            );
            INSERT INTO VENDORS VALUES (1, 'Acme', 10.5, '2024-01-01 00:00:00');
            INSERT INTO VENDORS VALUES (2, 'Globex', NULL, '2024-01-05 12:00:00');
            INSERT INTO VENDORS VALUES (3, NULL, 7, NULL);",
        )
        .unwrap();
        SqliteSource::from_connection(conn)
    }

    #[test]
    fn describe_reports_declared_types() {
        let cols = source().describe("VENDORS").unwrap();
        assert_eq!(cols.len(), 4);
        assert_eq!(cols[1].name, "NAME");
        assert_eq!(cols[1].type_name, "VARCHAR");
        assert_eq!(cols[1].length, Some(100));
        assert_eq!(cols[2].precision, Some(12));
        assert_eq!(cols[2].scale, Some(2));
    }

    #[test]
    fn describe_missing_table_is_not_found() {
        let err = source().describe("NOPE").unwrap_err();
        assert!(matches!(err, SourceError::TableNotFound(_)));
    }

    #[test]
    fn full_fetch_returns_every_row() {
        let ds = source().fetch("VENDORS", None).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.column_names(), vec!["VENDOR_ID", "NAME", "BALANCE", "DATE_LAST_MODIFIED"]);
        assert_eq!(ds.columns[3].column_type, ColumnType::Timestamp);
        assert_eq!(ds.rows[0][0], Value::Int(1));
        assert_eq!(ds.rows[2][1], Value::Null);
    }

    #[test]
    fn since_filter_is_strictly_greater() {
        let after = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let ds = source()
            .fetch("VENDORS", Some(&Since::new("DATE_LAST_MODIFIED", after)))
            .unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.rows[0][0], Value::Int(2));
    }

    #[test]
    fn unknown_filter_column_is_query_error() {
        let err = source()
            .fetch("VENDORS", Some(&Since::new("MISSING", chrono::NaiveDateTime::default())))
            .unwrap_err();
        assert!(matches!(err, SourceError::Query { .. }));
    }

    #[test]
    fn clock_reads_local_wall_time() {
        let now = source().now().unwrap();
        let local = chrono::Local::now().naive_local();
        assert_eq!(chrono::Timelike::nanosecond(&now), 0);
        assert!((local - now).num_seconds().abs() <= 5, "{now} vs {local}");
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteSource::open(&dir.path().join("missing.db"));
        assert!(matches!(err, Err(SourceError::Connection(_))));
    }
}
