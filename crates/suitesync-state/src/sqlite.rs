//! `SQLite`-backed implementation of [`WatermarkStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. Timestamps are
//! stored as canonical `YYYY-MM-DD HH:MM:SS` text, which sorts correctly.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use suitesync_types::state::{
    Environment, RunStats, RunStatus, StagingControlRecord, StagingEntry, TableName,
    WatermarkRecord,
};
use suitesync_types::time::{format_timestamp, parse_timestamp, EPOCH_SENTINEL};

use crate::backend::WatermarkStore;
use crate::error::{self, StateError};
use crate::schema::{self, ControlTables, RUNS_TABLE};

/// `SQLite`-backed control tables.
///
/// Create with [`SqliteWatermarkStore::open`] for file-backed persistence
/// or [`SqliteWatermarkStore::in_memory`] for tests.
pub struct SqliteWatermarkStore {
    conn: Mutex<Connection>,
    landing: String,
    staging: String,
}

impl SqliteWatermarkStore {
    /// Open or create a `SQLite` state database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Backend`] if the database can't be opened.
    pub fn open(path: &Path, tables: &ControlTables) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(StateError::backend)?;
        Self::init(conn, tables)
    }

    /// Create an in-memory `SQLite` store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory(tables: &ControlTables) -> error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StateError::backend)?;
        Self::init(conn, tables)
    }

    fn init(conn: Connection, tables: &ControlTables) -> error::Result<Self> {
        conn.execute_batch(&schema::sqlite_ddl(tables))
            .map_err(|e| StateError::backend_context("create control tables", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
            landing: tables.landing_sql(),
            staging: tables.staging_sql(),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    fn decode_ts(raw: &str) -> error::Result<NaiveDateTime> {
        parse_timestamp(raw).map_err(StateError::Corrupt)
    }

    /// Insert a staging row with the next `ROW_NUM`, ignoring conflicts.
    fn insert_staging(
        conn: &Connection,
        staging: &str,
        entry: &StagingEntry,
        last_run: &str,
    ) -> error::Result<usize> {
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {staging} \
                 (ROW_NUM, SRC_DB, SRC_SCHEMA, SRC_TABLE, SRC_VIEW, \
                  TGT_DB, TGT_SCHEMA, TGT_TABLE, LAST_RUN_DATE_TIME) \
                 SELECT COALESCE(MAX(ROW_NUM), 0) + 1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8 \
                 FROM {staging}"
            ),
            rusqlite::params![
                entry.src_db,
                entry.src_schema,
                entry.src_table,
                entry.src_view,
                entry.tgt_db,
                entry.tgt_schema,
                entry.tgt_table,
                last_run,
            ],
        )
        .map_err(|e| StateError::backend_context("insert staging control row", e))
    }

    #[cfg(test)]
    fn get_run_row(
        &self,
        run_id: i64,
    ) -> error::Result<(String, i64, i64, Option<String>, Option<String>)> {
        let conn = self.lock_conn()?;
        conn.query_row(
            &format!(
                "SELECT STATUS, PHASE, RECORDS_READ, FINISHED_AT, ERROR_MESSAGE \
                 FROM {RUNS_TABLE} WHERE ID = ?1"
            ),
            [run_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .map_err(StateError::backend)
    }
}

impl WatermarkStore for SqliteWatermarkStore {
    fn get_watermark(
        &self,
        env: &Environment,
        table: &TableName,
    ) -> error::Result<Option<NaiveDateTime>> {
        let conn = self.lock_conn()?;
        let raw: Option<String> = conn
            .query_row(
                &format!(
                    "SELECT MAX(LAST_MODIFIED_DATE) FROM {} \
                     WHERE ENV = ?1 AND UPPER(NETSUITE_TABLE_NAME) = ?2",
                    self.landing
                ),
                rusqlite::params![env.as_str(), table.key()],
                |row| row.get(0),
            )
            .map_err(|e| StateError::backend_context("get_watermark", e))?;
        raw.as_deref().map(Self::decode_ts).transpose()
    }

    fn set_watermark(
        &self,
        env: &Environment,
        table: &TableName,
        last_modified: NaiveDateTime,
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (ENV, NETSUITE_TABLE_NAME, LAST_MODIFIED_DATE) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT(ENV, NETSUITE_TABLE_NAME) \
                 DO UPDATE SET LAST_MODIFIED_DATE = ?3",
                self.landing
            ),
            rusqlite::params![env.as_str(), table.key(), format_timestamp(&last_modified)],
        )
        .map_err(|e| StateError::backend_context("set_watermark", e))?;
        Ok(())
    }

    fn list_watermarks(&self, env: &Environment) -> error::Result<Vec<WatermarkRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT NETSUITE_TABLE_NAME, LAST_MODIFIED_DATE FROM {} \
                 WHERE ENV = ?1 ORDER BY NETSUITE_TABLE_NAME",
                self.landing
            ))
            .map_err(|e| StateError::backend_context("list_watermarks", e))?;
        let rows = stmt
            .query_map([env.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StateError::backend_context("list_watermarks", e))?;

        let mut out = Vec::new();
        for row in rows {
            let (name, raw) = row.map_err(StateError::backend)?;
            out.push(WatermarkRecord {
                environment: env.clone(),
                table_name: TableName::new(name),
                last_modified_date: Self::decode_ts(&raw)?,
            });
        }
        Ok(out)
    }

    fn staging_records(&self) -> error::Result<Vec<StagingControlRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT ROW_NUM, SRC_DB, SRC_SCHEMA, SRC_TABLE, SRC_VIEW, \
                 TGT_DB, TGT_SCHEMA, TGT_TABLE, LAST_RUN_DATE_TIME \
                 FROM {} ORDER BY ROW_NUM",
                self.staging
            ))
            .map_err(|e| StateError::backend_context("staging_records", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    StagingEntry {
                        src_db: row.get(1)?,
                        src_schema: row.get(2)?,
                        src_table: row.get(3)?,
                        src_view: row.get(4)?,
                        tgt_db: row.get(5)?,
                        tgt_schema: row.get(6)?,
                        tgt_table: row.get(7)?,
                    },
                    row.get::<_, String>(8)?,
                ))
            })
            .map_err(|e| StateError::backend_context("staging_records", e))?;

        let mut out = Vec::new();
        for row in rows {
            let (row_num, entry, raw) = row.map_err(StateError::backend)?;
            out.push(StagingControlRecord {
                row_num,
                src_db: entry.src_db,
                src_schema: entry.src_schema,
                src_table: entry.src_table,
                src_view: entry.src_view,
                tgt_db: entry.tgt_db,
                tgt_schema: entry.tgt_schema,
                tgt_table: entry.tgt_table,
                last_run_date_time: Self::decode_ts(&raw)?,
            });
        }
        Ok(out)
    }

    fn register_staging(&self, entry: &StagingEntry) -> error::Result<bool> {
        let conn = self.lock_conn()?;
        let inserted = Self::insert_staging(&conn, &self.staging, entry, EPOCH_SENTINEL)?;
        if inserted > 0 {
            tracing::debug!(target_table = %entry.tgt_table, "Registered staging control row");
        }
        Ok(inserted > 0)
    }

    fn advance_staging(
        &self,
        entry: &StagingEntry,
        last_run: NaiveDateTime,
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let ts = format_timestamp(&last_run);
        let updated = conn
            .execute(
                &format!(
                    "UPDATE {} SET LAST_RUN_DATE_TIME = ?1 \
                     WHERE TGT_DB = ?2 AND TGT_SCHEMA = ?3 AND TGT_TABLE = ?4",
                    self.staging
                ),
                rusqlite::params![ts, entry.tgt_db, entry.tgt_schema, entry.tgt_table],
            )
            .map_err(|e| StateError::backend_context("advance_staging", e))?;
        if updated == 0 {
            Self::insert_staging(&conn, &self.staging, entry, &ts)?;
        }
        Ok(())
    }

    fn start_run(&self, phase: u8, table: &TableName) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            &format!("INSERT INTO {RUNS_TABLE} (PHASE, TABLE_NAME, STATUS) VALUES (?1, ?2, ?3)"),
            rusqlite::params![phase, table.as_str(), RunStatus::Running.as_str()],
        )
        .map_err(|e| StateError::backend_context("start_run", e))?;
        Ok(conn.last_insert_rowid())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let found = conn
            .query_row(
                &format!("SELECT ID FROM {RUNS_TABLE} WHERE ID = ?1"),
                [run_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(|e| StateError::backend_context("complete_run", e))?;
        if found.is_none() {
            tracing::warn!(run_id, "complete_run called for unknown run");
            return Ok(());
        }
        conn.execute(
            &format!(
                "UPDATE {RUNS_TABLE} SET STATUS = ?1, FINISHED_AT = datetime('now'), \
                 RECORDS_READ = ?2, RECORDS_WRITTEN = ?3, ERROR_MESSAGE = ?4 \
                 WHERE ID = ?5"
            ),
            rusqlite::params![
                status.as_str(),
                stats.records_read as i64,
                stats.records_written as i64,
                stats.error_message,
                run_id,
            ],
        )
        .map_err(|e| StateError::backend_context("complete_run", e))?;
        Ok(())
    }
}
