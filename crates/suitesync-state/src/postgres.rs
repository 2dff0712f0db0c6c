//! `PostgreSQL`-backed implementation of [`WatermarkStore`].
//!
//! Uses the sync `postgres` crate with a single `Mutex<Client>` for
//! thread safety. Timestamps cross the wire as canonical text and are
//! cast server-side, so no chrono integration is needed in the driver.

use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use postgres::{Client, NoTls};
use suitesync_types::state::{
    Environment, RunStats, RunStatus, StagingControlRecord, StagingEntry, TableName,
    WatermarkRecord,
};
use suitesync_types::time::{format_timestamp, parse_timestamp, EPOCH_SENTINEL};

use crate::backend::WatermarkStore;
use crate::error::{self, StateError};
use crate::schema::{self, ControlTables, RUNS_TABLE};

/// `PostgreSQL`-backed control tables.
///
/// Create with [`PostgresWatermarkStore::open`] providing a libpq-style
/// connection string (e.g. `"host=localhost dbname=warehouse user=postgres"`).
pub struct PostgresWatermarkStore {
    client: Mutex<Client>,
    landing: String,
    staging: String,
}

impl PostgresWatermarkStore {
    /// Connect to a `PostgreSQL` database and initialize control tables.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if connection or DDL execution fails.
    pub fn open(connstr: &str, tables: &ControlTables) -> error::Result<Self> {
        let mut client = Client::connect(connstr, NoTls)
            .map_err(|e| StateError::backend_context("connect", e))?;
        client
            .batch_execute(&schema::postgres_ddl(tables))
            .map_err(|e| StateError::backend_context("create control tables", e))?;
        Ok(Self {
            client: Mutex::new(client),
            landing: tables.landing_sql(),
            staging: tables.staging_sql(),
        })
    }

    /// Acquire the client lock.
    fn lock_client(&self) -> error::Result<MutexGuard<'_, Client>> {
        self.client.lock().map_err(|_| StateError::LockPoisoned)
    }

    fn decode_ts(raw: &str) -> error::Result<NaiveDateTime> {
        parse_timestamp(raw).map_err(StateError::Corrupt)
    }

    fn insert_staging(
        client: &mut Client,
        staging: &str,
        entry: &StagingEntry,
        last_run: &str,
    ) -> error::Result<u64> {
        client
            .execute(
                &format!(
                    "INSERT INTO {staging} \
                     (ROW_NUM, SRC_DB, SRC_SCHEMA, SRC_TABLE, SRC_VIEW, \
                      TGT_DB, TGT_SCHEMA, TGT_TABLE, LAST_RUN_DATE_TIME) \
                     SELECT COALESCE(MAX(ROW_NUM), 0) + 1, $1::text, $2::text, $3::text, \
                            $4::text, $5::text, $6::text, $7::text, CAST($8::text AS TIMESTAMP) \
                     FROM {staging} \
                     ON CONFLICT (TGT_DB, TGT_SCHEMA, TGT_TABLE) DO NOTHING"
                ),
                &[
                    &entry.src_db,
                    &entry.src_schema,
                    &entry.src_table,
                    &entry.src_view,
                    &entry.tgt_db,
                    &entry.tgt_schema,
                    &entry.tgt_table,
                    &last_run,
                ],
            )
            .map_err(|e| StateError::backend_context("insert staging control row", e))
    }
}

impl WatermarkStore for PostgresWatermarkStore {
    fn get_watermark(
        &self,
        env: &Environment,
        table: &TableName,
    ) -> error::Result<Option<NaiveDateTime>> {
        let mut client = self.lock_client()?;
        let row = client
            .query_one(
                &format!(
                    "SELECT MAX(LAST_MODIFIED_DATE)::text FROM {} \
                     WHERE ENV = $1 AND UPPER(NETSUITE_TABLE_NAME) = $2",
                    self.landing
                ),
                &[&env.as_str(), &table.key()],
            )
            .map_err(|e| StateError::backend_context("get_watermark", e))?;
        let raw: Option<String> = row.get(0);
        raw.as_deref().map(Self::decode_ts).transpose()
    }

    fn set_watermark(
        &self,
        env: &Environment,
        table: &TableName,
        last_modified: NaiveDateTime,
    ) -> error::Result<()> {
        let mut client = self.lock_client()?;
        client
            .execute(
                &format!(
                    "INSERT INTO {} (ENV, NETSUITE_TABLE_NAME, LAST_MODIFIED_DATE) \
                     VALUES ($1, $2, CAST($3::text AS TIMESTAMP)) \
                     ON CONFLICT (ENV, NETSUITE_TABLE_NAME) \
                     DO UPDATE SET LAST_MODIFIED_DATE = EXCLUDED.LAST_MODIFIED_DATE",
                    self.landing
                ),
                &[
                    &env.as_str(),
                    &table.key(),
                    &format_timestamp(&last_modified),
                ],
            )
            .map_err(|e| StateError::backend_context("set_watermark", e))?;
        Ok(())
    }

    fn list_watermarks(&self, env: &Environment) -> error::Result<Vec<WatermarkRecord>> {
        let mut client = self.lock_client()?;
        let rows = client
            .query(
                &format!(
                    "SELECT NETSUITE_TABLE_NAME, LAST_MODIFIED_DATE::text FROM {} \
                     WHERE ENV = $1 ORDER BY NETSUITE_TABLE_NAME",
                    self.landing
                ),
                &[&env.as_str()],
            )
            .map_err(|e| StateError::backend_context("list_watermarks", e))?;

        rows.iter()
            .map(|row| {
                let name: String = row.get(0);
                let raw: String = row.get(1);
                Ok(WatermarkRecord {
                    environment: env.clone(),
                    table_name: TableName::new(name),
                    last_modified_date: Self::decode_ts(&raw)?,
                })
            })
            .collect()
    }

    fn staging_records(&self) -> error::Result<Vec<StagingControlRecord>> {
        let mut client = self.lock_client()?;
        let rows = client
            .query(
                &format!(
                    "SELECT ROW_NUM, SRC_DB, SRC_SCHEMA, SRC_TABLE, SRC_VIEW, \
                     TGT_DB, TGT_SCHEMA, TGT_TABLE, LAST_RUN_DATE_TIME::text \
                     FROM {} ORDER BY ROW_NUM",
                    self.staging
                ),
                &[],
            )
            .map_err(|e| StateError::backend_context("staging_records", e))?;

        rows.iter()
            .map(|row| {
                let raw: String = row.get(8);
                Ok(StagingControlRecord {
                    row_num: row.get(0),
                    src_db: row.get(1),
                    src_schema: row.get(2),
                    src_table: row.get(3),
                    src_view: row.get(4),
                    tgt_db: row.get(5),
                    tgt_schema: row.get(6),
                    tgt_table: row.get(7),
                    last_run_date_time: Self::decode_ts(&raw)?,
                })
            })
            .collect()
    }

    fn register_staging(&self, entry: &StagingEntry) -> error::Result<bool> {
        let mut client = self.lock_client()?;
        let inserted = Self::insert_staging(&mut client, &self.staging, entry, EPOCH_SENTINEL)?;
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
        let mut client = self.lock_client()?;
        let ts = format_timestamp(&last_run);
        let updated = client
            .execute(
                &format!(
                    "UPDATE {} SET LAST_RUN_DATE_TIME = CAST($1::text AS TIMESTAMP) \
                     WHERE TGT_DB = $2 AND TGT_SCHEMA = $3 AND TGT_TABLE = $4",
                    self.staging
                ),
                &[&ts, &entry.tgt_db, &entry.tgt_schema, &entry.tgt_table],
            )
            .map_err(|e| StateError::backend_context("advance_staging", e))?;
        if updated == 0 {
            Self::insert_staging(&mut client, &self.staging, entry, &ts)?;
        }
        Ok(())
    }

    fn start_run(&self, phase: u8, table: &TableName) -> error::Result<i64> {
        let mut client = self.lock_client()?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO {RUNS_TABLE} (PHASE, TABLE_NAME, STATUS) \
                     VALUES ($1, $2, $3) RETURNING ID"
                ),
                &[
                    &i32::from(phase),
                    &table.as_str(),
                    &RunStatus::Running.as_str(),
                ],
            )
            .map_err(|e| StateError::backend_context("start_run", e))?;
        Ok(row.get(0))
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()> {
        let mut client = self.lock_client()?;
        let updated = client
            .execute(
                &format!(
                    "UPDATE {RUNS_TABLE} SET STATUS = $1, \
                     FINISHED_AT = (now() AT TIME ZONE 'utc'), \
                     RECORDS_READ = $2, RECORDS_WRITTEN = $3, ERROR_MESSAGE = $4 \
                     WHERE ID = $5"
                ),
                &[
                    &status.as_str(),
                    &(stats.records_read as i64),
                    &(stats.records_written as i64),
                    &stats.error_message,
                    &run_id,
                ],
            )
            .map_err(|e| StateError::backend_context("complete_run", e))?;
        if updated == 0 {
            tracing::warn!(run_id, "complete_run called for unknown run");
        }
        Ok(())
    }
}
