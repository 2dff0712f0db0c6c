//! Watermark store trait definition.
//!
//! [`WatermarkStore`] defines the storage contract for the landing control
//! table, the staging control table and run history. Model types live in
//! [`suitesync_types::state`].

use chrono::NaiveDateTime;
use suitesync_types::state::{
    Environment, RunStats, RunStatus, StagingControlRecord, StagingEntry, TableName,
    WatermarkRecord,
};

use crate::error;

/// Storage contract for pipeline watermarks.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn WatermarkStore>`.
pub trait WatermarkStore: Send + Sync {
    /// Read the last successful sync time for an (environment, table) pair.
    ///
    /// Table names match case-insensitively. Returns `Ok(None)` when no
    /// control row exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_watermark(
        &self,
        env: &Environment,
        table: &TableName,
    ) -> error::Result<Option<NaiveDateTime>>;

    /// Upsert the watermark for an (environment, table) pair.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn set_watermark(
        &self,
        env: &Environment,
        table: &TableName,
        last_modified: NaiveDateTime,
    ) -> error::Result<()>;

    /// All landing control rows for an environment, ordered by table name.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_watermarks(&self, env: &Environment) -> error::Result<Vec<WatermarkRecord>>;

    /// All staging control rows ordered by `ROW_NUM`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn staging_records(&self) -> error::Result<Vec<StagingControlRecord>>;

    /// Insert a staging control row if its target is not registered yet.
    ///
    /// New rows get `ROW_NUM = max + 1` and the epoch sentinel as last run.
    /// Returns `true` if a row was inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn register_staging(&self, entry: &StagingEntry) -> error::Result<bool>;

    /// Set `LAST_RUN_DATE_TIME` for the entry's target, inserting the row
    /// (with the next `ROW_NUM`) when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn advance_staging(&self, entry: &StagingEntry, last_run: NaiveDateTime)
        -> error::Result<()>;

    /// Begin a per-table run, returning its unique ID.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start_run(&self, phase: u8, table: &TableName) -> error::Result<i64>;

    /// Finalize a per-table run with status and stats.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats)
        -> error::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn WatermarkStore`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn WatermarkStore) {}
    }
}
