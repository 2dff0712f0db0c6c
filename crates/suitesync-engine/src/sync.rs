//! Watermark-driven sync of one configured table into landing.
//!
//! Read the watermark, fetch, normalize, upsert inside one warehouse
//! transaction, and only after that commit advance the watermark. Any
//! failure before the commit leaves the watermark where it was, so the next
//! run retries the same window.
//!
//! The new watermark is read from the source's own clock before the fetch,
//! so it compares against the same clock as the modification column.

use chrono::{Local, NaiveDateTime};
use suitesync_source::{Since, SourceReader};
use suitesync_types::time::{epoch, format_timestamp, truncate_subsec};
use suitesync_types::state::{Environment, TableName};
use suitesync_types::{Dataset, SyncError, SyncStage, TableRef};
use suitesync_warehouse::{
    with_transaction, MergeColumn, MergeCounts, MergePlan, TargetColumn, Warehouse,
    WarehouseError,
};

use crate::config::types::{MergeStrategy, TableConfig};
use crate::errors;
use crate::phases::PhaseContext;
use crate::result::TableOutcome;
use crate::transform::transform;

/// Which rows to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Every source row.
    Full,
    /// Rows modified after the stored watermark.
    Incremental,
}

/// Local wall-clock time, truncated to the canonical precision.
///
/// Phases that run without a source connection use this clock. Landing rows
/// carry the source's local modification times, not UTC.
#[must_use]
pub fn processing_time() -> NaiveDateTime {
    truncate_subsec(Local::now().naive_local())
}

/// Sync `table` and report how it ended. Never panics on backend failure.
pub fn sync_table(
    ctx: &PhaseContext<'_>,
    source: &dyn SourceReader,
    table: &TableConfig,
    mode: LoadMode,
) -> TableOutcome {
    try_sync(ctx, source, table, mode).unwrap_or_else(TableOutcome::Failed)
}

fn try_sync(
    ctx: &PhaseContext<'_>,
    source: &dyn SourceReader,
    table: &TableConfig,
    mode: LoadMode,
) -> Result<TableOutcome, SyncError> {
    let env = Environment::new(ctx.config.environment.as_str());
    let name = TableName::new(table.name.as_str());

    let previous = ctx
        .state
        .get_watermark(&env, &name)
        .map_err(|e| errors::from_state(SyncStage::Watermark, &e))?
        .unwrap_or_else(epoch);

    let started = source.now().map_err(|e| errors::from_source(&e))?;
    let since = match mode {
        LoadMode::Full => None,
        LoadMode::Incremental => Some(Since::new(table.modified_column(), previous)),
    };
    tracing::debug!(
        table = table.name.as_str(),
        watermark = %format_timestamp(&previous),
        ?mode,
        "Fetching source rows"
    );
    let data = source
        .fetch(&table.name, since.as_ref())
        .map_err(|e| errors::from_source(&e))?;
    if data.is_empty() {
        return Ok(TableOutcome::NoData);
    }
    let rows_read = u64::try_from(data.len()).unwrap_or_default();

    let mut data = transform(data, &table.primary_key)?;
    let key_idx: Vec<usize> = table
        .primary_key
        .iter()
        .filter_map(|k| data.column_index(k))
        .collect();
    let collapsed = data.dedup_by_key(&key_idx);
    if collapsed > 0 {
        tracing::warn!(
            table = table.name.as_str(),
            rows = collapsed,
            "Collapsed rows sharing a primary key, keeping the last"
        );
    }

    let layers = &ctx.config.layers;
    let landing = TableRef::new(layers.landing_schema.as_str(), table.target_name());
    let counts = match ctx.config.incremental.strategy {
        MergeStrategy::Transient => {
            let transient = TableRef::new(layers.transient_schema.as_str(), table.target_name());
            merge_via_transient(ctx.warehouse, &data, &transient, &landing, &table.primary_key)
        }
        MergeStrategy::Direct => with_transaction(ctx.warehouse, |w| {
            w.upsert(&landing, &data, &table.primary_key)
        }),
    }
    .map_err(|e| errors::from_warehouse(SyncStage::Write, &e))?;

    let watermark = previous.max(started);
    ctx.state
        .set_watermark(&env, &name, watermark)
        .map_err(|e| errors::from_state(SyncStage::Advance, &e))?;

    Ok(TableOutcome::Synced {
        rows_read,
        rows_written: counts.total(),
        inserted: counts.inserted,
        updated: counts.updated,
        watermark: Some(watermark),
    })
}

/// Truncate the transient table, append `data`, then merge into landing.
///
/// A missing transient table is recreated from landing's structure first.
///
/// # Errors
///
/// Returns the first warehouse failure; the transaction is rolled back.
pub fn merge_via_transient(
    warehouse: &dyn Warehouse,
    data: &Dataset,
    transient: &TableRef,
    landing: &TableRef,
    key: &[String],
) -> Result<MergeCounts, WarehouseError> {
    let target = warehouse.columns(landing)?;
    if target.is_empty() {
        return Err(WarehouseError::Schema(format!(
            "landing table {landing} does not exist"
        )));
    }
    if !warehouse.table_exists(transient)? {
        tracing::info!(table = %transient, "Creating missing transient table");
        warehouse.clone_table_structure(landing, transient)?;
    }

    let plan = MergePlan {
        source: transient.clone(),
        target: landing.clone(),
        key: resolve(landing, &target, key.iter().map(String::as_str))?,
        columns: resolve(landing, &target, data.columns.iter().map(|c| c.name.as_str()))?,
        audit: None,
    };

    with_transaction(warehouse, |w| {
        w.truncate(transient)?;
        w.append(transient, data)?;
        w.merge_table(&plan)
    })
}

fn resolve<'a>(
    table: &TableRef,
    target: &[TargetColumn],
    names: impl Iterator<Item = &'a str>,
) -> Result<Vec<MergeColumn>, WarehouseError> {
    names
        .map(|name| {
            target
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(name))
                .map(|t| MergeColumn::same(t.name.as_str()))
                .ok_or_else(|| {
                    WarehouseError::Schema(format!("column '{name}' not found in {table}"))
                })
        })
        .collect()
}
