//! Phase 2: landing to staging.
//!
//! Driven by the staging control table. A record's target is truncated and
//! reloaded only when its landing view holds rows newer than the record's
//! `LAST_RUN_DATE_TIME`.

use anyhow::Context;
use suitesync_types::state::{StagingControlRecord, StagingEntry};
use suitesync_types::time::format_timestamp;
use suitesync_types::{SyncError, SyncStage, TableRef};
use suitesync_warehouse::with_transaction;

use crate::config::types::PipelineConfig;
use crate::errors;
use crate::phases::{Phase, PhaseContext};
use crate::result::{Step, TableOutcome, TableReport};
use crate::sync::processing_time;

/// Control entries for the configured seeds.
#[must_use]
pub fn seed_entries(config: &PipelineConfig) -> Vec<StagingEntry> {
    let layers = &config.layers;
    config
        .staging
        .tables
        .iter()
        .map(|seed| StagingEntry {
            src_db: layers.landing_db.clone(),
            src_schema: layers.landing_schema.clone(),
            src_table: seed.source_table.clone(),
            src_view: seed.source_view.clone(),
            tgt_db: layers.staging_db.clone(),
            tgt_schema: layers.staging_schema.clone(),
            tgt_table: seed.target.clone(),
        })
        .collect()
}

/// Register missing seeds, then refresh every staging control record.
///
/// # Errors
///
/// Fails when the staging control table cannot be written or read.
pub fn landing_to_staging(ctx: &PhaseContext<'_>) -> anyhow::Result<Vec<TableReport>> {
    for entry in seed_entries(ctx.config) {
        let added = ctx
            .state
            .register_staging(&entry)
            .with_context(|| format!("Failed to register staging target {}", entry.tgt_table))?;
        if added {
            tracing::info!(table = entry.tgt_table.as_str(), "Registered staging control record");
        }
    }

    let records = ctx
        .state
        .staging_records()
        .context("Failed to read staging control table")?;
    if records.is_empty() {
        tracing::warn!("Staging control table has no records");
    }

    Ok(records
        .iter()
        .map(|record| {
            ctx.tracked(Phase::LandingToStaging, Step::Staging, &record.tgt_table, || {
                stage_one(ctx, record).unwrap_or_else(TableOutcome::Failed)
            })
        })
        .collect())
}

fn stage_one(
    ctx: &PhaseContext<'_>,
    record: &StagingControlRecord,
) -> Result<TableOutcome, SyncError> {
    let warehouse = ctx.warehouse;
    let change_column = ctx.config.staging.change_column.as_str();
    let from = TableRef::new(record.src_schema.as_str(), record.src_view.as_str());
    let to = TableRef::new(record.tgt_schema.as_str(), record.tgt_table.as_str());
    let last_run = record.last_run_date_time;

    for schema in [&record.src_schema, &record.tgt_schema] {
        warehouse
            .ensure_schema(schema)
            .map_err(|e| errors::from_warehouse(SyncStage::Write, &e))?;
    }

    let started = processing_time();
    let newer = warehouse
        .count_newer(&from, change_column, last_run)
        .map_err(|e| errors::from_warehouse(SyncStage::Fetch, &e))?;
    tracing::debug!(
        source = %from,
        since = %format_timestamp(&last_run),
        rows = newer,
        "Checked landing view for new rows"
    );
    if newer == 0 {
        return Ok(TableOutcome::NoData);
    }

    let written = with_transaction(warehouse, |w| {
        w.truncate(&to)?;
        w.insert_newer(&from, &to, change_column, last_run)
    })
    .map_err(|e| errors::from_warehouse(SyncStage::Write, &e))?;

    let watermark = last_run.max(started);
    ctx.state
        .advance_staging(&record.entry(), watermark)
        .map_err(|e| errors::from_state(SyncStage::Advance, &e))?;

    Ok(TableOutcome::Synced {
        rows_read: newer,
        rows_written: written,
        inserted: written,
        updated: 0,
        watermark: Some(watermark),
    })
}
