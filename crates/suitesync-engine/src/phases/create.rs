//! Phase 0, first half: landing and transient table creation.

use suitesync_source::SourceReader;
use suitesync_types::{SyncError, SyncStage, TableRef};
use suitesync_warehouse::{with_transaction, CreateMode};

use crate::config::types::TableConfig;
use crate::ddl::{landing_table, TypeMap};
use crate::errors;
use crate::phases::{Phase, PhaseContext};
use crate::result::{Step, TableOutcome, TableReport};

/// Create the landing table and its transient twin for every configured
/// table.
pub fn create_tables(ctx: &PhaseContext<'_>, source: &dyn SourceReader) -> Vec<TableReport> {
    let types = TypeMap::with_overrides(&ctx.config.type_map);
    ctx.config
        .tables
        .iter()
        .map(|table| {
            ctx.tracked(Phase::CreateAndLoad, Step::Create, &table.name, || {
                create_one(ctx, source, table, &types).unwrap_or_else(TableOutcome::Failed)
            })
        })
        .collect()
}

fn create_one(
    ctx: &PhaseContext<'_>,
    source: &dyn SourceReader,
    table: &TableConfig,
    types: &TypeMap,
) -> Result<TableOutcome, SyncError> {
    let layers = &ctx.config.layers;
    let landing = TableRef::new(layers.landing_schema.as_str(), table.target_name());
    let transient = TableRef::new(layers.transient_schema.as_str(), table.target_name());

    let columns = source
        .describe(&table.name)
        .map_err(|e| errors::from_source(&e))?;
    let def = landing_table(landing.clone(), &columns, &table.primary_key, types)?;
    tracing::debug!(table = %landing, columns = def.columns.len(), "Creating landing table");

    let mode = ctx.config.create_mode;
    with_transaction(ctx.warehouse, |w| {
        if mode == CreateMode::IfNotExists && w.table_exists(&landing)? {
            tracing::info!(table = %landing, "Landing table exists, keeping it");
        } else {
            w.create_table(&def, mode)?;
        }
        w.clone_table_structure(&landing, &transient)
    })
    .map_err(|e| errors::from_warehouse(SyncStage::Write, &e))?;

    Ok(TableOutcome::Synced {
        rows_read: 0,
        rows_written: 0,
        inserted: 0,
        updated: 0,
        watermark: None,
    })
}
