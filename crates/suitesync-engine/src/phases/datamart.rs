//! Phase 3: staging views merged into datamart dimension tables.
//!
//! Each configured view maps to one dimension table. The merge carries the
//! columns both sides share; the audit column is set on insert only.

use anyhow::Context;
use suitesync_types::{SyncError, SyncStage, TableRef};
use suitesync_warehouse::{
    with_transaction, AuditColumn, MergeColumn, MergePlan, TargetColumn, Warehouse,
    WarehouseError,
};

use crate::config::types::ViewMapping;
use crate::errors;
use crate::phases::{Phase, PhaseContext};
use crate::result::{Step, TableOutcome, TableReport};
use crate::sync::processing_time;

/// Columns a source view and a target table have in common.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonColumns {
    /// Shared columns in source order, each side's spelling kept.
    pub columns: Vec<MergeColumn>,
    /// Source columns the target lacks; left out of the merge.
    pub source_only: Vec<String>,
}

/// Intersect `source` and `target` by name (case-insensitive), leaving out
/// the `audit` column.
#[must_use]
pub fn common_columns(source: &[TargetColumn], target: &[TargetColumn], audit: &str) -> CommonColumns {
    let mut columns = Vec::new();
    let mut source_only = Vec::new();
    for s in source {
        if s.name.eq_ignore_ascii_case(audit) {
            continue;
        }
        match target.iter().find(|t| t.name.eq_ignore_ascii_case(&s.name)) {
            Some(t) => columns.push(MergeColumn {
                source: s.name.clone(),
                target: t.name.clone(),
            }),
            None => source_only.push(s.name.clone()),
        }
    }
    CommonColumns {
        columns,
        source_only,
    }
}

/// Datamart tables whose name starts with `prefix`, minus `exclude`.
///
/// # Errors
///
/// Returns the warehouse error when the schema cannot be listed.
pub fn discover_targets(
    warehouse: &dyn Warehouse,
    schema: &str,
    prefix: &str,
    exclude: &[String],
) -> Result<Vec<String>, WarehouseError> {
    let prefix = prefix.to_ascii_uppercase();
    Ok(warehouse
        .list_tables(schema)?
        .into_iter()
        .filter(|t| t.to_ascii_uppercase().starts_with(&prefix))
        .filter(|t| !exclude.iter().any(|e| e.eq_ignore_ascii_case(t)))
        .collect())
}

/// Merge every configured view into its discovered dimension table.
///
/// # Errors
///
/// Fails when the datamart schema cannot be listed.
pub fn staging_to_datamart(ctx: &PhaseContext<'_>) -> anyhow::Result<Vec<TableReport>> {
    let dm = &ctx.config.datamart;
    let schema = ctx.config.layers.datamart_schema.as_str();
    let discovered = discover_targets(ctx.warehouse, schema, &dm.target_prefix, &dm.exclude)
        .with_context(|| format!("Failed to list datamart tables in {schema}"))?;
    tracing::info!(schema, tables = discovered.len(), "Discovered datamart tables");

    for table in &discovered {
        if !dm.views.iter().any(|v| v.target.eq_ignore_ascii_case(table)) {
            tracing::warn!(table = table.as_str(), "Datamart table has no configured source view");
        }
    }

    Ok(dm
        .views
        .iter()
        .map(|view| {
            ctx.tracked(Phase::StagingToDatamart, Step::Datamart, &view.target, || {
                match discovered
                    .iter()
                    .find(|t| t.eq_ignore_ascii_case(&view.target))
                {
                    Some(target) => {
                        merge_view(ctx, view, target).unwrap_or_else(TableOutcome::Failed)
                    }
                    None => TableOutcome::Skipped {
                        reason: format!(
                            "no datamart table {} matching prefix '{}'",
                            view.target, dm.target_prefix
                        ),
                    },
                }
            })
        })
        .collect())
}

fn merge_view(
    ctx: &PhaseContext<'_>,
    view: &ViewMapping,
    target_name: &str,
) -> Result<TableOutcome, SyncError> {
    let warehouse = ctx.warehouse;
    let dm = &ctx.config.datamart;
    let source = TableRef::new(
        ctx.config.layers.staging_schema.as_str(),
        view.source_view.as_str(),
    );
    let target = TableRef::new(ctx.config.layers.datamart_schema.as_str(), target_name);

    let source_cols = warehouse
        .columns(&source)
        .map_err(|e| errors::from_warehouse(SyncStage::Fetch, &e))?;
    if source_cols.is_empty() {
        return Err(SyncError::schema(
            SyncStage::Fetch,
            format!("source view {source} does not exist"),
        ));
    }
    let target_cols = warehouse
        .columns(&target)
        .map_err(|e| errors::from_warehouse(SyncStage::Write, &e))?;

    let common = common_columns(&source_cols, &target_cols, &dm.audit_column);
    if !common.source_only.is_empty() {
        tracing::warn!(
            source = %source,
            target = %target,
            columns = %common.source_only.join(", "),
            "Source columns missing from target, left out of merge"
        );
    }
    let key = common
        .columns
        .iter()
        .find(|c| c.target.eq_ignore_ascii_case(&dm.merge_key))
        .cloned()
        .ok_or_else(|| {
            SyncError::schema(
                SyncStage::Write,
                format!(
                    "merge key '{}' is not shared by {source} and {target}",
                    dm.merge_key
                ),
            )
        })?;

    let audit = target_cols
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(&dm.audit_column))
        .map(|c| AuditColumn {
            name: c.name.clone(),
            value: processing_time(),
        });
    if audit.is_none() {
        tracing::warn!(target = %target, column = dm.audit_column.as_str(), "Target has no audit column");
    }

    let rows_read = warehouse
        .row_count(&source)
        .map_err(|e| errors::from_warehouse(SyncStage::Fetch, &e))?;
    let plan = MergePlan {
        source,
        target,
        key: vec![key],
        columns: common.columns,
        audit,
    };
    let counts = with_transaction(warehouse, |w| w.merge_table(&plan))
        .map_err(|e| errors::from_warehouse(SyncStage::Write, &e))?;

    Ok(TableOutcome::Synced {
        rows_read,
        rows_written: counts.total(),
        inserted: counts.inserted,
        updated: counts.updated,
        watermark: None,
    })
}
