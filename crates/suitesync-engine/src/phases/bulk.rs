//! Phase 0, second half: full load of every configured table.

use suitesync_source::SourceReader;

use crate::phases::{Phase, PhaseContext};
use crate::result::{Step, TableOutcome, TableReport};
use crate::sync::{sync_table, LoadMode};

/// Bulk load every configured table, skipping those listed in
/// `failed_creates`.
pub fn bulk_load(
    ctx: &PhaseContext<'_>,
    source: &dyn SourceReader,
    failed_creates: &[String],
) -> Vec<TableReport> {
    ctx.config
        .tables
        .iter()
        .map(|table| {
            ctx.tracked(Phase::CreateAndLoad, Step::BulkLoad, &table.name, || {
                if failed_creates
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(&table.name))
                {
                    return TableOutcome::Skipped {
                        reason: "table creation failed".to_string(),
                    };
                }
                sync_table(ctx, source, table, LoadMode::Full)
            })
        })
        .collect()
}
