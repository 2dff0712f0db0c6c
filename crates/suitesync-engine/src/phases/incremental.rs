//! Phase 1: watermark-driven delta load into landing.

use suitesync_source::SourceReader;

use crate::phases::{Phase, PhaseContext};
use crate::result::{Step, TableReport};
use crate::sync::{sync_table, LoadMode};

pub fn incremental_load(ctx: &PhaseContext<'_>, source: &dyn SourceReader) -> Vec<TableReport> {
    ctx.config
        .tables
        .iter()
        .map(|table| {
            ctx.tracked(Phase::Incremental, Step::Incremental, &table.name, || {
                sync_table(ctx, source, table, LoadMode::Incremental)
            })
        })
        .collect()
}
