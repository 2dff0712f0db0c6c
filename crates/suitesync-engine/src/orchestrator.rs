//! Phase dispatch: prepare the warehouse layers, run one phase, collect
//! its report.

use anyhow::{Context, Result};

use crate::phases::{bulk, create, datamart, incremental, staging, Phase, PhaseContext};
use crate::result::{PhaseReport, Step, TableOutcome};

/// Run `phase` against the given backends.
///
/// # Errors
///
/// Returns an error only for failures that stop the whole phase: a layer
/// schema cannot be prepared, the source is missing for a source-reading
/// phase, or a control table cannot be read. Per-table failures are
/// carried in the report.
pub fn run_phase(phase: Phase, ctx: &PhaseContext<'_>) -> Result<PhaseReport> {
    tracing::info!(phase = phase.number(), "Starting phase: {}", phase.description());

    // SQLite cannot ATTACH inside a transaction; prepare layers up front.
    for schema in ctx.config.layers.schemas() {
        ctx.warehouse
            .ensure_schema(schema)
            .with_context(|| format!("Failed to prepare warehouse schema {schema}"))?;
    }

    let mut report = PhaseReport::new(phase);
    match phase {
        Phase::CreateAndLoad => {
            let source = ctx.source()?;
            let created = create::create_tables(ctx, source);
            let failed: Vec<String> = created
                .iter()
                .filter(|r| r.outcome.is_failed())
                .map(|r| r.table.clone())
                .collect();
            report.tables.extend(created);
            report.tables.extend(bulk::bulk_load(ctx, source, &failed));
        }
        Phase::Incremental => {
            let source = ctx.source()?;
            report
                .tables
                .extend(incremental::incremental_load(ctx, source));
        }
        Phase::LandingToStaging => {
            report.tables.extend(staging::landing_to_staging(ctx)?);
        }
        Phase::StagingToDatamart => {
            report.tables.extend(datamart::staging_to_datamart(ctx)?);
        }
    }

    let rows_written: u64 = report
        .tables
        .iter()
        .filter(|r| r.step != Step::Create)
        .map(|r| match r.outcome {
            TableOutcome::Synced { rows_written, .. } => rows_written,
            _ => 0,
        })
        .sum();
    tracing::info!(
        phase = phase.number(),
        completed = report.completed(),
        skipped = report.skipped(),
        failed = report.failed(),
        rows_written,
        "Phase finished"
    );
    Ok(report)
}
