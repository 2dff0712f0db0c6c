//! The four pipeline phases.
//!
//! Each phase is a sequential per-table loop. A table's failure is recorded
//! in its [`TableOutcome`] and the loop moves on; only failures that make
//! every table impossible (control table unreadable, source missing) abort
//! the phase.

pub mod bulk;
pub mod create;
pub mod datamart;
pub mod incremental;
pub mod staging;

use std::fmt;

use suitesync_source::SourceReader;
use suitesync_state::WatermarkStore;
use suitesync_types::state::TableName;
use suitesync_warehouse::Warehouse;

use crate::config::types::PipelineConfig;
use crate::result::{Step, TableOutcome, TableReport};

/// Pipeline phase selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Create landing and transient tables, then bulk load.
    CreateAndLoad,
    Incremental,
    LandingToStaging,
    StagingToDatamart,
}

impl Phase {
    pub const ALL: [Self; 4] = [
        Self::CreateAndLoad,
        Self::Incremental,
        Self::LandingToStaging,
        Self::StagingToDatamart,
    ];

    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::CreateAndLoad => 0,
            Self::Incremental => 1,
            Self::LandingToStaging => 2,
            Self::StagingToDatamart => 3,
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::CreateAndLoad => "create tables and bulk load",
            Self::Incremental => "incremental load",
            Self::LandingToStaging => "landing to staging",
            Self::StagingToDatamart => "staging to datamart",
        }
    }

    /// Whether the phase reads from the source system.
    #[must_use]
    pub fn reads_source(self) -> bool {
        matches!(self, Self::CreateAndLoad | Self::Incremental)
    }
}

impl TryFrom<u8> for Phase {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|p| p.number() == value)
            .ok_or_else(|| format!("invalid phase {value}, expected 0-3"))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.description())
    }
}

/// Backends and configuration shared by every phase of one run.
#[derive(Clone, Copy)]
pub struct PhaseContext<'a> {
    pub config: &'a PipelineConfig,
    /// Present only when the run needs the source system.
    pub source: Option<&'a dyn SourceReader>,
    pub warehouse: &'a dyn Warehouse,
    pub state: &'a dyn WatermarkStore,
}

impl<'a> PhaseContext<'a> {
    /// Run one table step, recording it in the run history table.
    ///
    /// Run history is best-effort: a failure to record is logged and the
    /// table's own outcome is kept.
    pub(crate) fn tracked(
        &self,
        phase: Phase,
        step: Step,
        table: &str,
        f: impl FnOnce() -> TableOutcome,
    ) -> TableReport {
        let run_id = match self.state.start_run(phase.number(), &TableName::new(table)) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(table, error = %e, "Could not record run start");
                None
            }
        };

        let outcome = f();
        log_outcome(phase, step, table, &outcome);

        if let Some(run_id) = run_id {
            let (status, stats) = outcome.run_record();
            if let Err(e) = self.state.complete_run(run_id, status, &stats) {
                tracing::warn!(table, run_id, error = %e, "Could not record run completion");
            }
        }

        TableReport {
            table: table.to_string(),
            step,
            outcome,
        }
    }

    pub(crate) fn source(&self) -> anyhow::Result<&'a dyn SourceReader> {
        self.source
            .ok_or_else(|| anyhow::anyhow!("no source reader connected for this run"))
    }
}

fn log_outcome(phase: Phase, step: Step, table: &str, outcome: &TableOutcome) {
    let phase = phase.number();
    let step = step.as_str();
    match outcome {
        TableOutcome::Synced {
            rows_read,
            rows_written,
            ..
        } => tracing::info!(phase, step, table, rows_read, rows_written, "Table synced"),
        TableOutcome::NoData => tracing::info!(phase, step, table, "No new rows"),
        TableOutcome::Skipped { reason } => {
            tracing::warn!(phase, step, table, reason = reason.as_str(), "Table skipped");
        }
        TableOutcome::Failed(err) => {
            tracing::error!(phase, step, table, error = %err, "Table failed");
        }
    }
}
