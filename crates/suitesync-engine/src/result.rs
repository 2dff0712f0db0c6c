//! Per-table outcomes and the per-phase report built from them.

use std::fmt;

use chrono::NaiveDateTime;
use suitesync_types::state::{RunStats, RunStatus};
use suitesync_types::time::format_timestamp;
use suitesync_types::SyncError;

use crate::phases::Phase;

/// How a single table ended within a phase.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOutcome {
    Synced {
        rows_read: u64,
        rows_written: u64,
        inserted: u64,
        updated: u64,
        /// Watermark written after commit; `None` for steps that keep none.
        watermark: Option<NaiveDateTime>,
    },
    NoData,
    Skipped {
        reason: String,
    },
    Failed(SyncError),
}

impl TableOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Synced { .. } => "synced",
            Self::NoData => "no data",
            Self::Skipped { .. } => "skipped",
            Self::Failed(_) => "failed",
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Status and counters for the run history table.
    #[must_use]
    pub fn run_record(&self) -> (RunStatus, RunStats) {
        match self {
            Self::Synced {
                rows_read,
                rows_written,
                ..
            } => (
                RunStatus::Completed,
                RunStats {
                    records_read: *rows_read,
                    records_written: *rows_written,
                    error_message: None,
                },
            ),
            Self::NoData => (RunStatus::Completed, RunStats::default()),
            Self::Skipped { reason } => (
                RunStatus::Skipped,
                RunStats {
                    error_message: Some(reason.clone()),
                    ..RunStats::default()
                },
            ),
            Self::Failed(err) => (
                RunStatus::Failed,
                RunStats {
                    error_message: Some(err.to_string()),
                    ..RunStats::default()
                },
            ),
        }
    }
}

/// Step within a phase that produced a [`TableReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Create,
    BulkLoad,
    Incremental,
    Staging,
    Datamart,
}

impl Step {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::BulkLoad => "bulk load",
            Self::Incremental => "incremental",
            Self::Staging => "staging",
            Self::Datamart => "datamart",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableReport {
    pub table: String,
    pub step: Step,
    pub outcome: TableOutcome,
}

impl fmt::Display for TableReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<32} {:<12} {:<8}",
            self.table,
            self.step.as_str(),
            self.outcome.label()
        )?;
        match &self.outcome {
            TableOutcome::Synced {
                rows_read,
                rows_written,
                inserted,
                updated,
                watermark,
            } => {
                write!(
                    f,
                    " read={rows_read} written={rows_written} inserted={inserted} updated={updated}"
                )?;
                if let Some(ts) = watermark {
                    write!(f, " watermark={}", format_timestamp(ts))?;
                }
                Ok(())
            }
            TableOutcome::NoData => Ok(()),
            TableOutcome::Skipped { reason } => write!(f, " {reason}"),
            TableOutcome::Failed(err) => write!(f, " {err}"),
        }
    }
}

/// Everything one phase did.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub tables: Vec<TableReport>,
}

impl PhaseReport {
    #[must_use]
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            tables: Vec::new(),
        }
    }

    /// Synced or no-data tables.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Synced { .. } | TableOutcome::NoData))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Skipped { .. }))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(TableOutcome::is_failed)
    }

    /// First report for `table` at `step`, matched case-insensitively.
    #[must_use]
    pub fn outcome(&self, table: &str, step: Step) -> Option<&TableOutcome> {
        self.tables
            .iter()
            .find(|r| r.step == step && r.table.eq_ignore_ascii_case(table))
            .map(|r| &r.outcome)
    }

    fn count(&self, pred: impl Fn(&TableOutcome) -> bool) -> usize {
        self.tables.iter().filter(|r| pred(&r.outcome)).count()
    }
}

impl fmt::Display for PhaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Phase {} ({}): {} completed, {} skipped, {} failed",
            self.phase.number(),
            self.phase.description(),
            self.completed(),
            self.skipped(),
            self.failed()
        )
    }
}
