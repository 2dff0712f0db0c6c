//! Structured per-table error model.
//!
//! [`SyncError`] carries the pipeline stage that failed and a broad
//! classification. Construct via the stage-specific factory methods.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid configuration.
    Config,
    /// Backend unreachable or connection lost.
    Connection,
    /// Query or statement rejected by a backend.
    Database,
    /// Row values that cannot be coerced to the target shape.
    Data,
    /// Source and target schemas do not line up.
    Schema,
    /// Watermark or run-history storage failure.
    State,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Connection => "connection",
            Self::Database => "database",
            Self::Data => "data",
            Self::Schema => "schema",
            Self::State => "state",
        };
        f.write_str(s)
    }
}

/// Step of the per-table sync where the failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    /// Reading the previous watermark.
    Watermark,
    /// Describing or querying the source.
    Fetch,
    /// Normalizing fetched rows.
    Transform,
    /// DDL, truncate, append or merge against the warehouse.
    Write,
    /// Advancing the watermark after a committed write.
    Advance,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Watermark => "watermark",
            Self::Fetch => "fetch",
            Self::Transform => "transform",
            Self::Write => "write",
            Self::Advance => "advance",
        };
        f.write_str(s)
    }
}

/// Failure of one table's sync. The table is skipped and its watermark
/// stays where it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{stage} failed [{category}]: {message}")]
pub struct SyncError {
    pub stage: SyncStage,
    pub category: ErrorCategory,
    pub message: String,
}

impl SyncError {
    pub fn new(stage: SyncStage, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            stage,
            category,
            message: message.into(),
        }
    }

    /// Source query or description failed.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::new(SyncStage::Fetch, ErrorCategory::Database, message)
    }

    /// A row value could not be coerced.
    pub fn transform(message: impl Into<String>) -> Self {
        Self::new(SyncStage::Transform, ErrorCategory::Data, message)
    }

    /// Warehouse statement failed.
    pub fn write(message: impl Into<String>) -> Self {
        Self::new(SyncStage::Write, ErrorCategory::Database, message)
    }

    /// Source and target schemas disagree.
    pub fn schema(stage: SyncStage, message: impl Into<String>) -> Self {
        Self::new(stage, ErrorCategory::Schema, message)
    }

    /// Watermark store failed at the given stage.
    pub fn state(stage: SyncStage, message: impl Into<String>) -> Self {
        Self::new(stage, ErrorCategory::State, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factories_set_stage_and_category() {
        let e = SyncError::fetch("boom");
        assert_eq!(e.stage, SyncStage::Fetch);
        assert_eq!(e.category, ErrorCategory::Database);

        let e = SyncError::transform("bad pk");
        assert_eq!(e.stage, SyncStage::Transform);
        assert_eq!(e.category, ErrorCategory::Data);

        let e = SyncError::schema(SyncStage::Write, "no key");
        assert_eq!(e.category, ErrorCategory::Schema);

        let e = SyncError::state(SyncStage::Advance, "locked");
        assert_eq!(e.stage, SyncStage::Advance);
        assert_eq!(e.category, ErrorCategory::State);
    }

    #[test]
    fn display_includes_stage_category_and_message() {
        let e = SyncError::write("relation does not exist");
        assert_eq!(
            e.to_string(),
            "write failed [database]: relation does not exist"
        );
    }

    #[test]
    fn serde_roundtrip() {
        let e = SyncError::fetch("timeout");
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"stage\":\"fetch\""));
        let back: SyncError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
