//! Mapping backend failures onto the per-table [`SyncError`] taxonomy.

use suitesync_source::SourceError;
use suitesync_state::StateError;
use suitesync_types::{ErrorCategory, SyncError, SyncStage};
use suitesync_warehouse::WarehouseError;

/// A source failure during the fetch step.
pub(crate) fn from_source(err: &SourceError) -> SyncError {
    match err {
        SourceError::TableNotFound(_) | SourceError::Decode { .. } => {
            SyncError::schema(SyncStage::Fetch, err.to_string())
        }
        SourceError::Connection(_) => {
            SyncError::new(SyncStage::Fetch, ErrorCategory::Connection, err.to_string())
        }
        _ => SyncError::fetch(err.to_string()),
    }
}

/// A warehouse failure. Schema mismatches keep their own category.
pub(crate) fn from_warehouse(stage: SyncStage, err: &WarehouseError) -> SyncError {
    if err.is_schema() {
        return SyncError::schema(stage, err.to_string());
    }
    match err {
        WarehouseError::Connection(_) => {
            SyncError::new(stage, ErrorCategory::Connection, err.to_string())
        }
        _ => SyncError::new(stage, ErrorCategory::Database, err.to_string()),
    }
}

pub(crate) fn from_state(stage: SyncStage, err: &StateError) -> SyncError {
    SyncError::state(stage, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_source_table_is_schema_error() {
        let err = from_source(&SourceError::TableNotFound("VENDORS".into()));
        assert_eq!(err.stage, SyncStage::Fetch);
        assert_eq!(err.category, ErrorCategory::Schema);
    }

    #[test]
    fn warehouse_schema_error_keeps_category() {
        let err = from_warehouse(
            SyncStage::Write,
            &WarehouseError::Schema("column 'X' not found".into()),
        );
        assert_eq!(err.category, ErrorCategory::Schema);
        assert_eq!(err.stage, SyncStage::Write);

        let err = from_warehouse(SyncStage::Write, &WarehouseError::LockPoisoned);
        assert_eq!(err.category, ErrorCategory::Database);
    }

    #[test]
    fn state_error_maps_to_state_category() {
        let err = from_state(SyncStage::Advance, &StateError::LockPoisoned);
        assert_eq!(err.category, ErrorCategory::State);
        assert_eq!(err.stage, SyncStage::Advance);
    }
}
