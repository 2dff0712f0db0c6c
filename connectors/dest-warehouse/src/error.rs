//! Warehouse error types.

/// Errors produced by [`Warehouse`](crate::Warehouse) operations.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// Could not reach or open the warehouse.
    #[error("warehouse connection failed: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A statement was rejected.
    #[error("warehouse statement failed ({context}): {source}")]
    Statement {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Dataset or merge columns do not line up with the target table.
    #[error("schema mismatch: {0}")]
    Schema(String),

    /// File-system I/O failure (e.g. creating the layer directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("warehouse connection lock poisoned")]
    LockPoisoned,
}

impl WarehouseError {
    pub fn connection(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Connection(Box::new(err))
    }

    pub fn statement(
        context: impl Into<String>,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Statement {
            context: context.into(),
            source: Box::new(err),
        }
    }

    /// Whether this failure is a schema mismatch rather than a rejected statement.
    #[must_use]
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, WarehouseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_error_displays_context() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "relation does not exist");
        let err = WarehouseError::statement("truncate FINANCE_TRANSIENT.VENDORS", inner);
        assert_eq!(
            err.to_string(),
            "warehouse statement failed (truncate FINANCE_TRANSIENT.VENDORS): relation does not exist"
        );
        assert!(!err.is_schema());
    }

    #[test]
    fn schema_error_is_flagged() {
        let err = WarehouseError::Schema("column X not in target".into());
        assert!(err.is_schema());
        assert_eq!(err.to_string(), "schema mismatch: column X not in target");
    }
}
