//! Source reader error types.

/// Errors produced by [`SourceReader`](crate::SourceReader) operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Could not reach the source.
    #[error("source connection failed: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A catalog or read query was rejected.
    #[error("source query failed ({context}): {source}")]
    Query {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The requested table is not present in the source catalog.
    #[error("source table '{0}' not found")]
    TableNotFound(String),

    /// A cell could not be decoded into a [`Value`](suitesync_types::Value).
    #[error("cannot decode column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Internal mutex was poisoned by a panicked thread.
    #[error("source connection lock poisoned")]
    LockPoisoned,
}

impl SourceError {
    pub fn connection(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Connection(Box::new(err))
    }

    pub fn query(
        context: impl Into<String>,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Query {
            context: context.into(),
            source: Box::new(err),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_names_context() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "syntax error");
        let msg = SourceError::query("fetch VENDORS", inner).to_string();
        assert_eq!(msg, "source query failed (fetch VENDORS): syntax error");
    }

    #[test]
    fn table_not_found_displays_name() {
        let msg = SourceError::TableNotFound("ITEMS".into()).to_string();
        assert!(msg.contains("'ITEMS'"));
    }
}
