//! Source readers for the SuiteSync pipeline.
//!
//! [`SourceReader`] is the seam between the pipeline and an external tabular
//! source. `PostgreSQL` and `SQLite` implementations are provided.

pub mod error;
pub mod identifier;
pub mod postgres;
pub mod reader;
pub mod sqlite;

pub use error::SourceError;
pub use postgres::PostgresSource;
pub use reader::{Since, SourceColumn, SourceReader};
pub use sqlite::SqliteSource;
