//! Watermark persistence for the SuiteSync pipeline.
//!
//! Provides the [`WatermarkStore`] trait plus `SQLite` and `PostgreSQL`
//! implementations holding the landing control table, the staging control
//! table and per-table run history.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod postgres;
pub mod schema;
pub mod sqlite;

pub use backend::WatermarkStore;
pub use error::StateError;
pub use postgres::PostgresWatermarkStore;
pub use schema::ControlTables;
pub use sqlite::SqliteWatermarkStore;
