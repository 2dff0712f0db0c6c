//! Warehouse writers for the SuiteSync pipeline.
//!
//! [`Warehouse`] covers the statements the four phases need: table DDL,
//! bulk append, keyed upsert, table-to-table merge and watermark-filtered
//! copies. `PostgreSQL` and `SQLite` implementations are provided.

pub mod error;
pub mod postgres;
pub mod sql;
pub mod sqlite;
pub mod warehouse;

pub use error::WarehouseError;
pub use postgres::PostgresWarehouse;
pub use sqlite::SqliteWarehouse;
pub use warehouse::{
    with_transaction, AuditColumn, CreateMode, Dialect, MergeColumn, MergeCounts, MergePlan,
    TableDef, TargetColumn, Warehouse,
};
