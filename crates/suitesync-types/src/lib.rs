//! Shared SuiteSync data model types.
//!
//! Values, datasets, table references, watermark records and the structured
//! per-table error model. Kept free of database dependencies so the source,
//! warehouse, state and engine crates can share them.

pub mod dataset;
pub mod error;
pub mod state;
pub mod table;
pub mod time;
pub mod value;

pub use dataset::{Column, Dataset, Row};
pub use error::{ErrorCategory, SyncError, SyncStage};
pub use table::TableRef;
pub use value::{ColumnType, Value};
