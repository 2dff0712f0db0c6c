//! Orchestration crate for the SuiteSync warehouse pipeline.

pub mod config;
pub mod ddl;
pub(crate) mod errors;
pub mod orchestrator;
pub mod phases;
pub mod resolve;
pub mod result;
pub mod sync;
pub mod transform;

// Re-export public API for convenience
pub use orchestrator::run_phase;
pub use phases::{Phase, PhaseContext};
pub use resolve::Backends;
pub use result::{PhaseReport, Step, TableOutcome, TableReport};
