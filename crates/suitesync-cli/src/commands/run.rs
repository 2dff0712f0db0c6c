use std::path::Path;

use anyhow::{Context, Result};

use suitesync_engine::config::parser;
use suitesync_engine::config::validator;
use suitesync_engine::{run_phase, Backends, Phase};
use suitesync_types::state::Environment;
use suitesync_types::time::format_timestamp;

/// Execute one phase: parse, validate, connect, run, print the report.
///
/// Per-table failures are printed but do not fail the command.
pub fn execute(config_path: &Path, phase: u8) -> Result<()> {
    let phase = Phase::try_from(phase).map_err(anyhow::Error::msg)?;

    // 1. Parse and validate configuration
    let config = parser::parse_pipeline(config_path)
        .with_context(|| format!("Failed to parse pipeline: {}", config_path.display()))?;
    validator::validate_pipeline(&config)?;

    tracing::info!(
        environment = config.environment,
        phase = phase.number(),
        tables = config.tables.len(),
        "Pipeline validated"
    );

    // 2. Connect once for the whole run
    let backends = Backends::connect(&config, phase)?;
    let ctx = backends.context(&config);

    // 3. Run
    let report = run_phase(phase, &ctx)?;

    for table in &report.tables {
        println!("  {table}");
    }
    println!("{report}");

    if phase.reads_source() {
        let env = Environment::new(config.environment.as_str());
        match backends.state.list_watermarks(&env) {
            Ok(records) => {
                for record in records {
                    tracing::debug!(
                        table = record.table_name.as_str(),
                        watermark = %format_timestamp(&record.last_modified_date),
                        "Stored watermark"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not list stored watermarks"),
        }
    }

    if report.failed() > 0 {
        tracing::warn!(failed = report.failed(), "Some tables failed; see log for details");
    }
    Ok(())
}
