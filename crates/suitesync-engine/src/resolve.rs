//! Backend construction from configuration.

use std::path::Path;

use anyhow::{Context, Result};
use suitesync_source::{PostgresSource, SourceReader, SqliteSource};
use suitesync_state::{PostgresWatermarkStore, SqliteWatermarkStore, WatermarkStore};
use suitesync_warehouse::{PostgresWarehouse, SqliteWarehouse, Warehouse};

use crate::config::types::{
    PipelineConfig, SourceConfig, StateBackendKind, WarehouseConfig, DEFAULT_STATE_PATH,
};
use crate::phases::{Phase, PhaseContext};

/// Connections opened once per run and kept for every table.
pub struct Backends {
    pub source: Option<Box<dyn SourceReader>>,
    pub warehouse: Box<dyn Warehouse>,
    pub state: Box<dyn WatermarkStore>,
}

impl Backends {
    /// Open every backend `phase` needs. The source is only opened for
    /// phases that read it.
    ///
    /// # Errors
    ///
    /// Returns an error naming the backend that could not be opened.
    pub fn connect(config: &PipelineConfig, phase: Phase) -> Result<Self> {
        let source = if phase.reads_source() {
            Some(create_source(&config.source)?)
        } else {
            None
        };
        Ok(Self {
            source,
            warehouse: create_warehouse(&config.warehouse)?,
            state: create_state_backend(config)?,
        })
    }

    #[must_use]
    pub fn context<'a>(&'a self, config: &'a PipelineConfig) -> PhaseContext<'a> {
        PhaseContext {
            config,
            source: self.source.as_deref(),
            warehouse: self.warehouse.as_ref(),
            state: self.state.as_ref(),
        }
    }
}

/// Open the source reader.
///
/// # Errors
///
/// Returns an error if the source cannot be reached.
pub fn create_source(config: &SourceConfig) -> Result<Box<dyn SourceReader>> {
    Ok(match config {
        SourceConfig::Postgres(pg) => Box::new(
            PostgresSource::connect(&pg.connection_string(), pg.schema.clone())
                .with_context(|| format!("Failed to connect to source at {}:{}", pg.host, pg.port))?,
        ),
        SourceConfig::Sqlite { path } => Box::new(
            SqliteSource::open(path)
                .with_context(|| format!("Failed to open source database {}", path.display()))?,
        ),
    })
}

/// Open the warehouse.
///
/// # Errors
///
/// Returns an error if the warehouse cannot be reached.
pub fn create_warehouse(config: &WarehouseConfig) -> Result<Box<dyn Warehouse>> {
    Ok(match config {
        WarehouseConfig::Postgres(pg) => Box::new(
            PostgresWarehouse::connect(&pg.connection_string()).with_context(|| {
                format!("Failed to connect to warehouse at {}:{}", pg.host, pg.port)
            })?,
        ),
        WarehouseConfig::Sqlite { path } if path == ":memory:" => Box::new(
            SqliteWarehouse::in_memory().context("Failed to open in-memory warehouse")?,
        ),
        WarehouseConfig::Sqlite { path } => Box::new(
            SqliteWarehouse::open(Path::new(path))
                .with_context(|| format!("Failed to open warehouse directory {path}"))?,
        ),
    })
}

/// Open the watermark store and create its control tables.
///
/// # Errors
///
/// Returns an error if the store cannot be opened.
pub fn create_state_backend(config: &PipelineConfig) -> Result<Box<dyn WatermarkStore>> {
    let tables = config.state.control_tables();
    let connection = config.state.connection.as_deref();
    match config.state.backend {
        StateBackendKind::Sqlite => {
            let path = connection.unwrap_or(DEFAULT_STATE_PATH);
            let store = if path == ":memory:" {
                SqliteWatermarkStore::in_memory(&tables)
            } else {
                SqliteWatermarkStore::open(Path::new(path), &tables)
            }
            .with_context(|| format!("Failed to open watermark store {path}"))?;
            Ok(Box::new(store))
        }
        StateBackendKind::Postgres => {
            let connstr = connection
                .context("state.connection is required for the postgres backend")?;
            let store = PostgresWatermarkStore::open(connstr, &tables)
                .context("Failed to open postgres watermark store")?;
            Ok(Box::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_pipeline_str;

    #[test]
    fn postgres_state_requires_connection() {
        let config = parse_pipeline_str(
            r#"
version: "1.0"
environment: DEV
source:
  kind: sqlite
  path: /nonexistent.db
warehouse:
  kind: sqlite
  path: ":memory:"
state:
  backend: postgres
tables: []
"#,
        )
        .unwrap();
        let err = create_state_backend(&config).err().unwrap().to_string();
        assert!(err.contains("state.connection is required"));
    }

    #[test]
    fn downstream_phases_skip_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.db");
        let yaml = format!(
            r#"
version: "1.0"
environment: DEV
source:
  kind: sqlite
  path: /nonexistent/netsuite.db
warehouse:
  kind: sqlite
  path: ":memory:"
state:
  connection: {}
tables: []
"#,
            state.display()
        );
        let config = parse_pipeline_str(&yaml).unwrap();
        let backends = Backends::connect(&config, Phase::LandingToStaging).unwrap();
        assert!(backends.source.is_none());
        assert!(Backends::connect(&config, Phase::Incremental).is_err());
    }
}
