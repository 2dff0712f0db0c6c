//! Pipeline configuration types.
//!
//! One [`PipelineConfig`] is parsed per run and shared read-only by every
//! phase.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer};
use suitesync_state::ControlTables;
use suitesync_warehouse::CreateMode;

/// Default change-tracking column on source tables.
pub const DEFAULT_MODIFIED_COLUMN: &str = "DATE_LAST_MODIFIED";

/// Path used for the SQLite watermark store when no connection is given.
pub const DEFAULT_STATE_PATH: &str = "suitesync_state.db";

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub version: String,
    /// Value written to the landing control table's `ENV` column.
    pub environment: String,
    pub source: SourceConfig,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub layers: LayerConfig,
    pub tables: Vec<TableConfig>,
    /// Source type name to warehouse type, merged over the built-in map.
    #[serde(default)]
    pub type_map: BTreeMap<String, String>,
    #[serde(default)]
    pub create_mode: CreateMode,
    #[serde(default)]
    pub incremental: IncrementalConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub datamart: DatamartConfig,
}

/// Connection settings shared by the `PostgreSQL` source and warehouse.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConnection {
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    /// Source only: schema the configured tables live in.
    #[serde(default)]
    pub schema: Option<String>,
}

fn default_pg_port() -> u16 {
    5432
}

impl PostgresConnection {
    /// libpq key/value connection string with every value quoted.
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            libpq_quote(&self.host),
            self.port,
            libpq_quote(&self.user),
            libpq_quote(&self.password),
            libpq_quote(&self.database),
        )
    }
}

fn libpq_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Postgres(PostgresConnection),
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarehouseConfig {
    Postgres(PostgresConnection),
    /// Directory holding one database file per layer schema, or `:memory:`.
    Sqlite { path: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBackendKind {
    #[default]
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub backend: StateBackendKind,
    /// File path (SQLite) or libpq connection string (`PostgreSQL`).
    pub connection: Option<String>,
    pub landing_control_table: String,
    pub staging_control_table: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        let tables = ControlTables::default();
        Self {
            backend: StateBackendKind::default(),
            connection: None,
            landing_control_table: tables.landing,
            staging_control_table: tables.staging,
        }
    }
}

impl StateConfig {
    #[must_use]
    pub fn control_tables(&self) -> ControlTables {
        ControlTables {
            landing: self.landing_control_table.clone(),
            staging: self.staging_control_table.clone(),
        }
    }
}

/// Names of the warehouse layers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub landing_db: String,
    pub landing_schema: String,
    pub transient_schema: String,
    pub staging_db: String,
    pub staging_schema: String,
    pub datamart_schema: String,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            landing_db: "LANDING".to_string(),
            landing_schema: "FINANCE".to_string(),
            transient_schema: "FINANCE_TRANSIENT".to_string(),
            staging_db: "STAGING".to_string(),
            staging_schema: "FINANCE_STG".to_string(),
            datamart_schema: "FINANCE_DM".to_string(),
        }
    }
}

impl LayerConfig {
    /// Every schema the phases write to, deduplicated, in layer order.
    #[must_use]
    pub fn schemas(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::with_capacity(4);
        for schema in [
            &self.landing_schema,
            &self.transient_schema,
            &self.staging_schema,
            &self.datamart_schema,
        ] {
            if !out.iter().any(|s| s.eq_ignore_ascii_case(schema)) {
                out.push(schema);
            }
        }
        out
    }
}

/// One table sync unit.
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(deserialize_with = "one_or_many")]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub modified_column: Option<String>,
}

impl TableConfig {
    /// Landing and transient table name; defaults to the source name.
    #[must_use]
    pub fn target_name(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn modified_column(&self) -> &str {
        self.modified_column
            .as_deref()
            .unwrap_or(DEFAULT_MODIFIED_COLUMN)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(key) => vec![key],
        OneOrMany::Many(keys) => keys,
    })
}

/// How phase 1 applies a fetched delta to landing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Stage into the transient table, then MERGE into landing.
    #[default]
    Transient,
    /// Upsert the dataset straight into landing.
    Direct,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IncrementalConfig {
    pub strategy: MergeStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StagingSeed {
    pub source_table: String,
    pub source_view: String,
    pub target: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Column on landing views compared against `LAST_RUN_DATE_TIME`.
    pub change_column: String,
    /// Control rows registered on each phase 2 run when missing.
    pub tables: Vec<StagingSeed>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            change_column: "INSERT_DT".to_string(),
            tables: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ViewMapping {
    pub source_view: String,
    pub target: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatamartConfig {
    pub merge_key: String,
    pub audit_column: String,
    pub target_prefix: String,
    pub exclude: Vec<String>,
    pub views: Vec<ViewMapping>,
}

impl Default for DatamartConfig {
    fn default() -> Self {
        Self {
            merge_key: "DW_KEY_ID".to_string(),
            audit_column: "DW_INSERT_DT".to_string(),
            target_prefix: "DIM_".to_string(),
            exclude: vec!["DIM_HIERARCHY".to_string()],
            views: Vec::new(),
        }
    }
}
