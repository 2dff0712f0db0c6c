mod container;

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use postgres::{Client, NoTls};
use suitesync_engine::config::parser;
use suitesync_engine::config::validator;
use suitesync_engine::{run_phase, Backends, Phase, PhaseReport};

static NEXT_LAYOUT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct HarnessContext {
    pub postgres_host: String,
    pub postgres_port: u16,
    pub postgres_db: String,
    pub postgres_user: String,
    pub postgres_pass: String,
}

/// Schemas owned by one test: a source schema, the four warehouse layers
/// and a schema for the control tables.
#[derive(Debug, Clone)]
pub struct Layout {
    pub environment: String,
    pub source: String,
    pub landing: String,
    pub transient: String,
    pub staging: String,
    pub datamart: String,
    pub control: String,
}

impl Layout {
    fn schemas(&self) -> [&str; 6] {
        [
            &self.source,
            &self.landing,
            &self.transient,
            &self.staging,
            &self.datamart,
            &self.control,
        ]
    }
}

pub fn bootstrap() -> Result<HarnessContext> {
    let postgres_port = container::shared_postgres_port()?;

    Ok(HarnessContext {
        postgres_host: "127.0.0.1".to_string(),
        postgres_port,
        postgres_db: "postgres".to_string(),
        postgres_user: "postgres".to_string(),
        postgres_pass: "postgres".to_string(),
    })
}

impl HarnessContext {
    fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.postgres_host,
            self.postgres_port,
            self.postgres_user,
            self.postgres_pass,
            self.postgres_db
        )
    }

    pub fn connect(&self) -> Result<Client> {
        Client::connect(&self.connection_string(), NoTls)
            .context("failed to connect to test postgres")
    }

    /// Reserve a fresh set of schemas. Source and control schemas are
    /// created here; the pipeline creates the layer schemas itself.
    pub fn allocate_layout(&self, test_name: &str) -> Result<Layout> {
        let id = NEXT_LAYOUT_ID.fetch_add(1, Ordering::Relaxed);
        let prefix = format!("{}_{id}", sanitize_identifier(test_name));
        let layout = Layout {
            environment: format!("{prefix}_LANDING"),
            source: format!("{prefix}_NETSUITE"),
            landing: format!("{prefix}_FINANCE"),
            transient: format!("{prefix}_TRANSIENT"),
            staging: format!("{prefix}_STG"),
            datamart: format!("{prefix}_DM"),
            control: format!("{prefix}_CTL"),
        };

        let mut client = self.connect()?;
        for schema in [&layout.source, &layout.control] {
            client
                .batch_execute(&format!("CREATE SCHEMA \"{schema}\""))
                .with_context(|| format!("failed to create schema {schema}"))?;
        }
        Ok(layout)
    }

    pub fn drop_layout(&self, layout: &Layout) -> Result<()> {
        let mut client = self.connect()?;
        for schema in layout.schemas() {
            client
                .batch_execute(&format!("DROP SCHEMA IF EXISTS \"{schema}\" CASCADE"))
                .with_context(|| format!("failed to drop schema {schema}"))?;
        }
        Ok(())
    }

    pub fn seed_source(&self, layout: &Layout) -> Result<()> {
        self.execute(&format!(
            "
            CREATE TABLE \"{src}\".\"VENDORS\" (
                \"VENDOR_ID\" INTEGER,
                \"NAME\" VARCHAR(100),
                \"BALANCE\" NUMERIC(12, 2),
                \"TERMS_DAYS\" INTEGER,
                \"DATE_LAST_MODIFIED\" TIMESTAMP
            );
            INSERT INTO \"{src}\".\"VENDORS\" VALUES
                (1, 'Acme', 10.50, 30, '2024-01-01 00:00:00'),
                (2, 'Globex', 250.25, 45, '2024-01-05 12:00:00.250'),
                (3, NULL, NULL, NULL, NULL);

            CREATE TABLE \"{src}\".\"ACCOUNTS\" (
                \"ACCOUNT_ID\" NUMERIC(39, 0),
                \"ACCOUNT_NUMBER\" VARCHAR(20),
                \"DATE_LAST_MODIFIED\" TIMESTAMP
            );
            INSERT INTO \"{src}\".\"ACCOUNTS\" VALUES
                (100, '4000', '2024-03-01 00:00:00');
            ",
            src = layout.source
        ))
    }

    pub fn execute(&self, sql: &str) -> Result<()> {
        let mut client = self.connect()?;
        client.batch_execute(sql).context("failed to execute statement")
    }

    pub fn pipeline_yaml(&self, layout: &Layout, extra: &str) -> String {
        format!(
            r#"
version: "1.0"
environment: {env}
source:
  kind: postgres
  host: {host}
  port: {port}
  user: {user}
  password: {pass}
  database: {db}
  schema: {src}
warehouse:
  kind: postgres
  host: {host}
  port: {port}
  user: {user}
  password: {pass}
  database: {db}
state:
  backend: postgres
  connection: "{connstr}"
  landing_control_table: {ctl}.NETSUITE_CT
  staging_control_table: {ctl}.STAGING_CT
layers:
  landing_schema: {landing}
  transient_schema: {transient}
  staging_schema: {staging}
  datamart_schema: {datamart}
tables:
  - name: VENDORS
    primary_key: VENDOR_ID
  - name: ACCOUNTS
    primary_key: ACCOUNT_ID
{extra}
"#,
            env = layout.environment,
            host = self.postgres_host,
            port = self.postgres_port,
            user = self.postgres_user,
            pass = self.postgres_pass,
            db = self.postgres_db,
            src = layout.source,
            connstr = self.connection_string(),
            ctl = layout.control,
            landing = layout.landing,
            transient = layout.transient,
            staging = layout.staging,
            datamart = layout.datamart,
        )
    }

    /// Parse, validate, connect and run one phase the way the CLI does.
    pub fn run_phase(&self, layout: &Layout, phase: Phase, extra: &str) -> Result<PhaseReport> {
        let config = parser::parse_pipeline_str(&self.pipeline_yaml(layout, extra))
            .context("failed to parse pipeline")?;
        validator::validate_pipeline(&config).context("failed to validate pipeline")?;

        let backends = Backends::connect(&config, phase)?;
        run_phase(phase, &backends.context(&config)).context("phase execution failed")
    }

    pub fn table_row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let mut client = self.connect()?;
        let row = client
            .query_one(
                &format!("SELECT COUNT(*)::bigint FROM \"{schema}\".\"{table}\""),
                &[],
            )
            .with_context(|| format!("failed to count rows in {schema}.{table}"))?;
        Ok(row.get(0))
    }

    /// Rows rendered as `a|b|c` lines, nulls as `NULL`.
    pub fn table_rows_snapshot(
        &self,
        schema: &str,
        table: &str,
        columns: &[&str],
        order_by: &str,
    ) -> Result<String> {
        let select = columns
            .iter()
            .map(|col| format!("COALESCE(\"{col}\"::text, 'NULL')"))
            .collect::<Vec<_>>()
            .join(", ");
        let query =
            format!("SELECT {select} FROM \"{schema}\".\"{table}\" ORDER BY \"{order_by}\"");

        let mut client = self.connect()?;
        let rows = client
            .query(&query, &[])
            .with_context(|| format!("failed snapshot query for {schema}.{table}"))?;

        Ok(rows
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|idx| row.get::<_, String>(idx))
                    .collect::<Vec<_>>()
                    .join("|")
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    pub fn landing_watermark(&self, layout: &Layout, table: &str) -> Result<Option<String>> {
        let mut client = self.connect()?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT LAST_MODIFIED_DATE::text FROM \"{}\".\"NETSUITE_CT\" \
                     WHERE ENV = $1 AND NETSUITE_TABLE_NAME = $2",
                    layout.control
                ),
                &[&layout.environment, &table],
            )
            .context("failed to read landing control table")?;
        Ok(row.map(|r| r.get(0)))
    }
}

fn sanitize_identifier(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
