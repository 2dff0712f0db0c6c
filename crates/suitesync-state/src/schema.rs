//! Control table names and idempotent DDL.

use pg_escape::quote_identifier;

/// Name of the per-table run history table.
pub const RUNS_TABLE: &str = "SUITESYNC_RUNS";

/// Names of the two control tables. Names may be dotted
/// (`PUBLIC.NETSUITE_CT`); each part is quoted separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlTables {
    pub landing: String,
    pub staging: String,
}

impl Default for ControlTables {
    fn default() -> Self {
        Self {
            landing: "NETSUITE_CT".to_string(),
            staging: "STAGING_CT".to_string(),
        }
    }
}

impl ControlTables {
    pub(crate) fn landing_sql(&self) -> String {
        qualify(&self.landing)
    }

    pub(crate) fn staging_sql(&self) -> String {
        qualify(&self.staging)
    }
}

/// Quote each dotted part of a table name.
pub(crate) fn qualify(name: &str) -> String {
    name.split('.')
        .map(|part| quote_identifier(part).into_owned())
        .collect::<Vec<_>>()
        .join(".")
}

/// `SQLite` DDL. Timestamps are stored as canonical text.
pub(crate) fn sqlite_ddl(tables: &ControlTables) -> String {
    format!(
        r"
CREATE TABLE IF NOT EXISTS {landing} (
    ENV TEXT NOT NULL,
    NETSUITE_TABLE_NAME TEXT NOT NULL,
    LAST_MODIFIED_DATE TEXT NOT NULL,
    PRIMARY KEY (ENV, NETSUITE_TABLE_NAME)
);

CREATE TABLE IF NOT EXISTS {staging} (
    ROW_NUM INTEGER NOT NULL,
    SRC_DB TEXT NOT NULL,
    SRC_SCHEMA TEXT NOT NULL,
    SRC_TABLE TEXT NOT NULL,
    SRC_VIEW TEXT NOT NULL,
    TGT_DB TEXT NOT NULL,
    TGT_SCHEMA TEXT NOT NULL,
    TGT_TABLE TEXT NOT NULL,
    LAST_RUN_DATE_TIME TEXT NOT NULL,
    PRIMARY KEY (TGT_DB, TGT_SCHEMA, TGT_TABLE)
);

CREATE TABLE IF NOT EXISTS {runs} (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    PHASE INTEGER NOT NULL,
    TABLE_NAME TEXT NOT NULL,
    STATUS TEXT NOT NULL,
    STARTED_AT TEXT NOT NULL DEFAULT (datetime('now')),
    FINISHED_AT TEXT,
    RECORDS_READ INTEGER DEFAULT 0,
    RECORDS_WRITTEN INTEGER DEFAULT 0,
    ERROR_MESSAGE TEXT
);
",
        landing = tables.landing_sql(),
        staging = tables.staging_sql(),
        runs = RUNS_TABLE,
    )
}

/// `PostgreSQL` DDL.
pub(crate) fn postgres_ddl(tables: &ControlTables) -> String {
    format!(
        r"
CREATE TABLE IF NOT EXISTS {landing} (
    ENV TEXT NOT NULL,
    NETSUITE_TABLE_NAME TEXT NOT NULL,
    LAST_MODIFIED_DATE TIMESTAMP NOT NULL,
    PRIMARY KEY (ENV, NETSUITE_TABLE_NAME)
);

CREATE TABLE IF NOT EXISTS {staging} (
    ROW_NUM BIGINT NOT NULL,
    SRC_DB TEXT NOT NULL,
    SRC_SCHEMA TEXT NOT NULL,
    SRC_TABLE TEXT NOT NULL,
    SRC_VIEW TEXT NOT NULL,
    TGT_DB TEXT NOT NULL,
    TGT_SCHEMA TEXT NOT NULL,
    TGT_TABLE TEXT NOT NULL,
    LAST_RUN_DATE_TIME TIMESTAMP NOT NULL,
    PRIMARY KEY (TGT_DB, TGT_SCHEMA, TGT_TABLE)
);

CREATE TABLE IF NOT EXISTS {runs} (
    ID BIGSERIAL PRIMARY KEY,
    PHASE INTEGER NOT NULL,
    TABLE_NAME TEXT NOT NULL,
    STATUS TEXT NOT NULL,
    STARTED_AT TIMESTAMP NOT NULL DEFAULT (now() AT TIME ZONE 'utc'),
    FINISHED_AT TIMESTAMP,
    RECORDS_READ BIGINT DEFAULT 0,
    RECORDS_WRITTEN BIGINT DEFAULT 0,
    ERROR_MESSAGE TEXT
);
",
        landing = tables.landing_sql(),
        staging = tables.staging_sql(),
        runs = RUNS_TABLE,
    )
}
