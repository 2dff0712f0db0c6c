//! `PostgreSQL` warehouse.
//!
//! Values are bound as text parameters and cast server-side to the target
//! column's type, read from `pg_attribute`. Merges use native `MERGE`
//! (PostgreSQL 15+).

use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use pg_escape::quote_identifier;
use postgres::types::ToSql;
use postgres::{Client, NoTls};
use suitesync_types::time::format_timestamp;
use suitesync_types::{Column, ColumnType, Dataset, TableRef, Value};

use crate::error::{self, WarehouseError};
use crate::sql;
use crate::warehouse::{
    key_positions, match_columns, shared_columns, CreateMode, Dialect, MergeCounts, MergePlan,
    TableDef, TargetColumn, Warehouse,
};

/// Protocol limit on bound parameters per statement.
const MAX_PARAMS: usize = 65_535;

/// Catalog query for columns of a table or view, with unmodified type names.
const COLUMNS_SQL: &str = "SELECT a.attname::text, format_type(a.atttypid, NULL) \
     FROM pg_attribute a \
     JOIN pg_class c ON a.attrelid = c.oid \
     JOIN pg_namespace n ON c.relnamespace = n.oid \
     WHERE n.nspname = $1 AND c.relname = $2 AND a.attnum > 0 AND NOT a.attisdropped \
     ORDER BY a.attnum";

/// `PostgreSQL`-backed warehouse.
pub struct PostgresWarehouse {
    client: Mutex<Client>,
}

fn format_pg_error(prefix: &str, error: &postgres::Error) -> String {
    match error.as_db_error() {
        Some(db) => format!(
            "{prefix}: {} (sqlstate={})",
            db.message(),
            db.code().code()
        ),
        None => format!("{prefix}: {error}"),
    }
}

fn text_cast(n: usize, data_type: &str) -> String {
    format!("CAST(${n}::text AS {data_type})")
}

fn decode_text(raw: Option<String>, column_type: ColumnType) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };
    match column_type {
        ColumnType::Integer => raw.parse().map_or(Value::Text(raw), Value::Int),
        ColumnType::Float => raw
            .parse::<f64>()
            .map_or_else(|_| Value::Text(raw.clone()), Value::Float),
        ColumnType::Boolean => match raw.as_str() {
            "true" | "t" => Value::Bool(true),
            "false" | "f" => Value::Bool(false),
            _ => Value::Text(raw),
        },
        ColumnType::Timestamp | ColumnType::Text => Value::Text(raw),
    }
}

impl PostgresWarehouse {
    /// Connect with a libpq-style connection string.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Connection`] if the connection fails.
    pub fn connect(connstr: &str) -> error::Result<Self> {
        let client = Client::connect(connstr, NoTls).map_err(WarehouseError::connection)?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }

    fn lock_client(&self) -> error::Result<MutexGuard<'_, Client>> {
        self.client.lock().map_err(|_| WarehouseError::LockPoisoned)
    }

    fn exec(
        client: &mut Client,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
        ctx: &str,
    ) -> error::Result<u64> {
        tracing::debug!(sql, "Warehouse statement");
        client
            .execute(sql, params)
            .map_err(|e| WarehouseError::statement(format_pg_error(ctx, &e), e))
    }

    fn count(
        client: &mut Client,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
        ctx: &str,
    ) -> error::Result<u64> {
        let row = client
            .query_one(sql, params)
            .map_err(|e| WarehouseError::statement(format_pg_error(ctx, &e), e))?;
        let n: i64 = row.get(0);
        Ok(u64::try_from(n).unwrap_or_default())
    }

    fn columns_locked(client: &mut Client, table: &TableRef) -> error::Result<Vec<TargetColumn>> {
        let rows = client
            .query(COLUMNS_SQL, &[&table.schema, &table.name])
            .map_err(|e| WarehouseError::statement(format!("columns of {table}"), e))?;
        Ok(rows
            .iter()
            .map(|r| TargetColumn::new(r.get::<_, String>(0), r.get::<_, String>(1)))
            .collect())
    }

    fn target_for(client: &mut Client, table: &TableRef) -> error::Result<Vec<TargetColumn>> {
        let target = Self::columns_locked(client, table)?;
        if target.is_empty() {
            return Err(WarehouseError::Schema(format!("table {table} does not exist")));
        }
        Ok(target)
    }
}

impl Warehouse for PostgresWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn ensure_schema(&self, schema: &str) -> error::Result<()> {
        let mut client = self.lock_client()?;
        let ddl = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_identifier(schema));
        Self::exec(&mut client, &ddl, &[], &format!("create schema {schema}"))?;
        Ok(())
    }

    fn execute(&self, sql: &str) -> error::Result<u64> {
        let mut client = self.lock_client()?;
        Self::exec(&mut client, sql, &[], "execute")
    }

    fn begin(&self) -> error::Result<()> {
        let mut client = self.lock_client()?;
        client
            .batch_execute("BEGIN")
            .map_err(|e| WarehouseError::statement("begin", e))
    }

    fn commit(&self) -> error::Result<()> {
        let mut client = self.lock_client()?;
        client
            .batch_execute("COMMIT")
            .map_err(|e| WarehouseError::statement("commit", e))
    }

    fn rollback(&self) -> error::Result<()> {
        let mut client = self.lock_client()?;
        client
            .batch_execute("ROLLBACK")
            .map_err(|e| WarehouseError::statement("rollback", e))
    }

    fn table_exists(&self, table: &TableRef) -> error::Result<bool> {
        let mut client = self.lock_client()?;
        Ok(!Self::columns_locked(&mut client, table)?.is_empty())
    }

    fn list_tables(&self, schema: &str) -> error::Result<Vec<String>> {
        let mut client = self.lock_client()?;
        let rows = client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[&schema],
            )
            .map_err(|e| WarehouseError::statement(format!("list tables in {schema}"), e))?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    fn columns(&self, table: &TableRef) -> error::Result<Vec<TargetColumn>> {
        let mut client = self.lock_client()?;
        Self::columns_locked(&mut client, table)
    }

    fn create_table(&self, def: &TableDef, mode: CreateMode) -> error::Result<()> {
        let mut client = self.lock_client()?;
        let ctx = format!("create {}", def.table);
        if mode == CreateMode::Replace {
            Self::exec(&mut client, &sql::drop_table(&def.table), &[], &ctx)?;
        }
        let ddl = sql::create_table(def, mode == CreateMode::IfNotExists);
        Self::exec(&mut client, &ddl, &[], &ctx)?;
        Ok(())
    }

    fn clone_table_structure(&self, from: &TableRef, to: &TableRef) -> error::Result<()> {
        let mut client = self.lock_client()?;
        let ctx = format!("clone {from} to {to}");
        Self::exec(&mut client, &sql::drop_table(to), &[], &ctx)?;
        let ddl = format!(
            "CREATE TABLE {} (LIKE {} INCLUDING DEFAULTS)",
            sql::qualified(to),
            sql::qualified(from)
        );
        Self::exec(&mut client, &ddl, &[], &ctx)?;
        Ok(())
    }

    fn truncate(&self, table: &TableRef) -> error::Result<()> {
        let mut client = self.lock_client()?;
        Self::exec(
            &mut client,
            &format!("TRUNCATE TABLE {}", sql::qualified(table)),
            &[],
            &format!("truncate {table}"),
        )?;
        Ok(())
    }

    fn append(&self, table: &TableRef, data: &Dataset) -> error::Result<u64> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut client = self.lock_client()?;
        let target = Self::target_for(&mut client, table)?;
        let matched = match_columns(table, data, &target)?;
        let names: Vec<&str> = matched.iter().map(|c| c.name.as_str()).collect();
        let ctx = format!("append to {table}");

        let mut written = 0u64;
        for chunk in data.rows.chunks(sql::chunk_rows(names.len(), MAX_PARAMS)) {
            let stmt = sql::insert_values(table, &names, chunk.len(), |n, col| {
                text_cast(n, &matched[col].data_type)
            });
            let values: Vec<Option<String>> =
                chunk.iter().flatten().map(Value::to_sql_text).collect();
            let params: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            written += Self::exec(&mut client, &stmt, &params, &ctx)?;
        }
        Ok(written)
    }

    fn upsert(
        &self,
        table: &TableRef,
        data: &Dataset,
        key: &[String],
    ) -> error::Result<MergeCounts> {
        if data.is_empty() {
            return Ok(MergeCounts::default());
        }
        let mut client = self.lock_client()?;
        let target = Self::target_for(&mut client, table)?;
        let matched = match_columns(table, data, &target)?;
        let key_idx = key_positions(table, &matched, key)?;
        let key_names: Vec<&str> = key_idx.iter().map(|&i| matched[i].name.as_str()).collect();
        let names: Vec<&str> = matched.iter().map(|c| c.name.as_str()).collect();
        let clause = sql::upsert_clause(&key_names, &names);
        let ctx = format!("upsert into {table}");

        let mut counts = MergeCounts::default();
        for chunk in data.rows.chunks(sql::chunk_rows(names.len(), MAX_PARAMS)) {
            let mut stmt = sql::insert_values(table, &names, chunk.len(), |n, col| {
                text_cast(n, &matched[col].data_type)
            });
            stmt.push_str(&clause);
            stmt.push_str(" RETURNING (xmax = 0)");

            let values: Vec<Option<String>> =
                chunk.iter().flatten().map(Value::to_sql_text).collect();
            let params: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            tracing::debug!(sql = %stmt, "Warehouse statement");
            let rows = client
                .query(&stmt, &params)
                .map_err(|e| WarehouseError::statement(format_pg_error(&ctx, &e), e))?;
            for row in &rows {
                if row.get::<_, bool>(0) {
                    counts.inserted += 1;
                } else {
                    counts.updated += 1;
                }
            }
        }
        Ok(counts)
    }

    fn merge_table(&self, plan: &MergePlan) -> error::Result<MergeCounts> {
        let mut client = self.lock_client()?;
        let ctx = format!("merge {} into {}", plan.source, plan.target);
        let source_rows = Self::count(&mut client, &sql::row_count(&plan.source), &[], &ctx)?;
        let matched = Self::count(&mut client, &sql::matched_count(plan), &[], &ctx)?;

        let stmt = sql::merge(plan, "CAST($1::text AS TIMESTAMP)");
        match &plan.audit {
            Some(audit) => {
                let ts = format_timestamp(&audit.value);
                Self::exec(&mut client, &stmt, &[&ts], &ctx)?;
            }
            None => {
                Self::exec(&mut client, &stmt, &[], &ctx)?;
            }
        }
        let updates_columns = plan.update_columns().next().is_some();
        Ok(MergeCounts::from_matched(source_rows, matched, updates_columns))
    }

    fn count_newer(
        &self,
        table: &TableRef,
        column: &str,
        after: NaiveDateTime,
    ) -> error::Result<u64> {
        let mut client = self.lock_client()?;
        let ts = format_timestamp(&after);
        Self::count(
            &mut client,
            &sql::count_newer(table, column, "CAST($1::text AS TIMESTAMP)"),
            &[&ts],
            &format!("count newer rows in {table}"),
        )
    }

    fn insert_newer(
        &self,
        from: &TableRef,
        to: &TableRef,
        column: &str,
        after: NaiveDateTime,
    ) -> error::Result<u64> {
        let mut client = self.lock_client()?;
        let from_cols = Self::target_for(&mut client, from)?;
        let to_cols = Self::target_for(&mut client, to)?;
        let shared = shared_columns(&from_cols, &to_cols);
        if shared.is_empty() {
            return Err(WarehouseError::Schema(format!(
                "{from} and {to} share no columns"
            )));
        }
        let ts = format_timestamp(&after);
        Self::exec(
            &mut client,
            &sql::insert_newer(from, to, &shared, column, "CAST($1::text AS TIMESTAMP)"),
            &[&ts],
            &format!("copy {from} into {to}"),
        )
    }

    fn row_count(&self, table: &TableRef) -> error::Result<u64> {
        let mut client = self.lock_client()?;
        Self::count(&mut client, &sql::row_count(table), &[], &format!("count {table}"))
    }

    fn read_table(&self, table: &TableRef) -> error::Result<Dataset> {
        let mut client = self.lock_client()?;
        let target = Self::target_for(&mut client, table)?;
        let select = target
            .iter()
            .map(|c| format!("{}::text", quote_identifier(&c.name)))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = client
            .query(
                &format!("SELECT {select} FROM {} ORDER BY 1", sql::qualified(table)),
                &[],
            )
            .map_err(|e| WarehouseError::statement(format!("read {table}"), e))?;

        let columns: Vec<Column> = target
            .iter()
            .map(|c| Column::new(c.name.clone(), ColumnType::from_type_name(&c.data_type)))
            .collect();
        let data = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| decode_text(row.get(i), c.column_type))
                    .collect()
            })
            .collect();
        Ok(Dataset::new(columns, data))
    }
}
