//! `SQLite` warehouse.
//!
//! Each layer schema is an attached database: `<dir>/<schema>.db` for a
//! file-backed warehouse, or a private in-memory database. Values bind
//! natively; timestamps are stored as canonical text.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use pg_escape::quote_identifier;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, ToSql};
use suitesync_types::time::format_timestamp;
use suitesync_types::{Column, ColumnType, Dataset, Row, TableRef, Value};

use crate::error::{self, WarehouseError};
use crate::sql;
use crate::warehouse::{
    key_positions, match_columns, shared_columns, CreateMode, Dialect, MergeCounts, MergePlan,
    TableDef, TargetColumn, Warehouse,
};

/// Default compile-time limit on bound parameters per statement.
const MAX_PARAMS: usize = 32_766;

/// Borrowed [`Value`] bound as its native `SQLite` type.
struct Bind<'a>(&'a Value);

impl ToSql for Bind<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Int(v) => ToSqlOutput::from(*v),
            Value::Float(v) => ToSqlOutput::from(*v),
            Value::Bool(v) => ToSqlOutput::from(i64::from(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Timestamp(ts) => ToSqlOutput::from(format_timestamp(ts)),
        })
    }
}

fn decode(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// `SQLite`-backed warehouse.
pub struct SqliteWarehouse {
    conn: Mutex<Connection>,
    /// Directory holding one database file per schema; `None` keeps every
    /// schema in memory.
    dir: Option<PathBuf>,
}

impl SqliteWarehouse {
    /// Open a warehouse whose schemas live as files under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Io`] if the directory can't be created.
    pub fn open(dir: &Path) -> error::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open_in_memory().map_err(WarehouseError::connection)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dir: Some(dir.to_path_buf()),
        })
    }

    /// Create a warehouse with every schema in memory (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Connection`] if `SQLite` can't be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(WarehouseError::connection)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dir: None,
        })
    }

    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| WarehouseError::LockPoisoned)
    }

    fn columns_locked(conn: &Connection, table: &TableRef) -> error::Result<Vec<TargetColumn>> {
        let ctx = || format!("columns of {table}");
        let mut stmt = conn
            .prepare("SELECT name, type FROM pragma_table_info(?1, ?2) ORDER BY cid")
            .map_err(|e| WarehouseError::statement(ctx(), e))?;
        let rows = stmt
            .query_map([&table.name, &table.schema], |row| {
                Ok(TargetColumn::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                ))
            })
            .map_err(|e| WarehouseError::statement(ctx(), e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| WarehouseError::statement(ctx(), e))
    }

    fn count(conn: &Connection, sql: &str, params: &[&dyn ToSql], ctx: &str) -> error::Result<u64> {
        let n: i64 = conn
            .query_row(sql, params, |row| row.get(0))
            .map_err(|e| WarehouseError::statement(ctx, e))?;
        Ok(u64::try_from(n).unwrap_or_default())
    }

    fn exec(conn: &Connection, sql: &str, params: &[&dyn ToSql], ctx: &str) -> error::Result<u64> {
        tracing::debug!(sql, "Warehouse statement");
        let n = conn
            .execute(sql, params)
            .map_err(|e| WarehouseError::statement(ctx, e))?;
        Ok(u64::try_from(n).unwrap_or_default())
    }

    fn target_for(
        conn: &Connection,
        table: &TableRef,
    ) -> error::Result<Vec<TargetColumn>> {
        let target = Self::columns_locked(conn, table)?;
        if target.is_empty() {
            return Err(WarehouseError::Schema(format!("table {table} does not exist")));
        }
        Ok(target)
    }

    fn exists_row(
        conn: &Connection,
        table: &TableRef,
        key_names: &[&str],
        row: &Row,
        key_idx: &[usize],
    ) -> error::Result<bool> {
        let predicate = key_names
            .iter()
            .enumerate()
            .map(|(i, k)| format!("{} = ?{}", quote_identifier(k), i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!("SELECT 1 FROM {} WHERE {predicate}", sql::qualified(table));
        let binds: Vec<Bind<'_>> = key_idx.iter().map(|&i| Bind(&row[i])).collect();
        let params: Vec<&dyn ToSql> = binds.iter().map(|b| b as &dyn ToSql).collect();
        conn.query_row(&sql, params.as_slice(), |_| Ok(()))
            .optional()
            .map(|found| found.is_some())
            .map_err(|e| WarehouseError::statement(format!("upsert lookup in {table}"), e))
    }
}

impl Warehouse for SqliteWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn ensure_schema(&self, schema: &str) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let attached = conn
            .query_row(
                "SELECT 1 FROM pragma_database_list WHERE name = ?1 COLLATE NOCASE",
                [schema],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| WarehouseError::statement(format!("check schema {schema}"), e))?;
        if attached.is_some() {
            return Ok(());
        }

        let location = match &self.dir {
            Some(dir) => dir.join(format!("{schema}.db")).to_string_lossy().into_owned(),
            None => ":memory:".to_string(),
        };
        conn.execute(
            &format!("ATTACH DATABASE ?1 AS {}", quote_identifier(schema)),
            [&location],
        )
        .map_err(|e| WarehouseError::statement(format!("attach schema {schema}"), e))?;
        tracing::debug!(schema, location = %location, "Attached warehouse schema");
        Ok(())
    }

    fn execute(&self, sql: &str) -> error::Result<u64> {
        let conn = self.lock_conn()?;
        tracing::debug!(sql, "Warehouse statement");
        conn.execute_batch(sql)
            .map_err(|e| WarehouseError::statement("execute", e))?;
        Ok(u64::try_from(conn.changes()).unwrap_or_default())
    }

    fn begin(&self) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch("BEGIN")
            .map_err(|e| WarehouseError::statement("begin", e))
    }

    fn commit(&self) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch("COMMIT")
            .map_err(|e| WarehouseError::statement("commit", e))
    }

    fn rollback(&self) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch("ROLLBACK")
            .map_err(|e| WarehouseError::statement("rollback", e))
    }

    fn table_exists(&self, table: &TableRef) -> error::Result<bool> {
        let conn = self.lock_conn()?;
        Ok(!Self::columns_locked(&conn, table)?.is_empty())
    }

    fn list_tables(&self, schema: &str) -> error::Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let ctx = format!("list tables in {schema}");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT name FROM {}.sqlite_master WHERE type = 'table' ORDER BY name",
                quote_identifier(schema)
            ))
            .map_err(|e| WarehouseError::statement(ctx.clone(), e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| WarehouseError::statement(ctx.clone(), e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| WarehouseError::statement(ctx, e))
    }

    fn columns(&self, table: &TableRef) -> error::Result<Vec<TargetColumn>> {
        let conn = self.lock_conn()?;
        Self::columns_locked(&conn, table)
    }

    fn create_table(&self, def: &TableDef, mode: CreateMode) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let ctx = format!("create {}", def.table);
        if mode == CreateMode::Replace {
            Self::exec(&conn, &sql::drop_table(&def.table), &[], &ctx)?;
        }
        let ddl = sql::create_table(def, mode == CreateMode::IfNotExists);
        Self::exec(&conn, &ddl, &[], &ctx)?;
        Ok(())
    }

    fn clone_table_structure(&self, from: &TableRef, to: &TableRef) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let ctx = format!("clone {from} to {to}");
        Self::exec(&conn, &sql::drop_table(to), &[], &ctx)?;
        let ddl = format!(
            "CREATE TABLE {} AS SELECT * FROM {} WHERE 0",
            sql::qualified(to),
            sql::qualified(from)
        );
        Self::exec(&conn, &ddl, &[], &ctx)?;
        Ok(())
    }

    fn truncate(&self, table: &TableRef) -> error::Result<()> {
        let conn = self.lock_conn()?;
        Self::exec(
            &conn,
            &format!("DELETE FROM {}", sql::qualified(table)),
            &[],
            &format!("truncate {table}"),
        )?;
        Ok(())
    }

    fn append(&self, table: &TableRef, data: &Dataset) -> error::Result<u64> {
        if data.is_empty() {
            return Ok(0);
        }
        let conn = self.lock_conn()?;
        let target = Self::target_for(&conn, table)?;
        let matched = match_columns(table, data, &target)?;
        let names: Vec<&str> = matched.iter().map(|c| c.name.as_str()).collect();
        let ctx = format!("append to {table}");

        let mut written = 0u64;
        for chunk in data.rows.chunks(sql::chunk_rows(names.len(), MAX_PARAMS)) {
            let stmt = sql::insert_values(table, &names, chunk.len(), |n, _| format!("?{n}"));
            let binds: Vec<Bind<'_>> = chunk.iter().flatten().map(Bind).collect();
            let params: Vec<&dyn ToSql> = binds.iter().map(|b| b as &dyn ToSql).collect();
            written += Self::exec(&conn, &stmt, &params, &ctx)?;
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
        let conn = self.lock_conn()?;
        let target = Self::target_for(&conn, table)?;
        let matched = match_columns(table, data, &target)?;
        let key_idx = key_positions(table, &matched, key)?;
        let key_names: Vec<&str> = key_idx.iter().map(|&i| matched[i].name.as_str()).collect();
        let names: Vec<&str> = matched.iter().map(|c| c.name.as_str()).collect();
        let update_idx: Vec<usize> = (0..names.len()).filter(|i| !key_idx.contains(i)).collect();

        let insert_sql = sql::insert_values(table, &names, 1, |n, _| format!("?{n}"));
        let update_sql = (!update_idx.is_empty()).then(|| {
            let sets = update_idx
                .iter()
                .enumerate()
                .map(|(pos, &i)| format!("{} = ?{}", quote_identifier(names[i]), pos + 1))
                .collect::<Vec<_>>()
                .join(", ");
            let predicate = key_idx
                .iter()
                .enumerate()
                .map(|(pos, &i)| {
                    format!(
                        "{} = ?{}",
                        quote_identifier(names[i]),
                        update_idx.len() + pos + 1
                    )
                })
                .collect::<Vec<_>>()
                .join(" AND ");
            format!("UPDATE {} SET {sets} WHERE {predicate}", sql::qualified(table))
        });

        let ctx = format!("upsert into {table}");
        let mut counts = MergeCounts::default();
        for row in &data.rows {
            if Self::exists_row(&conn, table, &key_names, row, &key_idx)? {
                if let Some(update_sql) = &update_sql {
                    let binds: Vec<Bind<'_>> = update_idx
                        .iter()
                        .chain(key_idx.iter())
                        .map(|&i| Bind(&row[i]))
                        .collect();
                    let params: Vec<&dyn ToSql> = binds.iter().map(|b| b as &dyn ToSql).collect();
                    Self::exec(&conn, update_sql, &params, &ctx)?;
                    counts.updated += 1;
                }
            } else {
                let binds: Vec<Bind<'_>> = row.iter().map(Bind).collect();
                let params: Vec<&dyn ToSql> = binds.iter().map(|b| b as &dyn ToSql).collect();
                Self::exec(&conn, &insert_sql, &params, &ctx)?;
                counts.inserted += 1;
            }
        }
        Ok(counts)
    }

    fn merge_table(&self, plan: &MergePlan) -> error::Result<MergeCounts> {
        let conn = self.lock_conn()?;
        let ctx = format!("merge {} into {}", plan.source, plan.target);
        let source_rows = Self::count(&conn, &sql::row_count(&plan.source), &[], &ctx)?;
        let matched = Self::count(&conn, &sql::matched_count(plan), &[], &ctx)?;

        let update = sql::update_from(plan);
        if let Some(update) = &update {
            Self::exec(&conn, update, &[], &ctx)?;
        }

        let insert = sql::insert_missing(plan, "?1");
        match &plan.audit {
            Some(audit) => {
                let ts = format_timestamp(&audit.value);
                Self::exec(&conn, &insert, &[&ts], &ctx)?;
            }
            None => {
                Self::exec(&conn, &insert, &[], &ctx)?;
            }
        }
        Ok(MergeCounts::from_matched(source_rows, matched, update.is_some()))
    }

    fn count_newer(
        &self,
        table: &TableRef,
        column: &str,
        after: NaiveDateTime,
    ) -> error::Result<u64> {
        let conn = self.lock_conn()?;
        let ts = format_timestamp(&after);
        Self::count(
            &conn,
            &sql::count_newer(table, column, "?1"),
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
        let conn = self.lock_conn()?;
        let shared = shared_columns(
            &Self::target_for(&conn, from)?,
            &Self::target_for(&conn, to)?,
        );
        if shared.is_empty() {
            return Err(WarehouseError::Schema(format!(
                "{from} and {to} share no columns"
            )));
        }
        let ts = format_timestamp(&after);
        Self::exec(
            &conn,
            &sql::insert_newer(from, to, &shared, column, "?1"),
            &[&ts],
            &format!("copy {from} into {to}"),
        )
    }

    fn row_count(&self, table: &TableRef) -> error::Result<u64> {
        let conn = self.lock_conn()?;
        Self::count(&conn, &sql::row_count(table), &[], &format!("count {table}"))
    }

    fn read_table(&self, table: &TableRef) -> error::Result<Dataset> {
        let conn = self.lock_conn()?;
        let target = Self::target_for(&conn, table)?;
        let ctx = format!("read {table}");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT * FROM {} ORDER BY 1",
                sql::qualified(table)
            ))
            .map_err(|e| WarehouseError::statement(ctx.clone(), e))?;
        let width = target.len();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(decode))
                    .collect::<rusqlite::Result<Row>>()
            })
            .map_err(|e| WarehouseError::statement(ctx.clone(), e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| WarehouseError::statement(ctx, e))?;

        let columns = target
            .iter()
            .map(|c| Column::new(c.name.clone(), ColumnType::from_type_name(&c.data_type)))
            .collect();
        Ok(Dataset::new(columns, rows))
    }
}
