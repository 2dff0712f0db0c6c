//! `PostgreSQL` source reader.
//!
//! Every selected column is cast to one of four wire types (`bigint`,
//! `float8`, `boolean`, `text`) so rows decode without per-type driver
//! support. Temporal and numeric values arrive as text and are normalized
//! by the row transformer.
//!
//! The incremental bound is a naive `TIMESTAMP`. Against a `timestamptz`
//! column it is read in the session time zone, the same zone
//! `LOCALTIMESTAMP` reports, so watermarks taken from [`SourceReader::now`]
//! compare on one clock.

use std::sync::{Mutex, MutexGuard};

use pg_escape::quote_identifier;
use postgres::{Client, NoTls};
use chrono::NaiveDateTime;
use suitesync_types::time::{format_timestamp, parse_timestamp};
use suitesync_types::{Column, Dataset, Value};

use crate::error::{self, SourceError};
use crate::identifier::quote_table;
use crate::reader::{Since, SourceColumn, SourceReader};

/// How a column is selected and decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireType {
    Int,
    Float,
    Bool,
    Text,
}

impl WireType {
    fn for_pg_type(pg_type: &str) -> Self {
        match pg_type {
            "smallint" | "integer" | "bigint" | "int2" | "int4" | "int8" => Self::Int,
            "real" | "double precision" | "float4" | "float8" => Self::Float,
            "boolean" | "bool" => Self::Bool,
            _ => Self::Text,
        }
    }

    fn select_expr(self, column: &str) -> String {
        let ident = quote_identifier(column);
        match self {
            Self::Int => format!("{ident}::bigint AS {ident}"),
            Self::Float => format!("{ident}::float8 AS {ident}"),
            Self::Bool => ident.into_owned(),
            Self::Text => format!("{ident}::text AS {ident}"),
        }
    }
}

/// Reads tables from a `PostgreSQL` schema.
pub struct PostgresSource {
    client: Mutex<Client>,
    schema: Option<String>,
}

impl PostgresSource {
    /// Connect with a libpq-style connection string. Tables are looked up
    /// in `schema`, or in the session's current schema when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Connection`] if the connection fails.
    pub fn connect(connstr: &str, schema: Option<String>) -> error::Result<Self> {
        let client = Client::connect(connstr, NoTls).map_err(SourceError::connection)?;
        Ok(Self {
            client: Mutex::new(client),
            schema,
        })
    }

    fn lock_client(&self) -> error::Result<MutexGuard<'_, Client>> {
        self.client.lock().map_err(|_| SourceError::LockPoisoned)
    }

    /// Catalog name and columns of `table`, matched case-insensitively.
    fn describe_locked(
        &self,
        client: &mut Client,
        table: &str,
    ) -> error::Result<(String, Vec<SourceColumn>)> {
        let rows = client
            .query(
                "SELECT table_name::text, column_name::text, data_type::text, \
                        character_maximum_length::bigint, numeric_precision::bigint, \
                        numeric_scale::bigint \
                 FROM information_schema.columns \
                 WHERE table_schema = COALESCE($1::text, current_schema()) \
                   AND lower(table_name) = lower($2::text) \
                 ORDER BY table_name, ordinal_position",
                &[&self.schema, &table],
            )
            .map_err(|e| SourceError::query(format!("describe {table}"), e))?;

        let Some(first) = rows.first() else {
            return Err(SourceError::TableNotFound(table.to_string()));
        };
        let catalog_name: String = first.get(0);

        let columns = rows
            .iter()
            .filter(|row| row.get::<_, String>(0) == catalog_name)
            .map(|row| SourceColumn {
                name: row.get(1),
                type_name: row.get(2),
                length: row.get(3),
                precision: row.get(4),
                scale: row.get(5),
            })
            .collect();
        Ok((catalog_name, columns))
    }
}

fn decode(row: &postgres::Row, idx: usize, wire: WireType, column: &str) -> error::Result<Value> {
    let decode_err = |e: postgres::Error| SourceError::Decode {
        column: column.to_string(),
        message: e.to_string(),
    };
    let value = match wire {
        WireType::Int => row
            .try_get::<_, Option<i64>>(idx)
            .map_err(decode_err)?
            .map_or(Value::Null, Value::Int),
        WireType::Float => row
            .try_get::<_, Option<f64>>(idx)
            .map_err(decode_err)?
            .map_or(Value::Null, Value::Float),
        WireType::Bool => row
            .try_get::<_, Option<bool>>(idx)
            .map_err(decode_err)?
            .map_or(Value::Null, Value::Bool),
        WireType::Text => row
            .try_get::<_, Option<String>>(idx)
            .map_err(decode_err)?
            .map_or(Value::Null, Value::Text),
    };
    Ok(value)
}

impl SourceReader for PostgresSource {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    fn describe(&self, table: &str) -> error::Result<Vec<SourceColumn>> {
        let mut client = self.lock_client()?;
        self.describe_locked(&mut client, table).map(|(_, cols)| cols)
    }

    fn fetch(&self, table: &str, since: Option<&Since>) -> error::Result<Dataset> {
        let mut client = self.lock_client()?;
        let (catalog_name, described) = self.describe_locked(&mut client, table)?;
        let wires: Vec<WireType> = described
            .iter()
            .map(|c| WireType::for_pg_type(&c.type_name))
            .collect();

        let col_list = described
            .iter()
            .zip(&wires)
            .map(|(c, w)| w.select_expr(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let from = quote_table(self.schema.as_deref(), &catalog_name);

        let ctx = format!("fetch {table}");
        let rows = match since {
            Some(since) => {
                let filter_col = described
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(&since.column))
                    .map_or(since.column.as_str(), |c| c.name.as_str());
                let sql = format!(
                    "SELECT {col_list} FROM {from} WHERE {} > CAST($1::text AS TIMESTAMP)",
                    quote_identifier(filter_col)
                );
                tracing::debug!(table, sql = %sql, "Source query");
                client
                    .query(&sql, &[&format_timestamp(&since.after)])
                    .map_err(|e| SourceError::query(ctx, e))?
            }
            None => {
                let sql = format!("SELECT {col_list} FROM {from}");
                tracing::debug!(table, sql = %sql, "Source query");
                client.query(&sql, &[]).map_err(|e| SourceError::query(ctx, e))?
            }
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(described.len());
            for (idx, (col, wire)) in described.iter().zip(&wires).enumerate() {
                values.push(decode(row, idx, *wire, &col.name)?);
            }
            out.push(values);
        }

        let columns = described
            .iter()
            .map(|c| Column::new(c.name.clone(), c.column_type()))
            .collect();
        Ok(Dataset::new(columns, out))
    }

    fn now(&self) -> error::Result<NaiveDateTime> {
        let mut client = self.lock_client()?;
        let row = client
            .query_one("SELECT LOCALTIMESTAMP(0)::text", &[])
            .map_err(|e| SourceError::query("read source clock", e))?;
        let raw: String = row.get(0);
        parse_timestamp(&raw).map_err(|message| SourceError::Decode {
            column: "now".to_string(),
            message,
        })
    }
}
