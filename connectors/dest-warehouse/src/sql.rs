//! SQL text builders shared by both dialects.
//!
//! Every identifier passes through `quote_identifier`; every value is a
//! placeholder. Placeholder syntax is supplied by the caller.

use std::fmt::Write as _;

use pg_escape::quote_identifier;
use suitesync_types::TableRef;

use crate::warehouse::{MergeColumn, MergePlan, TableDef};

/// Upper bound on rows per multi-row `INSERT`.
pub const INSERT_CHUNK_SIZE: usize = 1000;

/// Quoted `schema.table`.
#[must_use]
pub fn qualified(table: &TableRef) -> String {
    format!(
        "{}.{}",
        quote_identifier(&table.schema),
        quote_identifier(&table.name)
    )
}

fn column_list<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names
        .map(|n| quote_identifier(n).into_owned())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rows per statement so that `rows * width` stays within `max_params`.
#[must_use]
pub fn chunk_rows(width: usize, max_params: usize) -> usize {
    if width == 0 {
        return INSERT_CHUNK_SIZE;
    }
    (max_params / width).clamp(1, INSERT_CHUNK_SIZE)
}

#[must_use]
pub fn create_table(def: &TableDef, if_not_exists: bool) -> String {
    let mut sql = format!(
        "CREATE TABLE {}{} (\n",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        qualified(&def.table)
    );
    let mut lines: Vec<String> = def
        .columns
        .iter()
        .map(|c| format!("    {} {}", quote_identifier(&c.name), c.data_type))
        .collect();
    if !def.primary_key.is_empty() {
        lines.push(format!(
            "    PRIMARY KEY ({})",
            column_list(def.primary_key.iter().map(String::as_str))
        ));
    }
    sql.push_str(&lines.join(",\n"));
    sql.push_str("\n)");
    sql
}

#[must_use]
pub fn drop_table(table: &TableRef) -> String {
    format!("DROP TABLE IF EXISTS {}", qualified(table))
}

/// Multi-row `INSERT ... VALUES` for `rows` rows of `columns`.
///
/// `placeholder(n, col)` renders the 1-based parameter `n` bound to column
/// index `col`.
pub fn insert_values(
    table: &TableRef,
    columns: &[&str],
    rows: usize,
    placeholder: impl Fn(usize, usize) -> String,
) -> String {
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        qualified(table),
        column_list(columns.iter().copied())
    );
    let mut n = 0usize;
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..columns.len() {
            if col > 0 {
                sql.push_str(", ");
            }
            n += 1;
            sql.push_str(&placeholder(n, col));
        }
        sql.push(')');
    }
    sql
}

/// `ON CONFLICT` clause updating every non-key column from `EXCLUDED`.
#[must_use]
pub fn upsert_clause(key: &[&str], columns: &[&str]) -> String {
    let pk_cols = column_list(key.iter().copied());
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !key.iter().any(|k| k.eq_ignore_ascii_case(c)))
        .map(|c| {
            let q = quote_identifier(c);
            format!("{q} = EXCLUDED.{q}")
        })
        .collect();
    if updates.is_empty() {
        format!(" ON CONFLICT ({pk_cols}) DO NOTHING")
    } else {
        format!(" ON CONFLICT ({pk_cols}) DO UPDATE SET {}", updates.join(", "))
    }
}

/// `t.k = s.k AND ...` over the key columns.
fn key_match(key: &[MergeColumn]) -> String {
    key.iter()
        .map(|k| {
            format!(
                "t.{} = s.{}",
                quote_identifier(&k.target),
                quote_identifier(&k.source)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Source rows whose key already exists in the target.
#[must_use]
pub fn matched_count(plan: &MergePlan) -> String {
    format!(
        "SELECT COUNT(*) FROM {} AS s WHERE EXISTS (SELECT 1 FROM {} AS t WHERE {})",
        qualified(&plan.source),
        qualified(&plan.target),
        key_match(&plan.key)
    )
}

#[must_use]
pub fn row_count(table: &TableRef) -> String {
    format!("SELECT COUNT(*) FROM {}", qualified(table))
}

/// `PostgreSQL` `MERGE`. The audit value, when present, is `audit_param`.
#[must_use]
pub fn merge(plan: &MergePlan, audit_param: &str) -> String {
    let updates: Vec<String> = plan
        .update_columns()
        .map(|c| {
            format!(
                "{} = s.{}",
                quote_identifier(&c.target),
                quote_identifier(&c.source)
            )
        })
        .collect();
    let matched = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("UPDATE SET {}", updates.join(", "))
    };

    let (insert_cols, insert_vals) = insert_lists(plan, audit_param);
    format!(
        "MERGE INTO {} AS t USING {} AS s ON {} \
         WHEN MATCHED THEN {matched} \
         WHEN NOT MATCHED THEN INSERT ({insert_cols}) VALUES ({insert_vals})",
        qualified(&plan.target),
        qualified(&plan.source),
        key_match(&plan.key),
    )
}

/// `UPDATE ... FROM` half of a two-statement merge. `None` when every
/// carried column is a key column.
#[must_use]
pub fn update_from(plan: &MergePlan) -> Option<String> {
    let updates: Vec<String> = plan
        .update_columns()
        .map(|c| {
            format!(
                "{} = s.{}",
                quote_identifier(&c.target),
                quote_identifier(&c.source)
            )
        })
        .collect();
    if updates.is_empty() {
        return None;
    }
    Some(format!(
        "UPDATE {} AS t SET {} FROM {} AS s WHERE {}",
        qualified(&plan.target),
        updates.join(", "),
        qualified(&plan.source),
        key_match(&plan.key)
    ))
}

/// `INSERT ... SELECT ... WHERE NOT EXISTS` half of a two-statement merge.
#[must_use]
pub fn insert_missing(plan: &MergePlan, audit_param: &str) -> String {
    let (insert_cols, select_vals) = insert_lists(plan, audit_param);
    format!(
        "INSERT INTO {target} ({insert_cols}) SELECT {select_vals} FROM {source} AS s \
         WHERE NOT EXISTS (SELECT 1 FROM {target} AS t WHERE {on})",
        target = qualified(&plan.target),
        source = qualified(&plan.source),
        on = key_match(&plan.key),
    )
}

fn insert_lists(plan: &MergePlan, audit_param: &str) -> (String, String) {
    let mut cols = column_list(plan.columns.iter().map(|c| c.target.as_str()));
    let mut vals = plan
        .columns
        .iter()
        .map(|c| format!("s.{}", quote_identifier(&c.source)))
        .collect::<Vec<_>>()
        .join(", ");
    if let Some(audit) = &plan.audit {
        let _ = write!(cols, ", {}", quote_identifier(&audit.name));
        let _ = write!(vals, ", {audit_param}");
    }
    (cols, vals)
}

/// `INSERT INTO to (...) SELECT ... FROM from WHERE column > <param>`.
#[must_use]
pub fn insert_newer(
    from: &TableRef,
    to: &TableRef,
    columns: &[MergeColumn],
    column: &str,
    param: &str,
) -> String {
    format!(
        "INSERT INTO {} ({}) SELECT {} FROM {} WHERE {} > {param}",
        qualified(to),
        column_list(columns.iter().map(|c| c.target.as_str())),
        column_list(columns.iter().map(|c| c.source.as_str())),
        qualified(from),
        quote_identifier(column),
    )
}

#[must_use]
pub fn count_newer(table: &TableRef, column: &str, param: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE {} > {param}",
        qualified(table),
        quote_identifier(column)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{AuditColumn, TargetColumn};
    use chrono::NaiveDateTime;

    fn plan(audit: bool) -> MergePlan {
        MergePlan {
            source: TableRef::new("FINANCE_STG", "VW_VENDOR"),
            target: TableRef::new("FINANCE_DM", "DIM_VENDOR"),
            key: vec![MergeColumn::same("DW_KEY_ID")],
            columns: vec![MergeColumn::same("DW_KEY_ID"), MergeColumn::same("NAME")],
            audit: audit.then(|| AuditColumn {
                name: "DW_INSERT_DT".into(),
                value: NaiveDateTime::default(),
            }),
        }
    }

    #[test]
    fn create_table_with_primary_key() {
        let def = TableDef {
            table: TableRef::new("FINANCE", "VENDORS"),
            columns: vec![
                TargetColumn::new("VENDOR_ID", "NUMERIC(38,0)"),
                TargetColumn::new("NAME", "VARCHAR(100)"),
            ],
            primary_key: vec!["VENDOR_ID".into()],
        };
        let sql = create_table(&def, false);
        assert_eq!(
            sql,
            "CREATE TABLE \"FINANCE\".\"VENDORS\" (\n    \"VENDOR_ID\" NUMERIC(38,0),\n    \
             \"NAME\" VARCHAR(100),\n    PRIMARY KEY (\"VENDOR_ID\")\n)"
        );
        assert!(create_table(&def, true).starts_with("CREATE TABLE IF NOT EXISTS "));
    }

    #[test]
    fn insert_values_numbers_params_across_rows() {
        let sql = insert_values(&TableRef::new("s", "t"), &["a", "b"], 2, |n, _| format!("?{n}"));
        assert_eq!(sql, "INSERT INTO s.t (a, b) VALUES (?1, ?2), (?3, ?4)");
    }

    #[test]
    fn insert_values_passes_column_index() {
        let types = ["bigint", "text"];
        let sql = insert_values(&TableRef::new("s", "t"), &["a", "b"], 1, |n, col| {
            format!("CAST(${n}::text AS {})", types[col])
        });
        assert!(sql.ends_with("(CAST($1::text AS bigint), CAST($2::text AS text))"));
    }

    #[test]
    fn upsert_clause_updates_non_key_columns() {
        let clause = upsert_clause(&["id"], &["id", "label", "amount"]);
        assert_eq!(
            clause,
            " ON CONFLICT (id) DO UPDATE SET label = EXCLUDED.label, amount = EXCLUDED.amount"
        );
        assert_eq!(upsert_clause(&["id"], &["ID"]), " ON CONFLICT (id) DO NOTHING");
    }

    #[test]
    fn merge_statement_shape() {
        let sql = merge(&plan(true), "CAST($1::text AS TIMESTAMP)");
        assert!(sql.starts_with("MERGE INTO \"FINANCE_DM\".\"DIM_VENDOR\" AS t USING"));
        assert!(sql.contains("ON t.\"DW_KEY_ID\" = s.\"DW_KEY_ID\""));
        assert!(sql.contains("WHEN MATCHED THEN UPDATE SET \"NAME\" = s.\"NAME\""));
        assert!(sql.contains(
            "INSERT (\"DW_KEY_ID\", \"NAME\", \"DW_INSERT_DT\") \
             VALUES (s.\"DW_KEY_ID\", s.\"NAME\", CAST($1::text AS TIMESTAMP))"
        ));
    }

    #[test]
    fn merge_with_only_key_does_nothing_on_match() {
        let mut p = plan(false);
        p.columns.truncate(1);
        assert!(merge(&p, "").contains("WHEN MATCHED THEN DO NOTHING"));
        assert!(update_from(&p).is_none());
    }

    #[test]
    fn two_statement_merge() {
        let p = plan(true);
        let update = update_from(&p).unwrap();
        assert_eq!(
            update,
            "UPDATE \"FINANCE_DM\".\"DIM_VENDOR\" AS t SET \"NAME\" = s.\"NAME\" \
             FROM \"FINANCE_STG\".\"VW_VENDOR\" AS s WHERE t.\"DW_KEY_ID\" = s.\"DW_KEY_ID\""
        );
        let insert = insert_missing(&p, "?1");
        assert!(insert.contains("SELECT s.\"DW_KEY_ID\", s.\"NAME\", ?1 FROM"));
        assert!(insert.contains("WHERE NOT EXISTS"));
    }

    #[test]
    fn insert_newer_maps_columns() {
        let cols = vec![MergeColumn {
            source: "id".into(),
            target: "ID".into(),
        }];
        let sql = insert_newer(
            &TableRef::new("l", "v"),
            &TableRef::new("s", "t"),
            &cols,
            "INSERT_DT",
            "?1",
        );
        assert_eq!(
            sql,
            "INSERT INTO s.t (\"ID\") SELECT id FROM l.v WHERE \"INSERT_DT\" > ?1"
        );
    }

    #[test]
    fn chunk_rows_respects_param_limit() {
        assert_eq!(chunk_rows(10, 65535), 1000);
        assert_eq!(chunk_rows(100, 65535), 655);
        assert_eq!(chunk_rows(100_000, 65535), 1);
        assert_eq!(chunk_rows(0, 65535), INSERT_CHUNK_SIZE);
    }
}
