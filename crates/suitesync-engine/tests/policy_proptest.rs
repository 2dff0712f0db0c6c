use proptest::prelude::*;
use suitesync_engine::config::parser;
use suitesync_engine::config::validator;
use suitesync_engine::sync::merge_via_transient;
use suitesync_engine::transform::transform;
use suitesync_types::time::epoch;
use suitesync_types::{Column, ColumnType, Dataset, TableRef, Value};
use suitesync_warehouse::{SqliteWarehouse, Warehouse};

fn pipeline_yaml(primary_key: &str) -> String {
    format!(
        r#"
version: "1.0"
environment: PROP_LANDING
source:
  kind: sqlite
  path: /tmp/netsuite.db
warehouse:
  kind: sqlite
  path: ":memory:"
tables:
  - name: VENDORS
    primary_key: {primary_key}
"#
    )
}

fn vendors(rows: &[(i64, Option<i64>, Option<f64>)]) -> Dataset {
    Dataset::new(
        vec![
            Column::new("VENDOR_ID", ColumnType::Text),
            Column::new("TERMS_DAYS", ColumnType::Integer),
            Column::new("BALANCE", ColumnType::Float),
            Column::new("DATE_LAST_MODIFIED", ColumnType::Timestamp),
        ],
        rows.iter()
            .map(|(id, terms, balance)| {
                vec![
                    Value::Text(id.to_string()),
                    terms.map_or(Value::Null, Value::Int),
                    balance.map_or(Value::Null, Value::Float),
                    Value::Null,
                ]
            })
            .collect(),
    )
}

fn landing() -> SqliteWarehouse {
    let wh = SqliteWarehouse::in_memory().unwrap();
    for schema in ["FINANCE", "FINANCE_TRANSIENT"] {
        wh.ensure_schema(schema).unwrap();
    }
    wh.execute(
        "CREATE TABLE FINANCE.VENDORS (VENDOR_ID BIGINT PRIMARY KEY, TERMS_DAYS BIGINT, \
         BALANCE FLOAT, DATE_LAST_MODIFIED TIMESTAMP)",
    )
    .unwrap();
    wh
}

proptest! {
    #[test]
    fn table_requires_primary_key(pk_len in 0_usize..3) {
        let primary_key = match pk_len {
            0 => "[]",
            1 => "VENDOR_ID",
            _ => "[VENDOR_ID, SUBSIDIARY_ID]",
        };
        let config = parser::parse_pipeline_str(&pipeline_yaml(primary_key))
            .expect("generated yaml must parse");
        let result = validator::validate_pipeline(&config);

        if pk_len == 0 {
            prop_assert!(result.is_err());
        } else {
            prop_assert!(result.is_ok());
        }
    }

    #[test]
    fn key_columns_reject_unsafe_names(key in "[A-Z_][A-Z0-9_]{0,12}", bad in prop::sample::select(vec![' ', ';', '"', '-', '('])) {
        let valid = parser::parse_pipeline_str(&pipeline_yaml(&format!("'{key}'"))).unwrap();
        prop_assert!(validator::validate_pipeline(&valid).is_ok());

        let unsafe_key = format!("'{key}{bad}X'");
        let invalid = parser::parse_pipeline_str(&pipeline_yaml(&unsafe_key)).unwrap();
        prop_assert!(validator::validate_pipeline(&invalid).is_err());
    }

    #[test]
    fn transform_fills_missing_values_and_coerces_keys(
        rows in prop::collection::vec((any::<i64>(), any::<Option<i64>>(), any::<Option<i32>>()), 1..20),
    ) {
        let rows: Vec<(i64, Option<i64>, Option<f64>)> = rows
            .into_iter()
            .map(|(id, terms, balance)| (id, terms, balance.map(f64::from)))
            .collect();
        let out = transform(vendors(&rows), &["VENDOR_ID".to_string()]).unwrap();

        prop_assert_eq!(out.columns[0].column_type, ColumnType::Integer);
        prop_assert_eq!(out.rows.len(), rows.len());
        for (row, (id, terms, balance)) in out.rows.iter().zip(&rows) {
            prop_assert_eq!(&row[0], &Value::Int(*id));
            prop_assert_eq!(&row[1], &Value::Int(terms.unwrap_or(0)));
            prop_assert_eq!(&row[2], &Value::Float(balance.unwrap_or(0.0)));
            prop_assert_eq!(&row[3], &Value::Timestamp(epoch()));
            prop_assert!(row.iter().all(|v| !v.is_null()));
        }
    }

    #[test]
    fn applying_a_delta_twice_is_idempotent(
        ids in prop::collection::btree_set(0_i64..50, 1..15),
        terms in 0_i64..90,
    ) {
        let wh = landing();
        let rows: Vec<(i64, Option<i64>, Option<f64>)> =
            ids.iter().map(|id| (*id, Some(terms), None)).collect();
        let data = transform(vendors(&rows), &["VENDOR_ID".to_string()]).unwrap();
        let landing = TableRef::new("FINANCE", "VENDORS");
        let transient = TableRef::new("FINANCE_TRANSIENT", "VENDORS");
        let key = ["VENDOR_ID".to_string()];

        let first = merge_via_transient(&wh, &data, &transient, &landing, &key).unwrap();
        let after_first = wh.read_table(&landing).unwrap().rows;
        let second = merge_via_transient(&wh, &data, &transient, &landing, &key).unwrap();
        let after_second = wh.read_table(&landing).unwrap().rows;

        prop_assert_eq!(first.inserted, ids.len() as u64);
        prop_assert_eq!(second.inserted, 0);
        prop_assert_eq!(second.updated, ids.len() as u64);
        prop_assert_eq!(after_first, after_second);
    }
}
