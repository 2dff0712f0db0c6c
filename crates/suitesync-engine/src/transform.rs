//! Row normalization applied to every fetched dataset before it is written.
//!
//! Rules, per column by declared type:
//!
//! | column type | missing value     | present value                    |
//! |-------------|-------------------|----------------------------------|
//! | timestamp   | epoch sentinel    | parsed and truncated to seconds  |
//! | integer     | `0`               | unchanged                        |
//! | float       | `0.0`             | unchanged                        |
//! | other       | explicit null     | unchanged                        |
//!
//! Primary-key columns are always coerced to integers; a null or
//! non-numeric key fails the whole dataset.

use suitesync_types::time::{epoch, parse_timestamp, truncate_subsec};
use suitesync_types::{ColumnType, Dataset, SyncError, SyncStage, Value};

/// Normalize `data` in place and return it.
///
/// # Errors
///
/// Returns a schema error when a key column is absent, and a data error
/// when a key is not an integer or a timestamp cell cannot be parsed.
pub fn transform(mut data: Dataset, primary_key: &[String]) -> Result<Dataset, SyncError> {
    let key_idx = primary_key
        .iter()
        .map(|k| {
            data.column_index(k).ok_or_else(|| {
                SyncError::schema(
                    SyncStage::Transform,
                    format!("primary key column '{k}' not in fetched columns"),
                )
            })
        })
        .collect::<Result<Vec<usize>, SyncError>>()?;

    for &i in &key_idx {
        data.columns[i].column_type = ColumnType::Integer;
    }

    let columns = data.columns.clone();
    for (row_no, row) in data.rows.iter_mut().enumerate() {
        for (i, cell) in row.iter_mut().enumerate() {
            let column = &columns[i];
            let value = std::mem::replace(cell, Value::Null);
            *cell = if key_idx.contains(&i) {
                coerce_key(value).map_err(|reason| {
                    SyncError::transform(format!(
                        "row {row_no}: primary key '{}' {reason}",
                        column.name
                    ))
                })?
            } else {
                fill(value, column.column_type).map_err(|reason| {
                    SyncError::transform(format!("row {row_no}: column '{}' {reason}", column.name))
                })?
            };
        }
    }

    Ok(data)
}

/// Coerce a key cell to an integer. Floats truncate toward zero.
#[allow(clippy::cast_possible_truncation)]
fn coerce_key(value: Value) -> Result<Value, String> {
    match value {
        Value::Int(v) => Ok(Value::Int(v)),
        Value::Float(v) if v.is_finite() => Ok(Value::Int(v.trunc() as i64)),
        Value::Text(s) => {
            let trimmed = s.trim();
            if let Ok(v) = trimmed.parse::<i64>() {
                return Ok(Value::Int(v));
            }
            match trimmed.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Value::Int(v.trunc() as i64)),
                _ => Err(format!("is not numeric: '{s}'")),
            }
        }
        Value::Null => Err("is null".to_string()),
        other => Err(format!("cannot be converted to an integer: '{other}'")),
    }
}

fn fill(value: Value, column_type: ColumnType) -> Result<Value, String> {
    match (column_type, value) {
        (ColumnType::Timestamp, Value::Null) => Ok(Value::Timestamp(epoch())),
        (ColumnType::Timestamp, Value::Timestamp(ts)) => Ok(Value::Timestamp(truncate_subsec(ts))),
        (ColumnType::Timestamp, Value::Text(s)) => parse_timestamp(&s)
            .map(|ts| Value::Timestamp(truncate_subsec(ts)))
            .map_err(|e| format!("has {e}")),
        (ColumnType::Timestamp, other) => Err(format!("is not a timestamp: '{other}'")),
        (ColumnType::Integer, Value::Null) => Ok(Value::Int(0)),
        (ColumnType::Float, Value::Null) => Ok(Value::Float(0.0)),
        (_, value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use suitesync_types::{Column, ErrorCategory};

    fn vendors(rows: Vec<Vec<Value>>) -> Dataset {
        Dataset::new(
            vec![
                Column::new("VENDOR_ID", ColumnType::Text),
                Column::new("NAME", ColumnType::Text),
                Column::new("BALANCE", ColumnType::Float),
                Column::new("TERMS_DAYS", ColumnType::Integer),
                Column::new("DATE_LAST_MODIFIED", ColumnType::Timestamp),
            ],
            rows,
        )
    }

    fn key() -> Vec<String> {
        vec!["vendor_id".to_string()]
    }

    #[test]
    fn missing_values_get_type_defaults() {
        let data = vendors(vec![vec![
            Value::Int(1),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ]]);
        let out = transform(data, &key()).unwrap();
        assert_eq!(
            out.rows[0],
            vec![
                Value::Int(1),
                Value::Null,
                Value::Float(0.0),
                Value::Int(0),
                Value::Timestamp(epoch()),
            ]
        );
        assert_eq!(out.columns[0].column_type, ColumnType::Integer);
    }

    #[test]
    fn present_timestamps_are_canonicalized() {
        let data = vendors(vec![vec![
            Value::Text("7".into()),
            Value::Text("Acme".into()),
            Value::Float(1.5),
            Value::Int(30),
            Value::Text("2024-03-01T10:15:30.250".into()),
        ]]);
        let out = transform(data, &key()).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 15, 30)
            .unwrap();
        assert_eq!(out.rows[0][0], Value::Int(7));
        assert_eq!(out.rows[0][4], Value::Timestamp(expected));
        assert_eq!(out.rows[0][4].to_string(), "2024-03-01 10:15:30");
    }

    #[test]
    fn float_keys_truncate() {
        let data = vendors(vec![vec![
            Value::Float(12.9),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ]]);
        let out = transform(data, &key()).unwrap();
        assert_eq!(out.rows[0][0], Value::Int(12));
    }

    #[test]
    fn null_key_fails() {
        let data = vendors(vec![vec![
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ]]);
        let err = transform(data, &key()).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Data);
        assert!(err.message.contains("is null"), "{}", err.message);
    }

    #[test]
    fn non_numeric_key_fails() {
        let data = vendors(vec![vec![
            Value::Text("V-100".into()),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ]]);
        let err = transform(data, &key()).unwrap_err();
        assert!(err.message.contains("is not numeric"));
    }

    #[test]
    fn unknown_key_column_is_schema_error() {
        let err = transform(vendors(vec![]), &["ID".to_string()]).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Schema);
        assert_eq!(err.stage, SyncStage::Transform);
    }

    #[test]
    fn time_of_day_values_pass_through() {
        let data = Dataset::new(
            vec![
                Column::new("VENDOR_ID", ColumnType::Text),
                Column::new("CUTOFF_TIME", ColumnType::from_type_name("TIME")),
            ],
            vec![
                vec![Value::Int(1), Value::Text("10:15:00".into())],
                vec![Value::Int(2), Value::Null],
            ],
        );
        let out = transform(data, &key()).unwrap();
        assert_eq!(out.rows[0][1], Value::Text("10:15:00".into()));
        assert_eq!(out.rows[1][1], Value::Null);
    }

    #[test]
    fn unparseable_timestamp_fails() {
        let data = vendors(vec![vec![
            Value::Int(1),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Text("yesterday".into()),
        ]]);
        let err = transform(data, &key()).unwrap_err();
        assert!(err.message.contains("DATE_LAST_MODIFIED"));
    }
}
