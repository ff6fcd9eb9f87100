//! JSON detection.
//!
//! Supported inputs:
//! - A JSON array of records: `[{"a":1}, {"a":2}]` (ragged keys are filled with null)
//! - An object with a `data` array: `{"data": [{"a":1}, {"a":2}]}`
//! - Any other object, flattened to a single row with dotted paths: `{"x":{"y":1}}` has
//!   one column `x.y`
//!
//! A top-level array of scalars becomes a single column named `0`.

use indexmap::IndexSet;
use serde_json::Map;

use super::csv::dedupe_headers;
use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, FileType, Value};

const UNSUPPORTED: &str = "unsupported JSON structure";

/// Parse UTF-8 JSON bytes into a [`DataSet`].
pub fn detect_json(bytes: &[u8]) -> IngestionResult<DataSet> {
    let text = std::str::from_utf8(bytes).map_err(|e| json_error(e.to_string()))?;
    detect_json_from_str(text)
}

/// Parse JSON from an in-memory string into a [`DataSet`].
pub fn detect_json_from_str(input: &str) -> IngestionResult<DataSet> {
    let trimmed = input.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Err(json_error(UNSUPPORTED));
    }

    let v: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| json_error(e.to_string()))?;
    match v {
        serde_json::Value::Array(items) => records_to_dataset(items),
        serde_json::Value::Object(mut obj) => {
            if matches!(obj.get("data"), Some(serde_json::Value::Array(_))) {
                match obj.remove("data") {
                    Some(serde_json::Value::Array(items)) => records_to_dataset(items),
                    _ => Err(json_error(UNSUPPORTED)),
                }
            } else if obj.is_empty() {
                Err(json_error(UNSUPPORTED))
            } else {
                Ok(flatten_to_single_row(obj))
            }
        }
        _ => Err(json_error(UNSUPPORTED)),
    }
}

fn json_error(message: impl Into<String>) -> IngestionError {
    IngestionError::format(FileType::Json, message)
}

fn records_to_dataset(items: Vec<serde_json::Value>) -> IngestionResult<DataSet> {
    let objects = items.iter().filter(|v| v.is_object()).count();
    if objects == 0 && !items.is_empty() {
        let rows = items.into_iter().map(|v| vec![Value::from(v)]).collect();
        return Ok(DataSet::from_rows(vec!["0".to_string()], rows));
    }
    if objects != items.len() {
        return Err(json_error(
            "mixing objects and scalar values in a top-level array is not supported",
        ));
    }

    // Column order is first appearance across records.
    let mut columns: IndexSet<String> = IndexSet::new();
    let mut records: Vec<Map<String, serde_json::Value>> = Vec::with_capacity(items.len());
    for item in items {
        if let serde_json::Value::Object(obj) = item {
            for key in obj.keys() {
                if !columns.contains(key) {
                    columns.insert(key.clone());
                }
            }
            records.push(obj);
        }
    }

    let rows = records
        .into_iter()
        .map(|mut obj| {
            columns
                .iter()
                .map(|col| obj.remove(col).map_or(Value::Null, Value::from))
                .collect()
        })
        .collect();

    Ok(DataSet::from_rows(columns.into_iter().collect(), rows))
}

fn flatten_to_single_row(obj: Map<String, serde_json::Value>) -> DataSet {
    let mut flat: Vec<(String, Value)> = Vec::new();
    flatten_into(&mut flat, None, obj);
    let (paths, row): (Vec<String>, Vec<Value>) = flat.into_iter().unzip();
    // A literal dotted key can collide with a flattened path.
    let columns = dedupe_headers(paths.iter().map(String::as_str));
    DataSet::from_rows(columns, vec![row])
}

fn flatten_into(out: &mut Vec<(String, Value)>, prefix: Option<&str>, obj: Map<String, serde_json::Value>) {
    for (key, value) in obj {
        let path = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key,
        };
        match value {
            serde_json::Value::Object(inner) if !inner.is_empty() => {
                flatten_into(out, Some(&path), inner);
            }
            other => out.push((path, Value::from(other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn ragged_records_fill_missing_keys_with_null() {
        let ds = detect_json_from_str(r#"[{"a":1,"b":"x"},{"c":true,"a":2}]"#).unwrap();
        let names: Vec<&str> = ds.schema.field_names().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(ds.rows[0], vec![Value::Int64(1), Value::Utf8("x".into()), Value::Null]);
        assert_eq!(ds.rows[1], vec![Value::Int64(2), Value::Null, Value::Bool(true)]);
        assert_eq!(ds.schema.fields[0].data_type, DataType::Int64);
    }

    #[test]
    fn nested_object_is_flattened_with_dotted_paths() {
        let ds = detect_json_from_str(r#"{"x":{"y":1,"z":{"w":"deep"}},"tags":[1,2]}"#).unwrap();
        let names: Vec<&str> = ds.schema.field_names().collect();
        assert_eq!(names, vec!["x.y", "x.z.w", "tags"]);
        assert_eq!(ds.row_count(), 1);
        assert_eq!(ds.rows[0][0], Value::Int64(1));
        assert_eq!(ds.rows[0][2], Value::List(vec![Value::Int64(1), Value::Int64(2)]));
    }

    #[test]
    fn data_key_that_is_not_a_list_is_flattened() {
        let ds = detect_json_from_str(r#"{"data":{"a":1}}"#).unwrap();
        let names: Vec<&str> = ds.schema.field_names().collect();
        assert_eq!(names, vec!["data.a"]);
    }

    #[test]
    fn dotted_key_colliding_with_nested_path_keeps_both_values() {
        let ds = detect_json_from_str(r#"{"a.b":1,"a":{"b":"two"}}"#).unwrap();
        let names: Vec<&str> = ds.schema.field_names().collect();
        assert_eq!(names, vec!["a.b", "a.b.1"]);
        assert_eq!(ds.rows[0], vec![Value::Int64(1), Value::Utf8("two".into())]);
    }

    #[test]
    fn scalar_array_becomes_column_zero() {
        let ds = detect_json_from_str("[1, 2, 3]").unwrap();
        let names: Vec<&str> = ds.schema.field_names().collect();
        assert_eq!(names, vec!["0"]);
        assert_eq!(ds.row_count(), 3);
    }
}
