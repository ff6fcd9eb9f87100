//! Core data model types.
//!
//! Format detectors produce an in-memory [`DataSet`] whose [`Schema`] is inferred from the
//! values they read. The normalizer turns a [`DataSet`] into a [`CanonicalRecord`], the
//! storage-agnostic artifact every backend persists.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Maximum number of rows kept in [`CanonicalRecord::preview`].
pub const PREVIEW_ROWS: usize = 100;

/// Logical data type inferred for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Every value in the column is missing.
    Null,
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number (also used for columns mixing ints and floats).
    Float64,
    /// UTF-8 string.
    Utf8,
    /// Date/time value. Only present before temporal canonicalization.
    Timestamp,
    /// Heterogeneous values, or nested lists/objects.
    Mixed,
}

impl DataType {
    /// Whether values of this type take part in numeric statistics.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }

    /// Infer the type of a column from its values, ignoring nulls.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut acc = Self::Null;
        for v in values {
            let t = match v {
                Value::Null => continue,
                Value::Bool(_) => Self::Bool,
                Value::Int64(_) => Self::Int64,
                Value::Float64(_) => Self::Float64,
                Value::Utf8(_) => Self::Utf8,
                Value::Timestamp(_) => Self::Timestamp,
                Value::List(_) | Value::Object(_) => Self::Mixed,
            };
            acc = match (acc, t) {
                (Self::Null, t) => t,
                (a, b) if a == b => a,
                (Self::Int64, Self::Float64) | (Self::Float64, Self::Int64) => Self::Float64,
                _ => return Self::Mixed,
            };
        }
        acc
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Inferred field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of fields describing the shape of a [`DataSet`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A single dynamically typed cell value.
///
/// Serializes as plain JSON (`null`, booleans, numbers, strings, arrays, objects).
/// [`Value::Timestamp`] serializes as an ISO-8601 string, but detectors never let one
/// escape canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
    /// Sequence of nested values.
    List(Vec<Value>),
    /// Nested object, keys in source order.
    Object(IndexMap<String, Value>),
    /// Date/time value.
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Whether this value is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value, if it is an integer or float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int64(i) => Some(*i as f64),
            Self::Float64(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(s) => f.write_str(s),
            Self::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            Self::List(_) | Self::Object(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int64(i),
                None => n.as_f64().map(Self::Float64).unwrap_or(Self::Null),
            },
            serde_json::Value::String(s) => Self::Utf8(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// In-memory tabular dataset produced by a format detector.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields; every
/// row has exactly one value per field.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Build a dataset from column names and rows, inferring the schema from the values.
    ///
    /// Short rows are padded with [`Value::Null`]; long rows are truncated.
    pub fn from_rows(columns: Vec<String>, mut rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        for row in &mut rows {
            row.resize(width, Value::Null);
        }
        let fields = columns
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let data_type = DataType::infer(rows.iter().filter_map(|r| r.get(idx)));
                Field::new(name, data_type)
            })
            .collect();
        Self::new(Schema::new(fields), rows)
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns in the dataset.
    pub fn column_count(&self) -> usize {
        self.schema.fields.len()
    }

    /// Iterate the values of the column at `idx`.
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |row| row.get(idx))
    }

    /// Re-infer every field's [`DataType`] from the current values.
    pub fn refresh_schema(&mut self) {
        for idx in 0..self.schema.fields.len() {
            let data_type = DataType::infer(self.rows.iter().filter_map(|r| r.get(idx)));
            if let Some(field) = self.schema.fields.get_mut(idx) {
                field.data_type = data_type;
            }
        }
    }
}

/// Supported upload file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileType {
    /// Comma-separated values (`.csv`).
    #[serde(rename = "CSV")]
    Csv,
    /// Spreadsheet workbook (`.xlsx`, `.xls`).
    #[serde(rename = "Excel")]
    Excel,
    /// JSON document (`.json`).
    #[serde(rename = "JSON")]
    Json,
}

impl FileType {
    /// Extensions accepted for upload, including the leading dot.
    pub const ALLOWED_EXTENSIONS: [&'static str; 4] = [".csv", ".xlsx", ".xls", ".json"];

    /// Parse a file type from a file extension (case-insensitive, leading dot optional).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xls" => Some(Self::Excel),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Label persisted in storage (`CSV`, `Excel`, `JSON`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "CSV",
            Self::Excel => "Excel",
            Self::Json => "JSON",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CSV" => Ok(Self::Csv),
            "Excel" => Ok(Self::Excel),
            "JSON" => Ok(Self::Json),
            other => Err(format!("unknown file type '{other}'")),
        }
    }
}

/// One preview row: column name -> value, in column order.
pub type Row = IndexMap<String, Value>;

/// Summary statistics for a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Arithmetic mean.
    pub mean: f64,
    /// Minimum value.
    pub min: f64,
    /// Maximum value.
    pub max: f64,
    /// Sample standard deviation (`0.0` when fewer than two values, `f64::MAX` when it overflows).
    pub std: f64,
}

/// Storage-agnostic normalized representation of an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Column names in source order.
    pub columns: Vec<String>,
    /// First [`PREVIEW_ROWS`] rows, temporal values canonicalized.
    pub preview: Vec<Row>,
    /// Total number of rows in the source.
    pub row_count: usize,
    /// Statistics for uniformly numeric columns.
    pub stats: IndexMap<String, ColumnStats>,
}

impl CanonicalRecord {
    /// Copy of this record with the preview cut down to at most `rows` rows.
    pub fn with_preview_limit(&self, rows: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            preview: self.preview.iter().take(rows).cloned().collect(),
            row_count: self.row_count,
            stats: self.stats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_widens_ints_and_floats() {
        let values = [Value::Int64(1), Value::Null, Value::Float64(2.5)];
        assert_eq!(DataType::infer(values.iter()), DataType::Float64);
    }

    #[test]
    fn infer_reports_mixed_for_text_and_numbers() {
        let values = [Value::Int64(1), Value::Utf8("x".to_string())];
        assert_eq!(DataType::infer(values.iter()), DataType::Mixed);
    }

    #[test]
    fn infer_all_null_is_null() {
        let values = [Value::Null, Value::Null];
        assert_eq!(DataType::infer(values.iter()), DataType::Null);
    }

    #[test]
    fn from_rows_pads_short_rows() {
        let ds = DataSet::from_rows(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![Value::Int64(1)], vec![Value::Int64(2), Value::Bool(true)]],
        );
        assert_eq!(ds.rows[0], vec![Value::Int64(1), Value::Null]);
        assert_eq!(ds.schema.fields[1].data_type, DataType::Bool);
    }

    #[test]
    fn file_type_from_extension_is_case_insensitive() {
        assert_eq!(FileType::from_extension(".XLSX"), Some(FileType::Excel));
        assert_eq!(FileType::from_extension("csv"), Some(FileType::Csv));
        assert_eq!(FileType::from_extension(".parquet"), None);
    }

    #[test]
    fn value_json_roundtrip_keeps_integers() {
        let v: Value = serde_json::from_str(r#"{"a":1,"b":[1.5,null],"c":"x"}"#).unwrap();
        let Value::Object(map) = &v else {
            panic!("expected object, got {v:?}");
        };
        assert_eq!(map["a"], Value::Int64(1));
        assert_eq!(map["b"], Value::List(vec![Value::Float64(1.5), Value::Null]));
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"{"a":1,"b":[1.5,null],"c":"x"}"#);
    }
}
