//! CSV detection.

use std::collections::{HashMap, HashSet};

use crate::error::{IngestionError, IngestionResult};
use crate::normalize::temporal::timestamps_to_text;
use crate::types::{DataSet, FileType, Value};

/// Cell contents treated as missing values.
const NA_TOKENS: [&str; 17] = [
    "", "#N/A", "#N/A N/A", "#NA", "-NaN", "-nan", "<NA>", "N/A", "NA", "NULL", "NaN", "None",
    "n/a", "nan", "null", "1.#IND", "1.#QNAN",
];

/// Parse CSV bytes into a [`DataSet`].
///
/// Rules:
///
/// - The first record is the header. Empty names become `Unnamed: {idx}`, duplicates are
///   suffixed `.1`, `.2`, ...
/// - Rows shorter than the header are padded with nulls; longer rows are rejected.
/// - Types are inferred per column: integers, then floats, then booleans, else text.
/// - Dates are never inferred; values stay as the text found in the file.
pub fn detect_csv(bytes: &[u8]) -> IngestionResult<DataSet> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);
    detect_csv_from_reader(&mut rdr)
}

/// Parse CSV from an existing CSV reader.
pub fn detect_csv_from_reader<R: std::io::Read>(rdr: &mut csv::Reader<R>) -> IngestionResult<DataSet> {
    let headers = rdr.headers().map_err(csv_error)?.clone();
    if headers.is_empty() || (headers.len() == 1 && headers.get(0) == Some("")) {
        return Err(IngestionError::format(FileType::Csv, "no columns to parse from file"));
    }
    let columns = dedupe_headers(headers.iter());
    let width = columns.len();

    let mut raw_columns: Vec<Vec<Option<String>>> = vec![Vec::new(); width];
    for (row_idx0, result) in rdr.records().enumerate() {
        // 1-based, +1 again because the header is line 1.
        let user_row = row_idx0 + 2;
        let record = result.map_err(csv_error)?;
        if record.len() > width {
            return Err(IngestionError::format(
                FileType::Csv,
                format!(
                    "expected {width} fields in line {user_row}, saw {}",
                    record.len()
                ),
            ));
        }
        for (idx, column) in raw_columns.iter_mut().enumerate() {
            let cell = record.get(idx).filter(|c| !NA_TOKENS.contains(c));
            column.push(cell.map(str::to_owned));
        }
    }

    let typed: Vec<Vec<Value>> = raw_columns.into_iter().map(infer_column).collect();
    let row_count = typed.first().map_or(0, Vec::len);
    let mut rows: Vec<Vec<Value>> = (0..row_count).map(|_| Vec::with_capacity(width)).collect();
    for column in typed {
        for (row, value) in rows.iter_mut().zip(column) {
            row.push(value);
        }
    }

    let mut ds = DataSet::from_rows(columns, rows);
    timestamps_to_text(&mut ds);
    Ok(ds)
}

fn csv_error(e: csv::Error) -> IngestionError {
    IngestionError::format(FileType::Csv, e.to_string())
}

/// Make header names unique and non-empty, keeping their order.
pub(crate) fn dedupe_headers<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::new();
    for (idx, name) in names.enumerate() {
        let base = if name.is_empty() {
            format!("Unnamed: {idx}")
        } else {
            name.to_owned()
        };
        let mut candidate = base.clone();
        while used.contains(&candidate) {
            let counter = counters.entry(base.clone()).or_insert(0);
            *counter += 1;
            candidate = format!("{base}.{counter}");
        }
        used.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Int,
    Float,
    Bool,
    Text,
}

fn classify(cells: &[Option<String>]) -> CellKind {
    let mut present = cells.iter().flatten();
    if present.clone().all(|c| c.trim().parse::<i64>().is_ok()) {
        CellKind::Int
    } else if present.clone().all(|c| c.trim().parse::<f64>().is_ok()) {
        CellKind::Float
    } else if present.all(|c| parse_bool(c).is_some()) {
        CellKind::Bool
    } else {
        CellKind::Text
    }
}

fn infer_column(cells: Vec<Option<String>>) -> Vec<Value> {
    let kind = classify(&cells);
    cells
        .into_iter()
        .map(|cell| match (kind, cell) {
            (_, None) => Value::Null,
            (CellKind::Int, Some(s)) => s.trim().parse().map_or(Value::Null, Value::Int64),
            (CellKind::Float, Some(s)) => s.trim().parse().map_or(Value::Null, Value::Float64),
            (CellKind::Bool, Some(s)) => parse_bool(&s).map_or(Value::Null, Value::Bool),
            (CellKind::Text, Some(s)) => Value::Utf8(s),
        })
        .collect()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
