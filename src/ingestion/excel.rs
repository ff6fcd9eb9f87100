#![cfg(feature = "excel")]

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{IngestionError, IngestionResult};
use crate::normalize::temporal::timestamps_to_text;
use crate::types::{DataSet, FileType, Value};

use super::csv::dedupe_headers;

/// Parse an Excel workbook (`.xlsx`, `.xls`) into a [`DataSet`].
///
/// Behavior:
/// - Uses the first sheet in the workbook
/// - Detects the first non-empty row as the header row
/// - Converts the remaining rows into [`Value`]s; integral floats become integers, error
///   cells and blanks become null
/// - Date cells are rewritten to canonical date text before returning
pub fn detect_excel(bytes: &[u8]) -> IngestionResult<DataSet> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(excel_error)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestionError::format(FileType::Excel, "workbook has no sheets"))?
        .map_err(excel_error)?;

    let mut ds = ingest_sheet_range(&range)?;
    timestamps_to_text(&mut ds);
    Ok(ds)
}

fn excel_error(e: calamine::Error) -> IngestionError {
    IngestionError::format(FileType::Excel, e.to_string())
}

fn ingest_sheet_range(range: &calamine::Range<Data>) -> IngestionResult<DataSet> {
    let mut rows_iter = range
        .rows()
        .skip_while(|row| row.iter().all(|c| matches!(c, Data::Empty)));

    let header = rows_iter.next().ok_or_else(|| {
        IngestionError::format(FileType::Excel, "sheet has no non-empty rows (no header row found)")
    })?;
    let header_cells: Vec<String> = header.iter().map(cell_to_header_string).collect();
    let columns = dedupe_headers(header_cells.iter().map(String::as_str));
    let width = columns.len();

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for row in rows_iter {
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        let out_row: Vec<Value> = (0..width)
            .map(|idx| row.get(idx).map_or(Value::Null, convert_cell))
            .collect();
        rows.push(out_row);
    }

    Ok(DataSet::from_rows(columns, rows))
}

fn cell_to_header_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if is_integral(*f) => (*f as i64).to_string(),
        Data::Empty => String::new(),
        Data::DateTime(_) | Data::DateTimeIso(_) => match convert_cell(c) {
            Value::Timestamp(ts) => crate::normalize::format_timestamp(&ts),
            other => other.to_string(),
        },
        other => other.to_string(),
    }
}

fn convert_cell(c: &Data) -> Value {
    match c {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Bool(b) => Value::Bool(*b),
        Data::Int(i) => Value::Int64(*i),
        Data::Float(f) if is_integral(*f) => Value::Int64(*f as i64),
        Data::Float(f) => Value::Float64(*f),
        Data::String(s) => Value::Utf8(s.clone()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => Value::Timestamp(ts),
            None => Value::Utf8(dt.to_string()),
        },
        Data::DateTimeIso(s) => parse_iso_datetime(s).map_or_else(|| Value::Utf8(s.clone()), Value::Timestamp),
        Data::DurationIso(s) => Value::Utf8(s.clone()),
    }
}

fn is_integral(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
