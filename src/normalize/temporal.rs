//! Temporal value canonicalization.
//!
//! Temporal values never leave the pipeline as a native type: they are rewritten to
//! `YYYY-MM-DD` when the time of day is exactly midnight, else `YYYY-MM-DD HH:MM:SS`.
//! Non-finite floats are rewritten to [`Value::Null`] so records compare and serialize
//! with plain null semantics.

use chrono::{NaiveDateTime, Timelike};

use crate::types::{DataSet, DataType, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp using the canonical date or date-time layout.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    if ts.hour() == 0 && ts.minute() == 0 && ts.second() == 0 {
        ts.format(DATE_FORMAT).to_string()
    } else {
        ts.format(DATETIME_FORMAT).to_string()
    }
}

/// Canonicalize a single value, recursing into lists and objects.
pub fn canonicalize_value(value: Value) -> Value {
    match value {
        Value::Timestamp(ts) => Value::Utf8(format_timestamp(&ts)),
        Value::Float64(f) if !f.is_finite() => Value::Null,
        Value::List(items) => Value::List(items.into_iter().map(canonicalize_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, canonicalize_value(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Canonicalize every value of a dataset in place and refresh the inferred schema.
pub fn canonicalize_dataset(ds: &mut DataSet) {
    for row in &mut ds.rows {
        for cell in row.iter_mut() {
            *cell = canonicalize_value(std::mem::replace(cell, Value::Null));
        }
    }
    ds.refresh_schema();
}

/// Force temporal values (and columns typed as temporal) back to text.
///
/// Tabular detectors call this before handing a dataset on, so locale-dependent date
/// interpretation never reaches the normalizer.
pub fn timestamps_to_text(ds: &mut DataSet) {
    let has_temporal = ds
        .schema
        .fields
        .iter()
        .any(|f| matches!(f.data_type, DataType::Timestamp | DataType::Mixed));
    if !has_temporal {
        return;
    }

    for cell in ds.rows.iter_mut().flat_map(|row| row.iter_mut()) {
        if let Value::Timestamp(ts) = cell {
            *cell = Value::Utf8(format_timestamp(ts));
        }
    }
    ds.refresh_schema();
}
