//! Schema/stats normalization.
//!
//! [`normalize`] turns any detected [`DataSet`] into the storage-agnostic
//! [`CanonicalRecord`]:
//!
//! - `columns`: source column order, names verbatim
//! - `preview`: the first [`PREVIEW_ROWS`] rows, canonicalized (see [`temporal`])
//! - `row_count`: total rows of the source
//! - `stats`: `mean/min/max/std` for columns whose non-null values are all numeric
//!
//! ## Example
//!
//! ```rust
//! use file_analytics::normalize::normalize;
//! use file_analytics::types::{DataSet, Value};
//!
//! let ds = DataSet::from_rows(
//!     vec!["id".to_string(), "name".to_string()],
//!     vec![
//!         vec![Value::Int64(1), Value::Utf8("Ada".to_string())],
//!         vec![Value::Int64(3), Value::Utf8("Grace".to_string())],
//!     ],
//! );
//! let record = normalize(&ds).unwrap();
//! assert_eq!(record.row_count, 2);
//! assert_eq!(record.stats["id"].mean, 2.0);
//! assert!(!record.stats.contains_key("name"));
//! ```

pub mod temporal;

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{CanonicalRecord, ColumnStats, DataSet, PREVIEW_ROWS, Row, Value};

pub use temporal::{canonicalize_dataset, canonicalize_value, format_timestamp, timestamps_to_text};

/// Normalize a dataset into a [`CanonicalRecord`].
///
/// Fails with [`IngestionError::Normalization`] if the dataset has no columns.
pub fn normalize(ds: &DataSet) -> IngestionResult<CanonicalRecord> {
    if ds.column_count() == 0 {
        return Err(IngestionError::Normalization {
            message: "input has no columns".to_string(),
        });
    }

    let columns: Vec<String> = ds.schema.field_names().map(str::to_owned).collect();

    let preview: Vec<Row> = ds
        .rows
        .iter()
        .take(PREVIEW_ROWS)
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(idx, name)| {
                    let cell = row.get(idx).cloned().unwrap_or(Value::Null);
                    (name.clone(), canonicalize_value(cell))
                })
                .collect()
        })
        .collect();

    let computed: Vec<Option<ColumnStats>> = (0..ds.column_count())
        .into_par_iter()
        .map(|idx| column_stats(ds.column_values(idx)))
        .collect();
    let stats: IndexMap<String, ColumnStats> = columns
        .iter()
        .zip(computed)
        .filter_map(|(name, s)| s.map(|s| (name.clone(), s)))
        .collect();

    Ok(CanonicalRecord {
        columns,
        preview,
        row_count: ds.row_count(),
        stats,
    })
}

/// Statistics for one column, or `None` if the column is not uniformly numeric.
///
/// Nulls and non-finite floats are skipped. A column with no remaining values has no
/// statistics; with a single value `std` is `0.0`. Every field is finite so the stats
/// always survive a JSON round trip: a `std` too large for `f64` saturates to `f64::MAX`.
pub fn column_stats<'a>(values: impl Iterator<Item = &'a Value>) -> Option<ColumnStats> {
    let mut nums: Vec<f64> = Vec::new();
    for v in values {
        match v {
            Value::Null => {}
            Value::Int64(i) => nums.push(*i as f64),
            Value::Float64(f) if f.is_finite() => nums.push(*f),
            Value::Float64(_) => {}
            _ => return None,
        }
    }
    if nums.is_empty() {
        return None;
    }

    let min = nums.iter().copied().fold(f64::INFINITY, f64::min);
    let max = nums.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (mean, std) = match direct_moments(&nums) {
        Some(moments) => moments,
        None => scaled_moments(&nums, min.abs().max(max.abs())),
    };
    let std = if std.is_finite() { std } else { f64::MAX };

    Some(ColumnStats { mean, min, max, std })
}

/// Mean and sample std by the textbook formulas, `None` once an intermediate overflows.
fn direct_moments(nums: &[f64]) -> Option<(f64, f64)> {
    let n = nums.len() as f64;
    let mean = nums.iter().sum::<f64>() / n;
    if !mean.is_finite() {
        return None;
    }
    if nums.len() < 2 {
        return Some((mean, 0.0));
    }
    let ss: f64 = nums.iter().map(|x| (x - mean).powi(2)).sum();
    let std = (ss / (n - 1.0)).sqrt();
    std.is_finite().then_some((mean, std))
}

/// Welford's update over values divided by their largest magnitude, scaled back at the end.
fn scaled_moments(nums: &[f64], scale: f64) -> (f64, f64) {
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (i, x) in nums.iter().enumerate() {
        let y = x / scale;
        let delta = y - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (y - mean);
    }
    let std = if nums.len() < 2 {
        0.0
    } else {
        (m2 / (nums.len() - 1) as f64).sqrt() * scale
    };
    (mean * scale, std)
}
