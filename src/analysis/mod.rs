//! Ad-hoc analysis of a stored preview.
//!
//! Analyses run over the preview rows kept by the primary store, not over the full
//! original file:
//!
//! - [`summary()`]: per-column descriptive statistics plus null and distinct counts
//! - [`correlation()`]: pairwise Pearson correlation between numeric columns
//!
//! ## Example
//!
//! ```rust
//! use file_analytics::analysis::{analyze, Analysis, AnalysisKind};
//! use file_analytics::normalize::normalize;
//! use file_analytics::types::{DataSet, Value};
//!
//! let ds = DataSet::from_rows(
//!     vec!["x".to_string(), "y".to_string()],
//!     vec![
//!         vec![Value::Int64(1), Value::Int64(2)],
//!         vec![Value::Int64(2), Value::Int64(4)],
//!         vec![Value::Int64(3), Value::Int64(6)],
//!     ],
//! );
//! let record = normalize(&ds).unwrap();
//!
//! let Analysis::Correlation(report) = analyze(&record, AnalysisKind::Correlation) else {
//!     unreachable!()
//! };
//! assert_eq!(report.correlation["x"]["y"], Some(1.0));
//! ```

pub mod correlation;
pub mod summary;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{CanonicalRecord, Row, Value};

pub use correlation::{correlation, CorrelationReport};
pub use summary::{summary, Describe, SummaryReport};

/// Which analysis to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    /// Descriptive statistics, null counts and distinct counts.
    #[default]
    Summary,
    /// Pearson correlation matrix.
    Correlation,
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Summary => "summary",
            Self::Correlation => "correlation",
        })
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(Self::Summary),
            "correlation" => Ok(Self::Correlation),
            other => Err(format!("unknown analysis '{other}' (expected summary or correlation)")),
        }
    }
}

/// Result of [`analyze`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Analysis {
    /// See [`summary()`].
    Summary(SummaryReport),
    /// See [`correlation()`].
    Correlation(CorrelationReport),
}

/// Run `kind` over the preview of `record`.
pub fn analyze(record: &CanonicalRecord, kind: AnalysisKind) -> Analysis {
    match kind {
        AnalysisKind::Summary => Analysis::Summary(summary(&record.columns, &record.preview)),
        AnalysisKind::Correlation => Analysis::Correlation(correlation(&record.columns, &record.preview)),
    }
}

/// Numeric view of one column: `None` for nulls, or `None` overall if any non-null value
/// is not a number. Columns without any values are not numeric.
fn numeric_column(rows: &[Row], column: &str) -> Option<Vec<Option<f64>>> {
    let mut out = Vec::with_capacity(rows.len());
    let mut seen = false;
    for row in rows {
        match row.get(column) {
            None | Some(Value::Null) => out.push(None),
            Some(v) => {
                let x = v.as_f64().filter(|x| x.is_finite())?;
                seen = true;
                out.push(Some(x));
            }
        }
    }
    seen.then_some(out)
}
