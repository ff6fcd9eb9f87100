use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::types::Row;

use super::numeric_column;

/// Descriptive statistics of one numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Describe {
    /// Number of non-null values.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation; `None` with a single value.
    pub std: Option<f64>,
    /// Minimum.
    pub min: f64,
    /// First quartile.
    #[serde(rename = "25%")]
    pub q25: f64,
    /// Median.
    #[serde(rename = "50%")]
    pub q50: f64,
    /// Third quartile.
    #[serde(rename = "75%")]
    pub q75: f64,
    /// Maximum.
    pub max: f64,
}

/// Output of [`summary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    /// Statistics per numeric column.
    pub summary: IndexMap<String, Describe>,
    /// Null values per column.
    pub null_counts: IndexMap<String, usize>,
    /// Distinct non-null values per column.
    pub unique_counts: IndexMap<String, usize>,
}

/// Describe every numeric column and count nulls and distinct values in all columns.
///
/// Quantiles use linear interpolation between the closest ranks.
pub fn summary(columns: &[String], rows: &[Row]) -> SummaryReport {
    let mut report = SummaryReport {
        summary: IndexMap::new(),
        null_counts: IndexMap::new(),
        unique_counts: IndexMap::new(),
    };

    for column in columns {
        let stats = numeric_column(rows, column).and_then(|values| describe(values.into_iter().flatten().collect()));
        if let Some(stats) = stats {
            report.summary.insert(column.clone(), stats);
        }

        let mut nulls = 0;
        let mut distinct: HashSet<String> = HashSet::new();
        for row in rows {
            match row.get(column) {
                None => nulls += 1,
                Some(v) if v.is_null() => nulls += 1,
                // Keyed by JSON text; `Value` holds floats and is not `Hash`.
                Some(v) => {
                    distinct.insert(serde_json::to_string(v).unwrap_or_default());
                }
            }
        }
        report.null_counts.insert(column.clone(), nulls);
        report.unique_counts.insert(column.clone(), distinct.len());
    }
    report
}

fn describe(mut values: Vec<f64>) -> Option<Describe> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let std = (n > 1).then(|| {
        let ss: f64 = values.iter().map(|x| (x - mean).powi(2)).sum();
        (ss / (n as f64 - 1.0)).sqrt()
    });

    Some(Describe {
        count: n,
        mean,
        std,
        min: values[0],
        q25: quantile(&values, 0.25),
        q50: quantile(&values, 0.5),
        q75: quantile(&values, 0.75),
        max: values[n - 1],
    })
}

/// Linear-interpolation quantile of already sorted, non-empty `sorted`.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn rows(values: &[(Value, Value)]) -> Vec<Row> {
        values
            .iter()
            .map(|(a, b)| {
                let mut row = Row::new();
                row.insert("n".to_string(), a.clone());
                row.insert("label".to_string(), b.clone());
                row
            })
            .collect()
    }

    #[test]
    fn quantiles_interpolate_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.25), 1.75);
        assert_eq!(quantile(&sorted, 0.5), 2.5);
        assert_eq!(quantile(&sorted, 0.75), 3.25);
    }

    #[test]
    fn summary_describes_numeric_columns_and_counts_everything() {
        let data = rows(&[
            (Value::Int64(4), Value::Utf8("a".into())),
            (Value::Null, Value::Utf8("a".into())),
            (Value::Float64(2.0), Value::Utf8("b".into())),
        ]);
        let columns = vec!["n".to_string(), "label".to_string()];
        let report = summary(&columns, &data);

        let n = report.summary["n"];
        assert_eq!(n.count, 2);
        assert_eq!(n.mean, 3.0);
        assert_eq!(n.min, 2.0);
        assert_eq!(n.q50, 3.0);
        assert!(!report.summary.contains_key("label"));

        assert_eq!(report.null_counts["n"], 1);
        assert_eq!(report.null_counts["label"], 0);
        assert_eq!(report.unique_counts["label"], 2);
    }

    #[test]
    fn single_value_has_no_std() {
        let d = describe(vec![5.0]).unwrap();
        assert_eq!(d.std, None);
        assert_eq!(d.q25, 5.0);
    }
}
