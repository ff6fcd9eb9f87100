use indexmap::IndexMap;
use serde::Serialize;

use crate::types::Row;

use super::numeric_column;

/// Output of [`correlation`]: column -> column -> coefficient.
///
/// A coefficient is `None` when fewer than two rows have both values, or when either column
/// is constant over those rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationReport {
    /// Pearson coefficients between numeric columns.
    pub correlation: IndexMap<String, IndexMap<String, Option<f64>>>,
}

/// Pearson correlation between every pair of numeric columns.
///
/// Each pair only uses the rows where both values are present. With fewer than two
/// numeric columns the matrix is empty.
pub fn correlation(columns: &[String], rows: &[Row]) -> CorrelationReport {
    let numeric: Vec<(&String, Vec<Option<f64>>)> = columns
        .iter()
        .filter_map(|c| numeric_column(rows, c).map(|values| (c, values)))
        .collect();

    let mut correlation = IndexMap::new();
    if numeric.len() < 2 {
        return CorrelationReport { correlation };
    }

    for (name_a, a) in &numeric {
        let row: IndexMap<String, Option<f64>> = numeric
            .iter()
            .map(|(name_b, b)| ((*name_b).clone(), pearson(a, b)))
            .collect();
        correlation.insert((*name_a).clone(), row);
    }
    CorrelationReport { correlation }
}

fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}
