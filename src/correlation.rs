//! Behaviour correlation
//!
//! Spearman rank correlation between a brain volume measure and each
//! behavioural measure of a table, with the Bayes factor bound of every
//! correlation's p-value.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::bayes::bayes_factor_upper_bound;
use crate::error::ReportError;
use crate::types::BayesianSummary;

/// Smallest number of complete pairs a correlation is computed on
pub const MIN_PAIRS: usize = 3;

const MISSING: [&str; 4] = ["", "na", "nan", "null"];

/// Numeric columns of a behaviour/volume table; missing cells are `None`
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureTable {
    columns: Vec<(String, Vec<Option<f64>>)>,
}

/// Correlation of one behaviour with the volume measure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResult {
    pub behaviour: String,
    /// Complete pairs used
    pub n: usize,
    pub rho: f64,
    pub pval: f64,
    pub bayes: BayesianSummary,
}

impl MeasureTable {
    /// Read a CSV with a header row. Columns holding any text that is not a
    /// number or a missing marker are skipped.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self, ReportError> {
        let mut csv = csv::Reader::from_reader(reader);
        let headers = csv.headers()?.clone();

        let mut cells: Vec<Vec<Option<f64>>> = vec![Vec::new(); headers.len()];
        let mut numeric = vec![true; headers.len()];
        for record in csv.records() {
            let record = record?;
            for (idx, column) in cells.iter_mut().enumerate() {
                match parse_cell(record.get(idx).unwrap_or("")) {
                    Some(value) => column.push(value),
                    None => numeric[idx] = false,
                }
            }
        }

        let columns = headers
            .iter()
            .zip(cells)
            .zip(numeric)
            .filter_map(|((name, values), is_numeric)| {
                if !is_numeric {
                    tracing::debug!(column = name, "skipping non-numeric column");
                }
                is_numeric.then(|| (name.to_string(), values))
            })
            .collect();
        Ok(Self { columns })
    }

    pub fn load(path: &Path) -> Result<Self, ReportError> {
        Self::read_csv(File::open(path)?)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Correlate `volume` with every other numeric column
    pub fn correlate(&self, volume: &str) -> Result<Vec<CorrelationResult>, ReportError> {
        let volume_values = self.column(volume).ok_or_else(|| {
            ReportError::InvalidTable(format!("no numeric column named '{}'", volume))
        })?;

        self.columns
            .iter()
            .filter(|(name, _)| name != volume)
            .map(|(name, values)| correlate_pair(name, volume_values, values))
            .collect()
    }
}

/// `Some(None)` for a missing cell, `None` for text
fn parse_cell(cell: &str) -> Option<Option<f64>> {
    let cell = cell.trim();
    if MISSING.contains(&cell.to_ascii_lowercase().as_str()) {
        return Some(None);
    }
    let value: f64 = cell.parse().ok()?;
    Some(value.is_finite().then_some(value))
}

fn correlate_pair(
    behaviour: &str,
    volume: &[Option<f64>],
    values: &[Option<f64>],
) -> Result<CorrelationResult, ReportError> {
    let (x, y): (Vec<f64>, Vec<f64>) = volume
        .iter()
        .zip(values)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .unzip();

    let (rho, pval) = spearman(&x, &y)
        .map_err(|e| ReportError::InsufficientData(format!("'{}': {}", behaviour, e)))?;
    // A perfect rank correlation has p == 0
    let bayes = bayes_factor_upper_bound(pval.max(f64::MIN_POSITIVE))?;

    Ok(CorrelationResult {
        behaviour: behaviour.to_string(),
        n: x.len(),
        rho,
        pval,
        bayes,
    })
}

/// Spearman's rho with its two-sided p-value (t approximation, n - 2 df)
pub fn spearman(x: &[f64], y: &[f64]) -> Result<(f64, f64), String> {
    if x.len() != y.len() {
        return Err(format!("length mismatch: {} vs {}", x.len(), y.len()));
    }
    let n = x.len();
    if n < MIN_PAIRS {
        return Err(format!("{} complete pairs, need at least {}", n, MIN_PAIRS));
    }

    let rho = pearson(&average_ranks(x), &average_ranks(y))
        .ok_or_else(|| "a measure is constant".to_string())?;

    let df = (n - 2) as f64;
    let t = rho * (df / ((1.0 - rho) * (1.0 + rho))).sqrt();
    let pval = if t.is_finite() {
        let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| e.to_string())?;
        (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Ok((rho, pval))
}

/// 1-based ranks, ties sharing their average rank
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some((cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_average_ranks_with_ties() {
        assert_eq!(average_ranks(&[10.0, 2.0, 2.0, 3.0]), vec![4.0, 1.5, 1.5, 3.0]);
    }

    #[test]
    fn test_spearman_known_value() {
        let (rho, pval) = spearman(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 1.0, 4.0, 3.0, 5.0]).unwrap();
        assert!((rho - 0.8).abs() < 1e-12);
        assert!((pval - 0.1041).abs() < 1e-3);
    }

    #[test]
    fn test_spearman_monotonic_is_perfect() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [1.0, 8.0, 27.0, 64.0];
        let (rho, pval) = spearman(&x, &y).unwrap();
        assert_eq!(rho, 1.0);
        assert_eq!(pval, 0.0);
    }

    #[test]
    fn test_spearman_rejects_small_or_constant_input() {
        assert!(spearman(&[1.0, 2.0], &[2.0, 1.0]).is_err());
        assert!(spearman(&[1.0, 2.0, 3.0], &[4.0, 4.0, 4.0]).is_err());
    }

    #[test]
    fn test_correlate_drops_missing_pairs_and_text_columns() {
        let csv = "\
subject,amygdala_volume,anxiety,depression
s1,1.0,2,5
s2,2.0,1,NA
s3,3.0,4,3
s4,4.0,3,2
s5,5.0,5,1
";
        let table = MeasureTable::read_csv(csv.as_bytes()).unwrap();
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec!["amygdala_volume", "anxiety", "depression"]
        );

        let results = table.correlate("amygdala_volume").unwrap();
        assert_eq!(results.len(), 2);

        let anxiety = &results[0];
        assert_eq!(anxiety.behaviour, "anxiety");
        assert_eq!(anxiety.n, 5);
        assert!((anxiety.rho - 0.8).abs() < 1e-12);
        assert!(anxiety.pval < 0.36 && anxiety.bayes.bfb > 0.0);

        let depression = &results[1];
        assert_eq!(depression.n, 4);
        assert_eq!(depression.rho, -1.0);
        assert!(depression.bayes.bfb > 0.0);
    }

    #[test]
    fn test_correlate_unknown_volume_column() {
        let table = MeasureTable::read_csv("a,b\n1,2\n".as_bytes()).unwrap();
        assert!(matches!(
            table.correlate("volume"),
            Err(ReportError::InvalidTable(_))
        ));
    }

    #[test]
    fn test_correlate_insufficient_pairs() {
        let table = MeasureTable::read_csv("v,b\n1,2\n2,\n3,1\n".as_bytes()).unwrap();
        assert!(matches!(
            table.correlate("v"),
            Err(ReportError::InsufficientData(_))
        ));
    }
}
