//! Results tables
//!
//! A [`ResultsTable`] is the annotated cluster list of one contrast at one
//! threshold. It is immutable once built and is persisted as CSV with a fixed
//! column order that downstream predictor tables rely on:
//!
//! `cluster_id, peak_x, peak_y, peak_z, volume_mm, log10p, pval, BFB, odds,
//! null_probability, <one column per atlas>, region`
//!
//! Older tables may lack the trailing `region` column. Every column after the
//! fixed ones is then an atlas column and regions are resolved on read.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::Serialize;

use crate::annotator::{disambiguate, resolve_region};
use crate::bayes::bayes_factor_upper_bound;
use crate::error::ReportError;
use crate::types::{AnnotatedCluster, AtlasLabel, BayesianSummary, Cluster};

/// Leading columns, in order
pub const FIXED_COLUMNS: [&str; 10] = [
    "cluster_id",
    "peak_x",
    "peak_y",
    "peak_z",
    "volume_mm",
    "log10p",
    "pval",
    "BFB",
    "odds",
    "null_probability",
];

/// Trailing column holding the resolved, disambiguated region
pub const REGION_COLUMN: &str = "region";

/// Annotated clusters of one contrast, keyed by cluster id
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsTable {
    atlas_names: Vec<String>,
    rows: Vec<AnnotatedCluster>,
}

/// Peak location and name of one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakCoordinate {
    pub cluster_id: u32,
    pub mni: [f64; 3],
    pub name: String,
}

impl ResultsTable {
    /// Build a table, checking ids are unique and labels follow the atlas order
    pub fn new(atlas_names: Vec<String>, rows: Vec<AnnotatedCluster>) -> Result<Self, ReportError> {
        let mut ids = HashSet::new();
        for row in &rows {
            if !ids.insert(row.cluster.cluster_id) {
                return Err(ReportError::InvalidTable(format!(
                    "duplicate cluster_id {}",
                    row.cluster.cluster_id
                )));
            }
            let aligned = row.cluster.region_labels.len() == atlas_names.len()
                && row
                    .cluster
                    .region_labels
                    .iter()
                    .zip(&atlas_names)
                    .all(|(label, atlas)| &label.atlas == atlas);
            if !aligned {
                return Err(ReportError::InvalidTable(format!(
                    "labels of cluster {} do not match atlases {:?}",
                    row.cluster.cluster_id, atlas_names
                )));
            }
        }
        Ok(Self { atlas_names, rows })
    }

    pub fn atlas_names(&self) -> &[String] {
        &self.atlas_names
    }

    pub fn rows(&self) -> &[AnnotatedCluster] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, cluster_id: u32) -> Option<&AnnotatedCluster> {
        self.rows.iter().find(|r| r.cluster.cluster_id == cluster_id)
    }

    /// Column names in output order
    pub fn columns(&self) -> Vec<String> {
        FIXED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.atlas_names.iter().cloned())
            .chain(std::iter::once(REGION_COLUMN.to_string()))
            .collect()
    }

    /// Peak coordinates with their region names, in table order
    pub fn coordinates(&self) -> Vec<PeakCoordinate> {
        self.rows
            .iter()
            .map(|r| PeakCoordinate {
                cluster_id: r.cluster.cluster_id,
                mni: r.cluster.peak(),
                name: r.region.clone(),
            })
            .collect()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), ReportError> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.columns())?;

        for row in &self.rows {
            let c = &row.cluster;
            let mut record = vec![
                c.cluster_id.to_string(),
                c.peak_x.to_string(),
                c.peak_y.to_string(),
                c.peak_z.to_string(),
                c.volume_mm.to_string(),
                c.peak_stat.to_string(),
                c.pval.to_string(),
                row.bayes.bfb.to_string(),
                row.bayes.odds.to_string(),
                row.bayes.null_probability.to_string(),
            ];
            record.extend(c.region_labels.iter().map(|l| l.label.clone()));
            record.push(row.region.clone());
            csv.write_record(&record)?;
        }

        csv.flush()?;
        Ok(())
    }

    /// Write to `path`, replacing any existing file
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let file = File::create(path)?;
        self.write_csv(file)
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Self, ReportError> {
        let mut csv = csv::Reader::from_reader(reader);
        let headers = csv.headers()?.clone();

        let n = headers.len();
        if n < FIXED_COLUMNS.len() {
            return Err(ReportError::InvalidTable(format!(
                "expected at least {} columns, found {}",
                FIXED_COLUMNS.len(),
                n
            )));
        }
        for (idx, expected) in FIXED_COLUMNS.iter().enumerate() {
            if &headers[idx] != *expected {
                return Err(ReportError::InvalidTable(format!(
                    "column {} is '{}', expected '{}'",
                    idx, &headers[idx], expected
                )));
            }
        }
        let has_region = n > FIXED_COLUMNS.len() && &headers[n - 1] == REGION_COLUMN;
        let atlas_end = if has_region { n - 1 } else { n };
        let atlas_names: Vec<String> = (FIXED_COLUMNS.len()..atlas_end)
            .map(|idx| headers[idx].to_string())
            .collect();

        let mut rows = Vec::new();
        for (line, record) in csv.records().enumerate() {
            let record = record?;
            let field = |idx: usize| -> Result<f64, ReportError> {
                record[idx].trim().parse::<f64>().map_err(|_| {
                    ReportError::InvalidTable(format!(
                        "row {}: column '{}' is not a number: '{}'",
                        line + 1,
                        FIXED_COLUMNS[idx],
                        &record[idx]
                    ))
                })
            };

            let cluster_id = record[0].trim().parse::<u32>().map_err(|_| {
                ReportError::InvalidTable(format!(
                    "row {}: invalid cluster_id '{}'",
                    line + 1,
                    &record[0]
                ))
            })?;
            let pval = field(6)?;
            let null_probability = field(9)?;
            let alternative_probability = bayes_factor_upper_bound(pval.max(f64::MIN_POSITIVE))
                .map(|b| b.alternative_probability)
                .map_err(|_| {
                    ReportError::InvalidTable(format!("row {}: invalid pval {}", line + 1, pval))
                })?;

            let region_labels: Vec<AtlasLabel> = atlas_names
                .iter()
                .enumerate()
                .map(|(offset, atlas)| AtlasLabel {
                    atlas: atlas.clone(),
                    label: record[FIXED_COLUMNS.len() + offset].to_string(),
                })
                .collect();
            let region = if has_region {
                record[n - 1].to_string()
            } else {
                resolve_region(&region_labels)
            };

            rows.push(AnnotatedCluster {
                cluster: Cluster {
                    cluster_id,
                    peak_x: field(1)?,
                    peak_y: field(2)?,
                    peak_z: field(3)?,
                    volume_mm: field(4)?,
                    peak_stat: field(5)?,
                    pval,
                    region_labels,
                },
                bayes: BayesianSummary {
                    bfb: field(7)?,
                    odds: field(8)?,
                    null_probability,
                    alternative_probability,
                },
                region,
            });
        }

        if !has_region {
            let regions: Vec<String> = rows.iter().map(|r| r.region.clone()).collect();
            for (row, region) in rows.iter_mut().zip(disambiguate(&regions)) {
                row.region = region;
            }
        }

        Self::new(atlas_names, rows)
    }

    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let file = File::open(path)?;
        Self::read_csv(file)
    }
}
