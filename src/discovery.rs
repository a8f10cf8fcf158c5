//! Image discovery
//!
//! Permutation test outputs are found by file name. Within one directory:
//! - p-value maps contain `<domain>_fwep_`
//! - t-statistic maps contain `<domain>_tstat_`
//! - the analysis mask contains `mask_img`
//!
//! and each contrast picks its maps by the contrast name appearing in the
//! file name.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ReportError;
use crate::types::{Contrast, MapDomain};

const IMAGE_SUFFIXES: [&str; 3] = [".nii", ".nii.gz", ".json"];

/// Maps of one inference domain found in a directory
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSet {
    domain: MapDomain,
    pvals: Vec<PathBuf>,
    tstat: Vec<PathBuf>,
    mask: Option<PathBuf>,
}

/// Maps belonging to one contrast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContrastImages {
    pub contrast: Contrast,
    pub tstat: PathBuf,
    pub pvals: PathBuf,
}

impl ImageSet {
    /// Scan `dir` (non-recursively) for maps of `domain`
    pub fn discover(dir: &Path, domain: MapDomain) -> Result<Self, ReportError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        let set = Self::from_paths(paths, domain);
        tracing::info!(
            dir = %dir.display(),
            domain = domain.as_str(),
            pvals = set.pvals.len(),
            tstat = set.tstat.len(),
            mask = set.mask.is_some(),
            "discovered images"
        );
        Ok(set)
    }

    /// Classify candidate paths; non-image files are ignored
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>, domain: MapDomain) -> Self {
        let pval_marker = format!("{}_fwep_", domain.as_str());
        let tstat_marker = format!("{}_tstat_", domain.as_str());

        let mut paths: Vec<PathBuf> = paths.into_iter().filter(|p| is_image(p)).collect();
        paths.sort();

        let mut set = Self {
            domain,
            pvals: Vec::new(),
            tstat: Vec::new(),
            mask: None,
        };
        for path in paths {
            let name = file_name(&path);
            if name.contains(&pval_marker) {
                set.pvals.push(path);
            } else if name.contains(&tstat_marker) {
                set.tstat.push(path);
            } else if name.contains("mask_img") && set.mask.is_none() {
                set.mask = Some(path);
            }
        }
        set
    }

    pub fn domain(&self) -> MapDomain {
        self.domain
    }

    pub fn pvals(&self) -> &[PathBuf] {
        &self.pvals
    }

    pub fn tstat(&self) -> &[PathBuf] {
        &self.tstat
    }

    pub fn mask(&self) -> Option<&Path> {
        self.mask.as_deref()
    }

    /// The single t-statistic and p-value map of `contrast`
    pub fn contrast_images(&self, contrast: Contrast) -> Result<ContrastImages, ReportError> {
        Ok(ContrastImages {
            contrast,
            tstat: select(&self.tstat, contrast, "tstat")?,
            pvals: select(&self.pvals, contrast, "fwep")?,
        })
    }
}

fn select(paths: &[PathBuf], contrast: Contrast, kind: &str) -> Result<PathBuf, ReportError> {
    let matches: Vec<&PathBuf> = paths
        .iter()
        .filter(|p| file_name(p).contains(contrast.as_str()))
        .collect();

    match matches.as_slice() {
        [only] => Ok((*only).clone()),
        [] => Err(ReportError::MissingImage {
            contrast: contrast.to_string(),
            kind: kind.to_string(),
        }),
        many => Err(ReportError::AmbiguousImage {
            contrast: contrast.to_string(),
            kind: kind.to_string(),
            count: many.len(),
        }),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_image(path: &Path) -> bool {
    let name = file_name(path);
    IMAGE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}
