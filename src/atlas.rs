//! Anatomical label atlases
//!
//! An atlas is an integer label volume in MNI space plus the names of its
//! labels. Two label list layouts are accepted:
//! - one name per line, the line position being the index (index 0 is usually
//!   `Background`)
//! - `index<TAB>name` lines for atlases with sparse indices
//!
//! Blank lines and lines starting with `#` are ignored.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ReportError;
use crate::image::StatImage;

/// Label volume with its index-to-name table
#[derive(Debug, Clone)]
pub struct LabelAtlas {
    name: String,
    image: StatImage,
    labels: BTreeMap<i64, String>,
}

impl LabelAtlas {
    pub fn new(name: impl Into<String>, image: StatImage, labels: BTreeMap<i64, String>) -> Self {
        Self {
            name: name.into(),
            image,
            labels,
        }
    }

    /// Load an atlas from a label image and a label list file
    pub fn load(spec: &AtlasSpec) -> Result<Self, ReportError> {
        let image = StatImage::load(&spec.image)?;
        let content = fs::read_to_string(&spec.labels).map_err(|e| {
            ReportError::Atlas(format!(
                "cannot read labels for atlas '{}' ({}): {}",
                spec.name,
                spec.labels.display(),
                e
            ))
        })?;
        let labels = parse_labels(&content)
            .map_err(|e| ReportError::Atlas(format!("atlas '{}': {}", spec.name, e)))?;

        tracing::debug!(atlas = %spec.name, labels = labels.len(), "loaded atlas");
        Ok(Self::new(spec.name.clone(), image, labels))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label at an MNI coordinate.
    ///
    /// `None` when the coordinate falls outside the volume or on an index the
    /// label list does not name.
    pub fn label_at(&self, mm: [f64; 3]) -> Option<&str> {
        let voxel = self.image.mm_to_voxel(mm)?;
        let value = self.image.value(voxel)?;
        if !value.is_finite() {
            return None;
        }
        self.labels.get(&(value.round() as i64)).map(String::as_str)
    }
}

/// Parse a label list into an index-to-name table
pub fn parse_labels(content: &str) -> Result<BTreeMap<i64, String>, String> {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .collect();

    let indexed = lines.iter().any(|l| l.contains('\t'));
    let mut labels = BTreeMap::new();

    for (position, line) in lines.iter().enumerate() {
        if indexed {
            let (index, name) = line
                .split_once('\t')
                .ok_or_else(|| format!("expected 'index<TAB>name', got '{}'", line))?;
            let index: i64 = index
                .trim()
                .parse()
                .map_err(|_| format!("invalid label index '{}'", index.trim()))?;
            labels.insert(index, name.trim().to_string());
        } else {
            labels.insert(position as i64, line.trim().to_string());
        }
    }

    if labels.is_empty() {
        return Err("label list is empty".to_string());
    }
    Ok(labels)
}

/// Atlas named on the command line as `NAME=IMAGE,LABELS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasSpec {
    pub name: String,
    pub image: PathBuf,
    pub labels: PathBuf,
}

impl AtlasSpec {
    pub fn new(name: impl Into<String>, image: &Path, labels: &Path) -> Self {
        Self {
            name: name.into(),
            image: image.to_path_buf(),
            labels: labels.to_path_buf(),
        }
    }
}

impl FromStr for AtlasSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, paths) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=IMAGE,LABELS, got '{}'", s))?;
        let (image, labels) = paths
            .split_once(',')
            .ok_or_else(|| format!("expected IMAGE,LABELS after '{}=', got '{}'", name, paths))?;
        let name = name.trim();
        if name.is_empty() || image.trim().is_empty() || labels.trim().is_empty() {
            return Err(format!("empty component in atlas spec '{}'", s));
        }
        Ok(Self {
            name: name.to_string(),
            image: PathBuf::from(image.trim()),
            labels: PathBuf::from(labels.trim()),
        })
    }
}
