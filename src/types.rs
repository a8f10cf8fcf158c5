//! Core types for the cluster reporting pipeline
//!
//! This module defines the data structures that flow through each stage:
//! contrasts, extracted clusters, Bayesian summaries and annotated rows.

use serde::{Deserialize, Serialize};

/// Label used when no atlas supplies a region for a peak
pub const NO_LABEL: &str = "no label";

/// Background label emitted by max-probability atlases outside any region
pub const BACKGROUND_LABEL: &str = "Background";

/// Statistical comparison of the mixed model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Contrast {
    Group,
    Time,
    Interaction,
}

impl Contrast {
    /// Every contrast, in batch processing order
    pub const ALL: [Contrast; 3] = [Contrast::Group, Contrast::Time, Contrast::Interaction];

    /// Name used in image file names and output namespaces
    pub fn as_str(&self) -> &'static str {
        match self {
            Contrast::Group => "group",
            Contrast::Time => "time",
            Contrast::Interaction => "interaction",
        }
    }

    /// Display title recorded on every artifact of the contrast
    pub fn title(&self) -> &'static str {
        match self {
            Contrast::Group => "Group Differences",
            Contrast::Time => "Difference at Time Points",
            Contrast::Interaction => "Group x Time Interaction",
        }
    }
}

impl std::fmt::Display for Contrast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per contrast.
///
/// Consumers reach values through an exhaustive match on [`Contrast`], so adding
/// a contrast is a compile error everywhere a value has to be supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerContrast<T> {
    pub group: T,
    pub time: T,
    pub interaction: T,
}

impl<T> PerContrast<T> {
    /// Build by evaluating `f` once per contrast, in [`Contrast::ALL`] order
    pub fn from_fn(mut f: impl FnMut(Contrast) -> T) -> Self {
        let group = f(Contrast::Group);
        let time = f(Contrast::Time);
        let interaction = f(Contrast::Interaction);
        Self {
            group,
            time,
            interaction,
        }
    }

    pub fn get(&self, contrast: Contrast) -> &T {
        match contrast {
            Contrast::Group => &self.group,
            Contrast::Time => &self.time,
            Contrast::Interaction => &self.interaction,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Contrast, &T)> {
        Contrast::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    pub fn map<U>(self, mut f: impl FnMut(Contrast, T) -> U) -> PerContrast<U> {
        PerContrast {
            group: f(Contrast::Group, self.group),
            time: f(Contrast::Time, self.time),
            interaction: f(Contrast::Interaction, self.interaction),
        }
    }
}

/// Inference domain of the permutation maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapDomain {
    /// Threshold-free cluster enhancement
    Tfce,
    /// Voxel-wise
    Vox,
}

impl MapDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapDomain::Tfce => "tfce",
            MapDomain::Vox => "vox",
        }
    }
}

/// Region label assigned to a peak by one atlas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasLabel {
    pub atlas: String,
    pub label: String,
}

/// A suprathreshold connected cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// 1-based id, unique per extraction, in descending peak order
    pub cluster_id: u32,
    /// Peak x coordinate (mm, MNI)
    pub peak_x: f64,
    /// Peak y coordinate (mm, MNI)
    pub peak_y: f64,
    /// Peak z coordinate (mm, MNI)
    pub peak_z: f64,
    /// Cluster volume (mm^3)
    pub volume_mm: f64,
    /// Peak statistic, in -log10(p) units
    pub peak_stat: f64,
    /// p-value at the peak, `10^-peak_stat`
    pub pval: f64,
    /// Labels per atlas, in atlas order; empty until annotated
    pub region_labels: Vec<AtlasLabel>,
}

impl Cluster {
    pub fn peak(&self) -> [f64; 3] {
        [self.peak_x, self.peak_y, self.peak_z]
    }
}

/// Evidence bound derived from a single p-value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BayesianSummary {
    /// Bayes factor bound; negative once the favoured hypothesis flips
    pub bfb: f64,
    /// Decimal odds favouring the null
    pub odds: f64,
    /// Probability of the null hypothesis (percent, 4 dp)
    pub null_probability: f64,
    /// Probability of the alternative hypothesis (percent, 4 dp)
    pub alternative_probability: f64,
}

/// Cluster row with its evidence bound and resolved region name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedCluster {
    pub cluster: Cluster,
    pub bayes: BayesianSummary,
    /// Resolved, disambiguated region name
    pub region: String,
}
