//! Per-contrast results reports
//!
//! [`ResultsReportBuilder`] drives one contrast through
//! extract, then render, then annotate, then persist. Two states end the run
//! early without writing anything:
//! - no cluster survives the thresholds ([`ReportOutcome::NoSignificantClusters`])
//! - the statistic threshold is zero, a diagnostic mode that only previews
//!   the raw cluster table ([`ReportOutcome::PreviewOnly`])
//!
//! Every reported contrast writes into its own directory `<out>/<contrast>/`,
//! so contrasts sharing an output root never touch each other's files. A batch
//! run isolates contrasts: a failure is logged and returned for that contrast
//! only.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::annotator::ClusterAnnotator;
use crate::atlas::LabelAtlas;
use crate::discovery::{ContrastImages, ImageSet};
use crate::error::ReportError;
use crate::extractor::{ClusterExtractor, Extraction, DEFAULT_STAT_THRESHOLD};
use crate::image::StatImage;
use crate::render::{Artifact, ArtifactKind, ArtifactRenderer, GlassBrainRenderer, NoRender};
use crate::types::{Cluster, Contrast, PerContrast};
use crate::{FNEURO_VERSION, PRODUCER_NAME};

/// Report settings shared by every contrast of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Statistic threshold in -log10(p) units; zero selects preview mode
    pub stat_threshold: f64,
    /// Minimum cluster extent in voxels
    pub cluster_threshold: usize,
    /// Draw glass-brain artifacts
    pub render: bool,
    /// Prefix regions with their hemisphere
    pub hemisphere_prefix: bool,
    /// Rows shown in preview mode
    pub preview_rows: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            stat_threshold: DEFAULT_STAT_THRESHOLD,
            cluster_threshold: 0,
            render: true,
            hemisphere_prefix: false,
            preview_rows: 5,
        }
    }
}

/// Producing software of a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Record of everything written for one contrast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportManifest {
    pub producer: Producer,
    pub computed_at_utc: String,
    pub contrast: Contrast,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_image: Option<PathBuf>,
    pub stat_threshold: f64,
    pub cluster_threshold: usize,
    pub cluster_count: usize,
    pub atlases: Vec<String>,
    pub artifacts: Vec<Artifact>,
}

/// Files written for a reported contrast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContrastReport {
    pub contrast: Contrast,
    pub dir: PathBuf,
    pub table_path: PathBuf,
    pub manifest_path: PathBuf,
    pub cluster_count: usize,
    pub artifacts: Vec<Artifact>,
}

/// How a contrast's report ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportOutcome {
    /// Nothing survived the thresholds; no files were written
    NoSignificantClusters,
    /// Zero threshold; the leading raw clusters, nothing written
    PreviewOnly {
        total_clusters: usize,
        rows: Vec<Cluster>,
    },
    /// Table, artifacts and manifest written
    Reported(ContrastReport),
}

/// Builds per-contrast results reports under one output root
pub struct ResultsReportBuilder<'a> {
    config: ReportConfig,
    output_dir: PathBuf,
    atlases: &'a [LabelAtlas],
    renderer: Box<dyn ArtifactRenderer + 'a>,
    instance_id: String,
}

impl<'a> ResultsReportBuilder<'a> {
    pub fn new(output_dir: impl Into<PathBuf>, config: ReportConfig) -> Self {
        let renderer: Box<dyn ArtifactRenderer + 'a> = if config.render {
            Box::new(GlassBrainRenderer::default())
        } else {
            Box::new(NoRender)
        };
        Self {
            config,
            output_dir: output_dir.into(),
            atlases: &[],
            renderer,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Label atlases, primary first
    pub fn with_atlases(mut self, atlases: &'a [LabelAtlas]) -> Self {
        self.atlases = atlases;
        self
    }

    pub fn with_renderer(mut self, renderer: impl ArtifactRenderer + 'a) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    /// Fix the manifest instance id instead of generating one
    pub fn with_instance_id(mut self, instance_id: String) -> Self {
        self.instance_id = instance_id;
        self
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Directory holding the outputs of `contrast`
    pub fn contrast_dir(&self, contrast: Contrast) -> PathBuf {
        self.output_dir.join(contrast.as_str())
    }

    /// Report one contrast from its p-value map
    pub fn report(&self, contrast: Contrast, image: &StatImage) -> Result<ReportOutcome, ReportError> {
        self.run(contrast, image, None)
    }

    /// Load the p-value map of a contrast and report it
    pub fn report_images(&self, images: &ContrastImages) -> Result<ReportOutcome, ReportError> {
        let image = StatImage::load(&images.pvals)?;
        self.run(images.contrast, &image, Some(&images.pvals))
    }

    /// Report every contrast found in `images`, isolating failures
    pub fn run_batch(&self, images: &ImageSet) -> PerContrast<Result<ReportOutcome, ReportError>> {
        PerContrast::from_fn(|contrast| {
            let result = images
                .contrast_images(contrast)
                .and_then(|found| self.report_images(&found));
            match &result {
                Ok(outcome) => tracing::info!(contrast = %contrast, status = outcome.status(), "contrast finished"),
                Err(e) => tracing::error!(contrast = %contrast, error = %e, "contrast failed"),
            }
            result
        })
    }

    fn run(
        &self,
        contrast: Contrast,
        image: &StatImage,
        source: Option<&Path>,
    ) -> Result<ReportOutcome, ReportError> {
        let extractor =
            ClusterExtractor::new(self.config.stat_threshold, self.config.cluster_threshold);

        let clusters = match extractor.extract(image) {
            Extraction::NoSignificantClusters => {
                tracing::info!(contrast = %contrast, "no significant clusters");
                return Ok(ReportOutcome::NoSignificantClusters);
            }
            Extraction::Clusters(clusters) => clusters,
        };

        if self.config.stat_threshold == 0.0 {
            tracing::info!(contrast = %contrast, clusters = clusters.len(), "zero threshold, preview only");
            let total_clusters = clusters.len();
            let rows = clusters.into_iter().take(self.config.preview_rows).collect();
            return Ok(ReportOutcome::PreviewOnly {
                total_clusters,
                rows,
            });
        }

        let dir = self.contrast_dir(contrast);
        fs::create_dir_all(&dir)?;

        let mut artifacts =
            self.renderer
                .render(image, self.config.stat_threshold, contrast, &dir)?;

        let table = ClusterAnnotator::new(self.atlases)
            .with_hemisphere_prefix(self.config.hemisphere_prefix)
            .annotate(clusters)?;
        let table_path = dir.join(format!("{}_clusters.csv", contrast));
        table.save(&table_path)?;
        artifacts.push(Artifact::new(
            ArtifactKind::ClusterTable,
            table_path.clone(),
            contrast,
        ));

        let manifest_path = dir.join(format!("{}_manifest.json", contrast));
        artifacts.push(Artifact::new(
            ArtifactKind::Manifest,
            manifest_path.clone(),
            contrast,
        ));
        let manifest = ReportManifest {
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: FNEURO_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            contrast,
            title: contrast.title().to_string(),
            source_image: source.map(Path::to_path_buf),
            stat_threshold: self.config.stat_threshold,
            cluster_threshold: self.config.cluster_threshold,
            cluster_count: table.len(),
            atlases: table.atlas_names().to_vec(),
            artifacts: artifacts.clone(),
        };
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;

        tracing::info!(
            contrast = %contrast,
            clusters = table.len(),
            dir = %dir.display(),
            "wrote results table"
        );

        Ok(ReportOutcome::Reported(ContrastReport {
            contrast,
            dir,
            table_path,
            manifest_path,
            cluster_count: table.len(),
            artifacts,
        }))
    }
}

impl ReportOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ReportOutcome::NoSignificantClusters => "no_significant_clusters",
            ReportOutcome::PreviewOnly { .. } => "preview_only",
            ReportOutcome::Reported(_) => "reported",
        }
    }
}

/// Plain-text table of raw clusters for preview output
pub fn format_preview(clusters: &[Cluster]) -> String {
    let mut out = format!(
        "{:>10} {:>9} {:>9} {:>9} {:>11} {:>9}\n",
        "cluster_id", "peak_x", "peak_y", "peak_z", "volume_mm", "peak_stat"
    );
    for c in clusters {
        let _ = writeln!(
            out,
            "{:>10} {:>9.2} {:>9.2} {:>9.2} {:>11.1} {:>9.4}",
            c.cluster_id, c.peak_x, c.peak_y, c.peak_z, c.volume_mm, c.peak_stat
        );
    }
    out
}
