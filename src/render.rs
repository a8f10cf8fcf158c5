//! Report artifacts
//!
//! Rendering is a collaborator of the report builder: it receives the
//! statistic map of one contrast and writes visual artifacts into that
//! contrast's output directory. The default renderer draws a glass brain,
//! the three maximum-intensity projections of the suprathreshold voxels.

use std::path::{Path, PathBuf};

use ndarray::{Array2, Axis};
use plotters::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::image::StatImage;
use crate::types::Contrast;

/// Kind of file written for a contrast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ClusterTable,
    GlassBrain,
    Manifest,
}

/// File produced for a contrast, tagged with the contrast's display title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub title: String,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, path: PathBuf, contrast: Contrast) -> Self {
        Self {
            kind,
            path,
            title: contrast.title().to_string(),
        }
    }
}

/// Produces visual artifacts for one contrast
pub trait ArtifactRenderer {
    /// Render `image` thresholded at `threshold` into `dir`
    fn render(
        &self,
        image: &StatImage,
        threshold: f64,
        contrast: Contrast,
        dir: &Path,
    ) -> Result<Vec<Artifact>, ReportError>;
}

/// Renderer that writes nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRender;

impl ArtifactRenderer for NoRender {
    fn render(
        &self,
        _image: &StatImage,
        _threshold: f64,
        _contrast: Contrast,
        _dir: &Path,
    ) -> Result<Vec<Artifact>, ReportError> {
        Ok(Vec::new())
    }
}

/// Three-panel glass brain written as SVG
#[derive(Debug, Clone, Copy)]
pub struct GlassBrainRenderer {
    /// Side of each square panel in pixels
    pub panel_size: u32,
}

impl Default for GlassBrainRenderer {
    fn default() -> Self {
        Self { panel_size: 300 }
    }
}

const OUTLINE: RGBColor = RGBColor(225, 225, 225);

impl ArtifactRenderer for GlassBrainRenderer {
    fn render(
        &self,
        image: &StatImage,
        threshold: f64,
        contrast: Contrast,
        dir: &Path,
    ) -> Result<Vec<Artifact>, ReportError> {
        let path = dir.join(format!("{}_glass_brain.svg", contrast));
        let projections = Projections::compute(image, threshold);
        self.draw(&projections, &path)?;

        tracing::debug!(contrast = %contrast, path = %path.display(), "rendered glass brain");
        Ok(vec![Artifact::new(ArtifactKind::GlassBrain, path, contrast)])
    }
}

impl GlassBrainRenderer {
    fn draw(&self, projections: &Projections, path: &Path) -> Result<(), ReportError> {
        let render_err = |e: &dyn std::fmt::Display| ReportError::Render(e.to_string());

        let size = self.panel_size.max(1);
        let root = SVGBackend::new(path, (size * 3, size)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| render_err(&e))?;

        let peak = projections.peak();
        let panels = root.split_evenly((1, 3));
        for (area, (stat, outline)) in panels.iter().zip(projections.panels()) {
            let (cols, rows) = stat.dim();
            let cell = (size as f64 / cols.max(rows).max(1) as f64).max(1.0);

            for ((a, b), value) in stat.indexed_iter() {
                let fill = if *value > 0.0 {
                    heat(*value / peak)
                } else if outline[[a, b]] {
                    OUTLINE
                } else {
                    continue;
                };
                // Rows grow upward so superior and anterior point up
                let x0 = (a as f64 * cell) as i32;
                let y0 = (size as f64 - (b + 1) as f64 * cell) as i32;
                let x1 = ((a + 1) as f64 * cell) as i32;
                let y1 = (size as f64 - b as f64 * cell) as i32;
                area.draw(&Rectangle::new([(x0, y0), (x1, y1)], fill.filled()))
                    .map_err(|e| render_err(&e))?;
            }
        }

        root.present().map_err(|e| render_err(&e))?;
        Ok(())
    }
}

/// Maximum-intensity projections: sagittal (y, z), coronal (x, z), axial (x, y)
struct Projections {
    stat: [Array2<f64>; 3],
    outline: [Array2<bool>; 3],
}

impl Projections {
    fn compute(image: &StatImage, threshold: f64) -> Self {
        let data = image.data();
        let supra = data.mapv(|v| if v.is_finite() && v > threshold { v } else { 0.0 });
        let inside = data.mapv(|v| v.is_finite() && v != 0.0);

        let max_along = |axis: usize| {
            supra.fold_axis(Axis(axis), 0.0_f64, |acc: &f64, v| acc.max(*v))
        };
        let any_along = |axis: usize| inside.fold_axis(Axis(axis), false, |acc, v| *acc || *v);

        Self {
            stat: [max_along(0), max_along(1), max_along(2)],
            outline: [any_along(0), any_along(1), any_along(2)],
        }
    }

    fn peak(&self) -> f64 {
        self.stat
            .iter()
            .flat_map(|p| p.iter().copied())
            .fold(0.0, f64::max)
    }

    fn panels(&self) -> impl Iterator<Item = (&Array2<f64>, &Array2<bool>)> {
        self.stat.iter().zip(self.outline.iter())
    }
}

/// Hot colour map, dark red at 0 through yellow at 1
fn heat(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let red = (160.0 + 95.0 * (t * 2.0).min(1.0)) as u8;
    let green = (255.0 * (t * 2.0 - 1.0).max(0.0)) as u8;
    RGBColor(red, green, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn blob_image() -> StatImage {
        let mut data = Array3::from_elem((6, 5, 4), 0.2);
        data[[2, 2, 1]] = 3.0;
        data[[3, 2, 1]] = 2.0;
        let affine = [
            [2.0, 0.0, 0.0, -6.0],
            [0.0, 2.0, 0.0, -4.0],
            [0.0, 0.0, 2.0, -4.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        StatImage::new(data, affine).unwrap()
    }

    #[test]
    fn test_projections_keep_suprathreshold_maxima() {
        let projections = Projections::compute(&blob_image(), 1.3);

        // Sagittal collapses x
        assert_eq!(projections.stat[0].dim(), (5, 4));
        assert_eq!(projections.stat[0][[2, 1]], 3.0);
        // Axial collapses z
        assert_eq!(projections.stat[2][[3, 2]], 2.0);
        assert_eq!(projections.stat[2][[0, 0]], 0.0);
        assert!(projections.outline[2][[0, 0]]);
        assert_eq!(projections.peak(), 3.0);
    }

    #[test]
    fn test_glass_brain_written_into_dir() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = GlassBrainRenderer { panel_size: 60 }
            .render(&blob_image(), 1.3, Contrast::Interaction, dir.path())
            .unwrap();

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].kind, ArtifactKind::GlassBrain);
        assert_eq!(artifacts[0].title, "Group x Time Interaction");
        assert_eq!(
            artifacts[0].path,
            dir.path().join("interaction_glass_brain.svg")
        );

        let svg = std::fs::read_to_string(&artifacts[0].path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("<rect"));
    }

    #[test]
    fn test_no_render_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = NoRender
            .render(&blob_image(), 1.3, Contrast::Group, dir.path())
            .unwrap();
        assert!(artifacts.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_heat_endpoints() {
        assert_eq!(heat(0.0), RGBColor(160, 0, 0));
        assert_eq!(heat(1.0), RGBColor(255, 255, 0));
    }
}
