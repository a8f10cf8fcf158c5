//! Cluster extraction
//!
//! Thresholds a statistical image and enumerates its face-connected
//! suprathreshold clusters:
//! - Voxels strictly above the statistic threshold are kept
//! - Components are labelled in scan order (x outermost, z innermost)
//! - Components smaller than the extent threshold (voxels) are dropped
//! - Clusters are ordered by descending peak, ties by component label, and
//!   numbered from 1 in that order

use std::cmp::Ordering;
use std::collections::VecDeque;

use ndarray::Array3;

use crate::image::StatImage;
use crate::types::Cluster;

/// Default statistic threshold, -log10(0.05)
pub const DEFAULT_STAT_THRESHOLD: f64 = 1.301_029_995_663_981_3;

/// Result of thresholding an image
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// At least one cluster survived, in descending peak order
    Clusters(Vec<Cluster>),
    /// Nothing survived the thresholds
    NoSignificantClusters,
}

impl Extraction {
    pub fn clusters(&self) -> &[Cluster] {
        match self {
            Extraction::Clusters(clusters) => clusters,
            Extraction::NoSignificantClusters => &[],
        }
    }
}

/// Connected-component cluster extractor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterExtractor {
    stat_threshold: f64,
    cluster_threshold: usize,
}

impl Default for ClusterExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_STAT_THRESHOLD, 0)
    }
}

/// Component found during labelling, before ordering
struct Component {
    label: u32,
    size: usize,
    peak_value: f64,
    peak_voxel: [usize; 3],
}

impl ClusterExtractor {
    /// Create an extractor; `cluster_threshold` is a minimum extent in voxels
    pub fn new(stat_threshold: f64, cluster_threshold: usize) -> Self {
        Self {
            stat_threshold,
            cluster_threshold,
        }
    }

    pub fn stat_threshold(&self) -> f64 {
        self.stat_threshold
    }

    pub fn cluster_threshold(&self) -> usize {
        self.cluster_threshold
    }

    /// Extract clusters from a statistic map in -log10(p) units
    pub fn extract(&self, image: &StatImage) -> Extraction {
        let mut components = label_components(image.data(), self.stat_threshold);
        let found = components.len();

        components.retain(|c| c.size >= self.cluster_threshold);
        components.sort_by(|a, b| {
            b.peak_value
                .total_cmp(&a.peak_value)
                .then_with(|| a.label.cmp(&b.label))
        });

        tracing::debug!(
            found,
            kept = components.len(),
            stat_threshold = self.stat_threshold,
            cluster_threshold = self.cluster_threshold,
            "labelled suprathreshold components"
        );

        if components.is_empty() {
            return Extraction::NoSignificantClusters;
        }

        let voxel_volume = image.voxel_volume();
        let clusters = components
            .into_iter()
            .enumerate()
            .map(|(idx, c)| {
                let [peak_x, peak_y, peak_z] = image.voxel_to_mm(c.peak_voxel);
                Cluster {
                    cluster_id: idx as u32 + 1,
                    peak_x,
                    peak_y,
                    peak_z,
                    volume_mm: c.size as f64 * voxel_volume,
                    peak_stat: c.peak_value,
                    pval: peak_to_pval(c.peak_value),
                    region_labels: Vec::new(),
                }
            })
            .collect();

        Extraction::Clusters(clusters)
    }
}

/// p-value of a peak given in -log10(p) units
pub fn peak_to_pval(peak_stat: f64) -> f64 {
    10f64.powf(-peak_stat)
}

fn label_components(data: &Array3<f64>, threshold: f64) -> Vec<Component> {
    let (nx, ny, nz) = data.dim();
    let above = |v: f64| v.is_finite() && v > threshold;

    let mut labels = Array3::<u32>::zeros((nx, ny, nz));
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for i in 0..nx {
        for j in 0..ny {
            for k in 0..nz {
                if labels[[i, j, k]] != 0 || !above(data[[i, j, k]]) {
                    continue;
                }

                let label = components.len() as u32 + 1;
                let mut component = Component {
                    label,
                    size: 0,
                    peak_value: f64::NEG_INFINITY,
                    peak_voxel: [i, j, k],
                };

                labels[[i, j, k]] = label;
                queue.push_back([i, j, k]);

                while let Some(voxel) = queue.pop_front() {
                    let value = data[voxel];
                    component.size += 1;
                    match value.total_cmp(&component.peak_value) {
                        Ordering::Greater => {
                            component.peak_value = value;
                            component.peak_voxel = voxel;
                        }
                        Ordering::Equal if voxel < component.peak_voxel => {
                            component.peak_voxel = voxel;
                        }
                        _ => {}
                    }

                    for neighbour in face_neighbours(voxel, (nx, ny, nz)) {
                        if labels[neighbour] == 0 && above(data[neighbour]) {
                            labels[neighbour] = label;
                            queue.push_back(neighbour);
                        }
                    }
                }

                components.push(component);
            }
        }
    }

    components
}

fn face_neighbours(
    [i, j, k]: [usize; 3],
    (nx, ny, nz): (usize, usize, usize),
) -> impl Iterator<Item = [usize; 3]> {
    let candidates = [
        i.checked_sub(1).map(|x| [x, j, k]),
        (i + 1 < nx).then(|| [i + 1, j, k]),
        j.checked_sub(1).map(|y| [i, y, k]),
        (j + 1 < ny).then(|| [i, j + 1, k]),
        k.checked_sub(1).map(|z| [i, j, z]),
        (k + 1 < nz).then(|| [i, j, k + 1]),
    ];
    candidates.into_iter().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Affine;

    fn identity_2mm() -> Affine {
        [
            [2.0, 0.0, 0.0, 0.0],
            [0.0, 2.0, 0.0, 0.0],
            [0.0, 0.0, 2.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    fn image_from(data: Array3<f64>) -> StatImage {
        StatImage::new(data, identity_2mm()).unwrap()
    }

    /// Three separated blobs with peaks 3.0, 1.5 and 1.0
    fn three_blob_image() -> StatImage {
        let mut data = Array3::zeros((12, 6, 6));
        // Blob A: 2 voxels, peak 1.5, only the peak above threshold
        data[[1, 1, 1]] = 1.2;
        data[[1, 1, 2]] = 1.5;
        // Blob B: 3 voxels, peak 3.0
        data[[5, 2, 2]] = 2.0;
        data[[6, 2, 2]] = 3.0;
        data[[7, 2, 2]] = 2.5;
        // Blob C: 1 voxel, peak 1.0
        data[[10, 4, 4]] = 1.0;
        image_from(data)
    }

    #[test]
    fn test_orders_by_descending_peak_and_drops_subthreshold() {
        let extraction = ClusterExtractor::new(DEFAULT_STAT_THRESHOLD, 0).extract(&three_blob_image());

        let clusters = extraction.clusters();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].peak_stat, 3.0);
        assert_eq!(clusters[1].peak_stat, 1.5);
        assert_eq!(clusters[0].cluster_id, 1);
        assert_eq!(clusters[1].cluster_id, 2);
    }

    #[test]
    fn test_peak_coordinates_volume_and_pval() {
        let extraction = ClusterExtractor::new(DEFAULT_STAT_THRESHOLD, 0).extract(&three_blob_image());
        let top = &extraction.clusters()[0];

        assert_eq!(top.peak(), [12.0, 4.0, 4.0]);
        assert_eq!(top.volume_mm, 3.0 * 8.0);
        assert!((top.pval - 0.001).abs() < 1e-12);

        // Only the 1.5 voxel of blob A is above threshold
        let second = &extraction.clusters()[1];
        assert_eq!(second.volume_mm, 8.0);
        assert_eq!(second.peak(), [2.0, 2.0, 4.0]);
    }

    #[test]
    fn test_all_below_threshold_is_named_outcome() {
        let mut data = Array3::zeros((4, 4, 4));
        data[[1, 1, 1]] = 1.2;
        let extraction = ClusterExtractor::default().extract(&image_from(data));

        assert_eq!(extraction, Extraction::NoSignificantClusters);
        assert!(extraction.clusters().is_empty());
    }

    #[test]
    fn test_extent_threshold() {
        let extraction = ClusterExtractor::new(DEFAULT_STAT_THRESHOLD, 2).extract(&three_blob_image());

        let clusters = extraction.clusters();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].peak_stat, 3.0);
    }

    #[test]
    fn test_diagonal_voxels_are_separate_clusters() {
        let mut data = Array3::zeros((3, 3, 3));
        data[[0, 0, 0]] = 2.0;
        data[[1, 1, 0]] = 2.0;
        let extraction = ClusterExtractor::default().extract(&image_from(data));

        assert_eq!(extraction.clusters().len(), 2);
    }

    #[test]
    fn test_equal_peaks_keep_scan_order() {
        let mut data = Array3::zeros((6, 2, 2));
        data[[4, 0, 0]] = 2.0;
        data[[1, 0, 0]] = 2.0;
        let extraction = ClusterExtractor::default().extract(&image_from(data));

        let clusters = extraction.clusters();
        assert_eq!(clusters[0].peak_x, 2.0);
        assert_eq!(clusters[1].peak_x, 8.0);
    }

    #[test]
    fn test_non_finite_voxels_ignored() {
        let mut data = Array3::zeros((3, 3, 3));
        data[[0, 0, 0]] = f64::NAN;
        data[[2, 2, 2]] = f64::INFINITY;
        let extraction = ClusterExtractor::default().extract(&image_from(data));

        assert_eq!(extraction, Extraction::NoSignificantClusters);
    }

    #[test]
    fn test_zero_threshold_keeps_positive_voxels() {
        let extraction = ClusterExtractor::new(0.0, 0).extract(&three_blob_image());
        assert_eq!(extraction.clusters().len(), 3);
        assert_eq!(extraction.clusters()[2].peak_stat, 1.0);
    }
}
