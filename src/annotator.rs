//! Cluster annotation
//!
//! Enriches extracted clusters with their Bayes factor bound and with the
//! anatomical labels of their peaks. The resolved region of a cluster is the
//! first atlas label that is not background, falling back to [`NO_LABEL`].
//! Repeated regions within one table are numbered from their second
//! occurrence on ("Amygdala", "Amygdala 2", ...).
//!
//! The optional hemisphere prefix only applies to names taken from the primary
//! atlas; fallback atlases such as AAL already encode laterality ("_L"/"_R").

use std::collections::HashMap;

use crate::atlas::LabelAtlas;
use crate::bayes::bayes_factor_upper_bound;
use crate::error::ReportError;
use crate::table::ResultsTable;
use crate::types::{AnnotatedCluster, AtlasLabel, Cluster, BACKGROUND_LABEL, NO_LABEL};

/// Annotator over an ordered list of atlases, primary first
pub struct ClusterAnnotator<'a> {
    atlases: &'a [LabelAtlas],
    hemisphere_prefix: bool,
}

impl<'a> ClusterAnnotator<'a> {
    pub fn new(atlases: &'a [LabelAtlas]) -> Self {
        Self {
            atlases,
            hemisphere_prefix: false,
        }
    }

    /// Prefix resolved regions with "Left "/"Right " from the peak x coordinate
    pub fn with_hemisphere_prefix(mut self, enabled: bool) -> Self {
        self.hemisphere_prefix = enabled;
        self
    }

    /// Annotate clusters into a results table, preserving their order
    pub fn annotate(&self, clusters: Vec<Cluster>) -> Result<ResultsTable, ReportError> {
        let atlas_names: Vec<String> = self.atlases.iter().map(|a| a.name().to_string()).collect();

        let mut rows = Vec::with_capacity(clusters.len());
        let mut regions = Vec::with_capacity(clusters.len());

        for mut cluster in clusters {
            cluster.region_labels = self
                .atlases
                .iter()
                .map(|atlas| AtlasLabel {
                    atlas: atlas.name().to_string(),
                    label: atlas
                        .label_at(cluster.peak())
                        .unwrap_or(NO_LABEL)
                        .to_string(),
                })
                .collect();

            // 10^-peak underflows to zero for extreme peaks
            let bayes = bayes_factor_upper_bound(cluster.pval.max(f64::MIN_POSITIVE))?;

            let region = match first_informative(&cluster.region_labels) {
                Some((0, label)) if self.hemisphere_prefix => {
                    format!("{}{}", hemisphere(cluster.peak_x), label)
                }
                Some((_, label)) => label.to_string(),
                None => NO_LABEL.to_string(),
            };

            regions.push(region);
            rows.push((cluster, bayes));
        }

        let regions = disambiguate(&regions);
        let rows = rows
            .into_iter()
            .zip(regions)
            .map(|((cluster, bayes), region)| AnnotatedCluster {
                cluster,
                bayes,
                region,
            })
            .collect();

        ResultsTable::new(atlas_names, rows)
    }
}

/// Whether a label carries no anatomical information
pub fn is_background(label: &str) -> bool {
    let label = label.trim();
    label.is_empty() || label == NO_LABEL || label.contains(BACKGROUND_LABEL)
}

/// First informative label in atlas order, or [`NO_LABEL`]
pub fn resolve_region(labels: &[AtlasLabel]) -> String {
    first_informative(labels)
        .map_or(NO_LABEL, |(_, label)| label)
        .to_string()
}

/// Index of the supplying atlas with its label
fn first_informative(labels: &[AtlasLabel]) -> Option<(usize, &str)> {
    labels
        .iter()
        .map(|l| l.label.as_str())
        .enumerate()
        .find(|(_, label)| !is_background(label))
}

/// Number repeated names from their second occurrence; [`NO_LABEL`] is left as-is
pub fn disambiguate(names: &[String]) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    names
        .iter()
        .map(|name| {
            if name == NO_LABEL {
                return name.clone();
            }
            let count = seen.entry(name.as_str()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name.clone()
            } else {
                format!("{} {}", name, count)
            }
        })
        .collect()
}

/// Hemisphere prefix for an MNI x coordinate
pub fn hemisphere(x: f64) -> &'static str {
    if x < 0.0 {
        "Left "
    } else {
        "Right "
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::parse_labels;
    use crate::image::StatImage;
    use ndarray::Array3;
    use pretty_assertions::assert_eq;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn label(atlas: &str, label: &str) -> AtlasLabel {
        AtlasLabel {
            atlas: atlas.to_string(),
            label: label.to_string(),
        }
    }

    fn cluster(id: u32, x: f64, peak_stat: f64) -> Cluster {
        Cluster {
            cluster_id: id,
            peak_x: x,
            peak_y: 0.0,
            peak_z: 0.0,
            volume_mm: 8.0,
            peak_stat,
            pval: 10f64.powf(-peak_stat),
            region_labels: Vec::new(),
        }
    }

    /// 1mm atlas spanning x in [-4, 3]: x < 0 is `left_index`, x >= 0 is `right_index`
    fn split_atlas(name: &str, labels: &str, left_index: f64, right_index: f64) -> LabelAtlas {
        let mut data = Array3::zeros((8, 1, 1));
        for i in 0..8 {
            data[[i, 0, 0]] = if i < 4 { left_index } else { right_index };
        }
        let affine = [
            [1.0, 0.0, 0.0, -4.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        LabelAtlas::new(
            name,
            StatImage::new(data, affine).unwrap(),
            parse_labels(labels).unwrap(),
        )
    }

    #[test]
    fn test_disambiguate_suffixes_repeats_only() {
        let names = strings(&["Amygdala", "Amygdala", "Thalamus", "Amygdala"]);
        assert_eq!(
            disambiguate(&names),
            strings(&["Amygdala", "Amygdala 2", "Thalamus", "Amygdala 3"])
        );
    }

    #[test]
    fn test_disambiguate_leaves_sentinel() {
        let names = strings(&[NO_LABEL, "Insula", NO_LABEL]);
        assert_eq!(disambiguate(&names), strings(&[NO_LABEL, "Insula", NO_LABEL]));
    }

    #[test]
    fn test_resolve_region_fallback_chain() {
        let primary_ok = [label("ho", "Amygdala"), label("aal", "Amygdala_L")];
        assert_eq!(resolve_region(&primary_ok), "Amygdala");

        let primary_background = [label("ho", "Background"), label("aal", "Amygdala_L")];
        assert_eq!(resolve_region(&primary_background), "Amygdala_L");

        let both_missing = [label("ho", "Background"), label("aal", NO_LABEL)];
        assert_eq!(resolve_region(&both_missing), NO_LABEL);

        assert_eq!(resolve_region(&[]), NO_LABEL);
    }

    #[test]
    fn test_annotate_uses_secondary_atlas_on_background() {
        let atlases = vec![
            split_atlas("harvard_oxford", "Background\nInsular Cortex\n", 1.0, 0.0),
            split_atlas("aal", "3001\tInsula_L\n3002\tInsula_R\n", 3001.0, 3002.0),
        ];
        let clusters = vec![cluster(1, -2.0, 3.0), cluster(2, 2.0, 2.0)];

        let table = ClusterAnnotator::new(&atlases).annotate(clusters).unwrap();
        let rows = table.rows();

        assert_eq!(table.atlas_names(), &strings(&["harvard_oxford", "aal"])[..]);
        assert_eq!(rows[0].region, "Insular Cortex");
        assert_eq!(rows[1].region, "Insula_R");
        assert_eq!(rows[1].cluster.region_labels[0].label, "Background");
        assert!(rows[0].bayes.bfb > 0.0);
    }

    #[test]
    fn test_annotate_outside_every_atlas_is_no_label() {
        let atlases = vec![split_atlas("ho", "Background\nPutamen\n", 1.0, 1.0)];
        let clusters = vec![cluster(1, 50.0, 3.0), cluster(2, 60.0, 2.0)];

        let table = ClusterAnnotator::new(&atlases).annotate(clusters).unwrap();
        for row in table.rows() {
            assert_eq!(row.region, NO_LABEL);
            assert_eq!(row.cluster.region_labels[0].label, NO_LABEL);
        }
    }

    #[test]
    fn test_hemisphere_prefix_then_disambiguation() {
        let atlases = vec![split_atlas("ho", "Background\nThalamus\n", 1.0, 1.0)];
        let clusters = vec![
            cluster(1, -3.0, 4.0),
            cluster(2, -1.0, 3.0),
            cluster(3, 1.0, 2.0),
        ];

        let table = ClusterAnnotator::new(&atlases)
            .with_hemisphere_prefix(true)
            .annotate(clusters)
            .unwrap();
        let regions: Vec<&str> = table.rows().iter().map(|r| r.region.as_str()).collect();

        assert_eq!(
            regions,
            vec!["Left Thalamus", "Left Thalamus 2", "Right Thalamus"]
        );
    }

    #[test]
    fn test_hemisphere_prefix_only_on_primary_atlas_labels() {
        let atlases = vec![
            split_atlas("harvard_oxford", "Background\nAmygdala\n", 0.0, 1.0),
            split_atlas("aal", "4101\tAmygdala_L\n4102\tAmygdala_R\n", 4101.0, 4102.0),
        ];
        let clusters = vec![cluster(1, -2.0, 3.0), cluster(2, 2.0, 2.0)];

        let table = ClusterAnnotator::new(&atlases)
            .with_hemisphere_prefix(true)
            .annotate(clusters)
            .unwrap();
        let rows = table.rows();

        assert_eq!(rows[0].cluster.region_labels[0].label, "Background");
        assert_eq!(rows[0].region, "Amygdala_L");
        assert_eq!(rows[1].region, "Right Amygdala");
    }

    #[test]
    fn test_extreme_peak_does_not_fail() {
        let table = ClusterAnnotator::new(&[])
            .annotate(vec![cluster(1, 0.0, 400.0)])
            .unwrap();
        assert!(table.rows()[0].bayes.bfb.is_finite());
        assert_eq!(table.rows()[0].region, NO_LABEL);
    }
}
