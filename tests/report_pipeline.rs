//! End-to-end reporting on synthetic maps

use std::fs;
use std::path::Path;

use fneuro::atlas::parse_labels;
use fneuro::extractor::DEFAULT_STAT_THRESHOLD;
use fneuro::image::Affine;
use fneuro::types::NO_LABEL;
use fneuro::{
    ClusterExtractor, Contrast, Extraction, ImageSet, LabelAtlas, MapDomain, ReportConfig,
    ReportError, ReportOutcome, ResultsReportBuilder, ResultsTable, StatImage,
};
use ndarray::Array3;
use pretty_assertions::assert_eq;

const AFFINE: Affine = [
    [2.0, 0.0, 0.0, -20.0],
    [0.0, 2.0, 0.0, -20.0],
    [0.0, 0.0, 2.0, -20.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Three separated blobs peaking at 3.0, 1.5 and 1.0 -log10(p)
fn three_cluster_map() -> StatImage {
    let mut data = Array3::zeros((20, 20, 20));
    for (i, j, k, v) in [
        (4, 4, 4, 3.0),
        (5, 4, 4, 2.5),
        (4, 5, 4, 2.0),
        (14, 14, 14, 1.5),
        (14, 14, 15, 1.4),
        (10, 2, 16, 1.0),
    ] {
        data[[i, j, k]] = v;
    }
    StatImage::new(data, AFFINE).unwrap()
}

/// Left half labelled Amygdala, right half Background
fn half_atlas() -> LabelAtlas {
    let mut data = Array3::zeros((20, 20, 20));
    data.slice_mut(ndarray::s![..10, .., ..]).fill(1.0);
    LabelAtlas::new(
        "harvard_oxford",
        StatImage::new(data, AFFINE).unwrap(),
        parse_labels("Background\nAmygdala\n").unwrap(),
    )
}

fn write_map(dir: &Path, name: &str, image: &StatImage) {
    fs::write(dir.join(name), image.to_json().unwrap()).unwrap();
}

fn no_render() -> ReportConfig {
    ReportConfig {
        render: false,
        ..ReportConfig::default()
    }
}

#[test]
fn extraction_keeps_suprathreshold_peaks_in_descending_order() {
    let extraction = ClusterExtractor::new(DEFAULT_STAT_THRESHOLD, 0).extract(&three_cluster_map());

    let peaks: Vec<f64> = extraction.clusters().iter().map(|c| c.peak_stat).collect();
    assert_eq!(peaks, vec![3.0, 1.5]);

    let ids: Vec<u32> = extraction.clusters().iter().map(|c| c.cluster_id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn below_threshold_map_produces_no_artifacts() {
    let out = tempfile::tempdir().unwrap();
    let flat = StatImage::new(Array3::from_elem((5, 5, 5), 1.0), AFFINE).unwrap();

    assert_eq!(
        ClusterExtractor::default().extract(&flat),
        Extraction::NoSignificantClusters
    );

    let outcome = ResultsReportBuilder::new(out.path(), ReportConfig::default())
        .report(Contrast::Group, &flat)
        .unwrap();
    assert_eq!(outcome, ReportOutcome::NoSignificantClusters);
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn written_table_reloads_with_same_columns_and_values() {
    let out = tempfile::tempdir().unwrap();
    let atlases = vec![half_atlas()];
    let builder = ResultsReportBuilder::new(out.path(), no_render()).with_atlases(&atlases);

    let report = match builder.report(Contrast::Time, &three_cluster_map()).unwrap() {
        ReportOutcome::Reported(report) => report,
        other => panic!("expected a report, got {:?}", other),
    };

    let csv = fs::read_to_string(&report.table_path).unwrap();
    let header = csv.lines().next().unwrap();
    assert_eq!(
        header,
        "cluster_id,peak_x,peak_y,peak_z,volume_mm,log10p,pval,BFB,odds,null_probability,harvard_oxford,region"
    );

    let table = ResultsTable::load(&report.table_path).unwrap();
    assert_eq!(table.len(), 2);

    let first = &table.rows()[0];
    assert_eq!(first.cluster.peak(), [-12.0, -12.0, -12.0]);
    assert_eq!(first.cluster.volume_mm, 24.0);
    assert_eq!(first.cluster.peak_stat, 3.0);
    assert!((first.cluster.pval - 0.001).abs() < 1e-12);
    assert_eq!(first.region, "Amygdala");

    let second = &table.rows()[1];
    assert_eq!(second.cluster.region_labels[0].label, "Background");
    assert_eq!(second.region, NO_LABEL);

    // Reading the stored table again gives an identical table
    let mut buffer = Vec::new();
    table.write_csv(&mut buffer).unwrap();
    assert_eq!(String::from_utf8(buffer).unwrap(), csv);
}

#[test]
fn batch_reports_each_contrast_into_its_own_directory() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let map = three_cluster_map();
    for contrast in ["group", "interaction"] {
        write_map(input.path(), &format!("perm_tfce_fwep_{}.json", contrast), &map);
        write_map(input.path(), &format!("perm_tfce_tstat_{}.json", contrast), &map);
    }

    let images = ImageSet::discover(input.path(), MapDomain::Tfce).unwrap();
    let results = ResultsReportBuilder::new(out.path(), no_render()).run_batch(&images);

    assert!(matches!(results.group, Ok(ReportOutcome::Reported(_))));
    assert!(matches!(results.interaction, Ok(ReportOutcome::Reported(_))));
    assert!(matches!(
        results.time,
        Err(ReportError::MissingImage { .. })
    ));

    for contrast in ["group", "interaction"] {
        let dir = out.path().join(contrast);
        assert!(dir.join(format!("{}_clusters.csv", contrast)).is_file());
        assert!(dir.join(format!("{}_manifest.json", contrast)).is_file());
    }
    assert!(!out.path().join("time").exists());
}
