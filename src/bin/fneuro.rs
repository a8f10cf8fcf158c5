//! fNeuro CLI - Command-line interface for cluster reporting
//!
//! Commands:
//! - report: Batch-report every contrast of a permutation test directory
//! - clusters: Extract and print the raw cluster table of one image
//! - bayes: Bayes factor bounds for p-values
//! - coordinates: Peak coordinates and region names of a results table
//! - correlate: Spearman correlation of a volume with behavioural measures

use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use fneuro::correlation::MeasureTable;
use fneuro::extractor::DEFAULT_STAT_THRESHOLD;
use fneuro::report::format_preview;
use fneuro::types::BayesianSummary;
use fneuro::{
    bayes_factor_upper_bound, AtlasSpec, ClusterExtractor, Extraction, ImageSet, LabelAtlas,
    MapDomain, ReportConfig, ReportError, ReportOutcome, ResultsReportBuilder, ResultsTable,
    StatImage, FNEURO_VERSION,
};

/// fNeuro - Cluster inference and Bayesian evidence reporting
#[derive(Parser)]
#[command(name = "fneuro")]
#[command(version = FNEURO_VERSION)]
#[command(about = "Report clusters of second-level statistical maps", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report the group, time and interaction contrasts of a results directory
    Report {
        /// Directory holding the permutation test images
        #[arg(short, long, env = "FNEURO_INPUT_DIR")]
        input_dir: PathBuf,

        /// Root directory for per-contrast outputs
        #[arg(short, long, env = "FNEURO_OUTPUT_DIR")]
        output_dir: PathBuf,

        /// Use voxel-wise maps instead of TFCE maps
        #[arg(long, env = "FNEURO_VOXEL")]
        voxel: bool,

        /// Statistic threshold in -log10(p) units (0 previews only)
        #[arg(long, default_value_t = DEFAULT_STAT_THRESHOLD, env = "FNEURO_STAT_THRESHOLD")]
        stat_threshold: f64,

        /// Minimum cluster extent in voxels
        #[arg(long, default_value_t = 0, env = "FNEURO_CLUSTER_THRESHOLD")]
        cluster_threshold: usize,

        /// Label atlas as NAME=IMAGE,LABELS; repeat in priority order
        #[arg(long = "atlas")]
        atlases: Vec<AtlasSpec>,

        /// Prefix region names with their hemisphere
        #[arg(long, env = "FNEURO_HEMISPHERE")]
        hemisphere: bool,

        /// Skip glass brain rendering
        #[arg(long, env = "FNEURO_NO_RENDER")]
        no_render: bool,

        /// Rows shown per contrast in preview mode
        #[arg(long, default_value_t = 5)]
        preview_rows: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract and print the raw clusters of one image
    Clusters {
        /// Statistic image (.nii, .nii.gz or .json)
        #[arg(short, long)]
        image: PathBuf,

        /// Statistic threshold in -log10(p) units
        #[arg(long, default_value_t = DEFAULT_STAT_THRESHOLD)]
        stat_threshold: f64,

        /// Minimum cluster extent in voxels
        #[arg(long, default_value_t = 0)]
        cluster_threshold: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Bayes factor bound for each p-value
    Bayes {
        /// p-values in (0, 1]
        #[arg(required = true)]
        pvalues: Vec<f64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Peak coordinates and region names of a results table
    Coordinates {
        /// Results table CSV
        #[arg(short, long)]
        table: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Spearman correlation of a volume column with every behaviour column
    Correlate {
        /// CSV of volumes and behavioural measures
        #[arg(short, long)]
        table: PathBuf,

        /// Column holding the volume measure
        #[arg(long)]
        volume: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FneuroCliError> {
    match cli.command {
        Commands::Report {
            input_dir,
            output_dir,
            voxel,
            stat_threshold,
            cluster_threshold,
            atlases,
            hemisphere,
            no_render,
            preview_rows,
            json,
        } => {
            let config = ReportConfig {
                stat_threshold,
                cluster_threshold,
                render: !no_render,
                hemisphere_prefix: hemisphere,
                preview_rows,
            };
            let domain = if voxel { MapDomain::Vox } else { MapDomain::Tfce };
            cmd_report(&input_dir, &output_dir, domain, &atlases, config, json)
        }
        Commands::Clusters {
            image,
            stat_threshold,
            cluster_threshold,
            json,
        } => cmd_clusters(&image, stat_threshold, cluster_threshold, json),
        Commands::Bayes { pvalues, json } => cmd_bayes(&pvalues, json),
        Commands::Coordinates { table, json } => cmd_coordinates(&table, json),
        Commands::Correlate {
            table,
            volume,
            json,
        } => cmd_correlate(&table, &volume, json),
    }
}

fn cmd_report(
    input_dir: &Path,
    output_dir: &Path,
    domain: MapDomain,
    atlas_specs: &[AtlasSpec],
    config: ReportConfig,
    json: bool,
) -> Result<(), FneuroCliError> {
    let atlases = atlas_specs
        .iter()
        .map(LabelAtlas::load)
        .collect::<Result<Vec<_>, _>>()?;
    let images = ImageSet::discover(input_dir, domain)?;

    let builder = ResultsReportBuilder::new(output_dir, config).with_atlases(&atlases);
    let results = builder.run_batch(&images);

    if json {
        let mut report = serde_json::Map::new();
        for (contrast, result) in results.iter() {
            let value = match result {
                Ok(outcome) => serde_json::to_value(outcome)?,
                Err(e) => serde_json::json!({
                    "status": "failed",
                    "error": report_error(e),
                }),
            };
            report.insert(contrast.to_string(), value);
        }
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (contrast, result) in results.iter() {
            match result {
                Ok(ReportOutcome::NoSignificantClusters) => {
                    println!("{} ({}): no significant clusters", contrast, contrast.title());
                }
                Ok(ReportOutcome::PreviewOnly {
                    total_clusters,
                    rows,
                }) => {
                    println!(
                        "{} ({}): preview of {} of {} clusters",
                        contrast,
                        contrast.title(),
                        rows.len(),
                        total_clusters
                    );
                    print!("{}", format_preview(rows));
                }
                Ok(ReportOutcome::Reported(report)) => {
                    println!(
                        "{} ({}): {} clusters -> {}",
                        contrast,
                        contrast.title(),
                        report.cluster_count,
                        report.dir.display()
                    );
                }
                Err(e) => println!("{} ({}): failed: {}", contrast, contrast.title(), e),
            }
        }
    }

    if results.iter().all(|(_, result)| result.is_err()) {
        return Err(FneuroCliError::AllContrastsFailed);
    }
    Ok(())
}

fn cmd_clusters(
    image: &Path,
    stat_threshold: f64,
    cluster_threshold: usize,
    json: bool,
) -> Result<(), FneuroCliError> {
    let image = StatImage::load(image)?;
    let extraction = ClusterExtractor::new(stat_threshold, cluster_threshold).extract(&image);

    match (&extraction, json) {
        (Extraction::NoSignificantClusters, true) => {
            println!("{}", serde_json::json!({ "status": "no_significant_clusters" }));
        }
        (Extraction::NoSignificantClusters, false) => println!("No significant clusters"),
        (Extraction::Clusters(clusters), true) => {
            println!("{}", serde_json::to_string_pretty(clusters)?);
        }
        (Extraction::Clusters(clusters), false) => print!("{}", format_preview(clusters)),
    }
    Ok(())
}

#[derive(Serialize)]
struct BayesRow {
    p: f64,
    #[serde(flatten)]
    summary: BayesianSummary,
}

fn cmd_bayes(pvalues: &[f64], json: bool) -> Result<(), FneuroCliError> {
    let rows = pvalues
        .iter()
        .map(|&p| bayes_factor_upper_bound(p).map(|summary| BayesRow { p, summary }))
        .collect::<Result<Vec<_>, _>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!(
            "{:>10} {:>14} {:>14} {:>10} {:>10}",
            "p", "BFB", "odds", "null_%", "alt_%"
        );
        for row in &rows {
            println!(
                "{:>10} {:>14.4} {:>14.4} {:>10.4} {:>10.4}",
                row.p,
                row.summary.bfb,
                row.summary.odds,
                row.summary.null_probability,
                row.summary.alternative_probability
            );
        }
    }
    Ok(())
}

fn cmd_coordinates(table: &Path, json: bool) -> Result<(), FneuroCliError> {
    let coordinates = ResultsTable::load(table)?.coordinates();

    if json {
        println!("{}", serde_json::to_string_pretty(&coordinates)?);
    } else {
        for c in &coordinates {
            println!(
                "{:>3}  ({:>7.1}, {:>7.1}, {:>7.1})  {}",
                c.cluster_id, c.mni[0], c.mni[1], c.mni[2], c.name
            );
        }
    }
    Ok(())
}

fn cmd_correlate(table: &Path, volume: &str, json: bool) -> Result<(), FneuroCliError> {
    let results = MeasureTable::load(table)?.correlate(volume)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!(
            "{:<24} {:>4} {:>8} {:>10} {:>14} {:>10}",
            "behaviour", "n", "rho", "p", "BFB", "null_%"
        );
        for r in &results {
            println!(
                "{:<24} {:>4} {:>8.4} {:>10.4} {:>14.4} {:>10.4}",
                r.behaviour, r.n, r.rho, r.pval, r.bayes.bfb, r.bayes.null_probability
            );
        }
    }
    Ok(())
}

// Error handling

#[derive(Debug)]
enum FneuroCliError {
    Io(io::Error),
    Report(ReportError),
    Json(serde_json::Error),
    AllContrastsFailed,
}

impl From<io::Error> for FneuroCliError {
    fn from(e: io::Error) -> Self {
        FneuroCliError::Io(e)
    }
}

impl From<ReportError> for FneuroCliError {
    fn from(e: ReportError) -> Self {
        FneuroCliError::Report(e)
    }
}

impl From<serde_json::Error> for FneuroCliError {
    fn from(e: serde_json::Error) -> Self {
        FneuroCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FneuroCliError> for CliError {
    fn from(e: FneuroCliError) -> Self {
        match e {
            FneuroCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FneuroCliError::Report(e) => report_error(&e),
            FneuroCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            FneuroCliError::AllContrastsFailed => CliError {
                code: "ALL_CONTRASTS_FAILED".to_string(),
                message: "No contrast could be reported".to_string(),
                hint: Some("Check that the input directory holds the expected maps".to_string()),
            },
        }
    }
}

fn report_error(e: &ReportError) -> CliError {
    let (code, hint) = match e {
        ReportError::InvalidPValue(_) => ("INVALID_P_VALUE", Some("p-values must lie in (0, 1]")),
        ReportError::MissingImage { .. } | ReportError::AmbiguousImage { .. } => (
            "IMAGE_NOT_FOUND",
            Some("Expected exactly one <domain>_fwep_ and <domain>_tstat_ map per contrast"),
        ),
        ReportError::ImageLoad { .. } | ReportError::InvalidImage(_) => {
            ("IMAGE_ERROR", Some("Images must be 3D NIfTI or JSON volumes"))
        }
        ReportError::Atlas(_) => ("ATLAS_ERROR", Some("Atlases are given as NAME=IMAGE,LABELS")),
        ReportError::InvalidTable(_) | ReportError::Csv(_) => ("TABLE_ERROR", None),
        ReportError::InsufficientData(_) => (
            "INSUFFICIENT_DATA",
            Some("Each behaviour needs at least 3 complete, non-constant pairs"),
        ),
        ReportError::Render(_) => ("RENDER_ERROR", Some("Retry with --no-render")),
        ReportError::Io(_) => ("IO_ERROR", Some("Check file paths and permissions")),
        ReportError::JsonError(_) => ("JSON_ERROR", None),
    };
    CliError {
        code: code.to_string(),
        message: e.to_string(),
        hint: hint.map(str::to_string),
    }
}
