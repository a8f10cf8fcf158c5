//! fNeuro - Cluster inference and Bayesian evidence reporting for second-level fMRI maps
//!
//! Turns permutation-test statistic maps into per-contrast results tables:
//! cluster extraction → atlas annotation → Bayes factor bounds → CSV, glass
//! brain and manifest, one output directory per contrast.
//!
//! ## Modules
//!
//! - **Extraction**: threshold a -log10(p) map into ordered clusters
//! - **Annotation**: label cluster peaks from atlases and attach Bayes factor bounds
//! - **Reporting**: per-contrast orchestration with failure isolation
//! - **Correlation**: Spearman correlation of volumes with behavioural measures

pub mod annotator;
pub mod atlas;
pub mod bayes;
pub mod correlation;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod image;
pub mod render;
pub mod report;
pub mod table;
pub mod types;

pub use annotator::ClusterAnnotator;
pub use atlas::{AtlasSpec, LabelAtlas};
pub use bayes::bayes_factor_upper_bound;
pub use discovery::{ContrastImages, ImageSet};
pub use error::ReportError;
pub use extractor::{ClusterExtractor, Extraction};
pub use image::StatImage;
pub use report::{ReportConfig, ReportOutcome, ResultsReportBuilder};
pub use table::ResultsTable;
pub use types::{Contrast, MapDomain, PerContrast};

/// fNeuro version recorded in every report manifest
pub const FNEURO_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for report manifests
pub const PRODUCER_NAME: &str = "fneuro";
