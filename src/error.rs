//! Error types for fNeuro cluster reporting

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while extracting, annotating or persisting cluster reports
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Invalid input: p-value {0} is outside (0, 1]")]
    InvalidPValue(f64),

    #[error("Failed to load image {path}: {message}")]
    ImageLoad { path: PathBuf, message: String },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("No {kind} image found for contrast '{contrast}'")]
    MissingImage { contrast: String, kind: String },

    #[error("{count} {kind} images match contrast '{contrast}'")]
    AmbiguousImage {
        contrast: String,
        kind: String,
        count: usize,
    },

    #[error("Atlas error: {0}")]
    Atlas(String),

    #[error("Invalid results table: {0}")]
    InvalidTable(String),

    #[error("Rendering error: {0}")]
    Render(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}
