use std::path::PathBuf;

/// Structural failures that abort a whole enrichment run.
///
/// Row-level defects and provider faults never become an `AppError`; they are
/// handled as values by the pipeline and only show up in the run summary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Unsupported input format '{0}' (expected .csv or .json)")]
    UnsupportedFormat(String),

    #[error("Invalid input schema: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
