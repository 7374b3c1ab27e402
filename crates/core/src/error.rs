use std::path::PathBuf;
use thiserror::Error;

/// Fatal problems that abort a run before any artifact is written.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("'input.json' not found in '{}'", .0.display())]
    MissingInput(PathBuf),

    #[error("'PDFs' directory not found in '{}'", .0.display())]
    MissingPdfDir(PathBuf),

    #[error("malformed input.json: {0}")]
    InputParse(#[from] serde_json::Error),

    #[error("invalid document filter pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("summary could not be written: {0}")]
    Summary(#[from] DocumentError),
}

/// Failures scoped to a single document. The pipeline records them as skips.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("pdf has no extractable text: {0}")]
    NoText(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("artifact write failed: {0}")]
    Persist(String),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("inference failed in {backend}: {details}")]
    Inference { backend: String, details: String },

    #[error("encoder returned {returned} rows for {requested} inputs")]
    RowCount { requested: usize, returned: usize },
}

pub type Result<T, E = DocumentError> = std::result::Result<T, E>;
