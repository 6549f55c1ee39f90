//! Error types for result writers.

use era5_common::ExtractionError;
use thiserror::Error;

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<ExportError> for ExtractionError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Io(e) => ExtractionError::Io(e.to_string()),
            other => ExtractionError::Processing(other.to_string()),
        }
    }
}
