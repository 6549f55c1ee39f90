//! Error types for the ERA5-Land extractor.

use thiserror::Error;

/// Result type alias using ExtractionError.
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Coarse error classification reported to the host when a job terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    UnknownVariable,
    ProviderError,
    NetworkError,
    PartialDownload,
    MalformedGrid,
    PointOutsideGrid,
    ProcessingError,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::UnknownVariable => "UnknownVariable",
            Self::ProviderError => "ProviderError",
            Self::NetworkError => "NetworkError",
            Self::PartialDownload => "PartialDownload",
            Self::MalformedGrid => "MalformedGrid",
            Self::PointOutsideGrid => "PointOutsideGrid",
            Self::ProcessingError => "ProcessingError",
            Self::Io => "Io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary error type for extraction operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionError {
    // === Caller errors (surfaced before any network call) ===
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    // === Remote errors ===
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Partial download: expected {expected} bytes, got {actual}")]
    PartialDownload { expected: u64, actual: u64 },

    // === Data errors ===
    #[error("Malformed grid: {0}")]
    MalformedGrid(String),

    #[error("Point ({lon}, {lat}) is outside the grid coverage")]
    PointOutsideGrid { lon: f64, lat: f64 },

    #[error("Processing failed: {0}")]
    Processing(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl ExtractionError {
    /// Classification used on the host callback surface.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::UnknownVariable(_) => ErrorKind::UnknownVariable,
            Self::Provider(_) => ErrorKind::ProviderError,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::PartialDownload { .. } => ErrorKind::PartialDownload,
            Self::MalformedGrid(_) => ErrorKind::MalformedGrid,
            Self::PointOutsideGrid { .. } => ErrorKind::PointOutsideGrid,
            Self::Processing(_) => ErrorKind::ProcessingError,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the orchestrator may retry the failed operation locally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::Network(_))
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedGrid(msg.into())
    }
}

impl From<std::io::Error> for ExtractionError {
    fn from(err: std::io::Error) -> Self {
        ExtractionError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ExtractionError {
    fn from(err: serde_json::Error) -> Self {
        ExtractionError::Provider(format!("JSON error: {}", err))
    }
}
