//! Error types for NetCDF decoding.

use era5_common::ExtractionError;
use thiserror::Error;

/// Result type for NetCDF parser operations.
pub type NetCdfResult<T> = Result<T, NetCdfError>;

/// Error types for NetCDF decoding.
#[derive(Error, Debug)]
pub enum NetCdfError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The file could not be opened or read as NetCDF
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Missing required variable, dimension or attribute
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Axes or variables violate the expected grid layout
    #[error("Malformed grid: {0}")]
    Malformed(String),

    /// Time axis units or values cannot be interpreted
    #[error("Invalid time axis: {0}")]
    InvalidTime(String),
}

impl NetCdfError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn missing(msg: impl Into<String>) -> Self {
        Self::MissingData(msg.into())
    }
}

impl From<NetCdfError> for ExtractionError {
    fn from(err: NetCdfError) -> Self {
        match err {
            NetCdfError::IoError(e) => ExtractionError::Io(e.to_string()),
            other => ExtractionError::MalformedGrid(other.to_string()),
        }
    }
}
