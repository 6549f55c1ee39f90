//! Error types for grid processing.

use era5_common::ExtractionError;
use thiserror::Error;

/// Errors that can occur while sampling, clipping or gridding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridProcessorError {
    /// A point lies outside the grid coverage.
    #[error("point ({lon}, {lat}) is outside grid coverage")]
    PointOutsideGrid { lon: f64, lat: f64 },

    /// No input arrays or no features were supplied.
    #[error("nothing to process: {0}")]
    EmptyInput(String),

    /// Arrays of one request do not share axes.
    #[error("grid mismatch: {0}")]
    GridMismatch(String),

    /// The target geometry does not overlap the grid.
    #[error("geometry does not overlap the grid: {0}")]
    NoOverlap(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl GridProcessorError {
    pub fn grid_mismatch(msg: impl Into<String>) -> Self {
        Self::GridMismatch(msg.into())
    }

    pub fn empty_input(msg: impl Into<String>) -> Self {
        Self::EmptyInput(msg.into())
    }
}

impl From<GridProcessorError> for ExtractionError {
    fn from(err: GridProcessorError) -> Self {
        match err {
            GridProcessorError::PointOutsideGrid { lon, lat } => {
                ExtractionError::PointOutsideGrid { lon, lat }
            }
            GridProcessorError::GridMismatch(msg) => ExtractionError::MalformedGrid(msg),
            other => ExtractionError::Processing(other.to_string()),
        }
    }
}

/// Result type for grid processor operations.
pub type Result<T> = std::result::Result<T, GridProcessorError>;
