//! Job identity, lifecycle states and outcomes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use era5_common::{ErrorKind, ExtractionResult};
use grid_processor::{RasterResult, TimeSeriesTable, VectorGridResult};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::download::partial_path;

/// Orchestrator-side job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of one extraction job.
///
/// ```text
/// Queued → Submitted → Polling → Downloading → Processing → Completed
///    └──────────┴──────────┴──────────┴─────────────┴──────→ Failed
///    └──────────┴──────────┴──────────┘                  ──→ Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Submitted,
    Polling,
    Downloading,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Submitted => "submitted",
            Self::Polling => "polling",
            Self::Downloading => "downloading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a completed job produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutput {
    TimeSeries(TimeSeriesTable),
    Raster(RasterResult),
    VectorGrid(VectorGridResult),
}

impl ExtractionOutput {
    /// Write the result files into `dir`.
    pub fn write_to(&self, dir: &Path, start: NaiveDate, end: NaiveDate) -> ExtractionResult<Vec<PathBuf>> {
        let paths = match self {
            Self::TimeSeries(table) => {
                vec![export::write_time_series_file(table, dir, start, end)?]
            }
            Self::Raster(raster) => export::write_raster_files(raster, dir)?,
            Self::VectorGrid(grid) => export::write_vector_grid_files(grid, dir)?,
        };
        Ok(paths)
    }
}

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(Arc<ExtractionOutput>),
    Failed { kind: ErrorKind, message: String },
    Cancelled,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            Self::Completed(_) => JobState::Completed,
            Self::Failed { .. } => JobState::Failed,
            Self::Cancelled => JobState::Cancelled,
        }
    }
}

/// State plus, once terminal, the outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub state: JobState,
    pub outcome: Option<JobOutcome>,
}

impl JobSnapshot {
    pub fn queued() -> Self {
        Self {
            state: JobState::Queued,
            outcome: None,
        }
    }
}

/// A downloaded file owned by one job, deleted (with its `.partial`
/// sibling) when dropped.
#[derive(Debug)]
pub struct ScopedFile {
    path: PathBuf,
}

impl ScopedFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        for path in [self.path.clone(), partial_path(&self.path)] {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed job file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove job file"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Processing.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_scoped_file_removes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.nc");
        std::fs::write(&path, b"CDF").unwrap();
        std::fs::write(partial_path(&path), b"CD").unwrap();

        drop(ScopedFile::new(path.clone()));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn test_scoped_file_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        drop(ScopedFile::new(dir.path().join("never-downloaded.nc")));
    }
}
