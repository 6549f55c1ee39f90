//! Core types for grid processing.

use chrono::{DateTime, Utc};
use era5_common::{Attributes, BoundingBox, GriddedArray, VariableSpec};
use serde::Serialize;

/// A grid cell derived from the array axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    /// Centre as `(lon, lat)`.
    pub center: (f64, f64),
    pub footprint: BoundingBox,
}

impl GridCell {
    pub fn of(grid: &GriddedArray, row: usize, col: usize) -> Self {
        Self {
            row,
            col,
            center: grid.cell_center(row, col),
            footprint: grid.cell_bounds(row, col),
        }
    }
}

/// Half-open range of rows and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellWindow {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl CellWindow {
    pub fn rows(&self) -> usize {
        self.row_end - self.row_start
    }

    pub fn cols(&self) -> usize {
        self.col_end - self.col_start
    }

    pub fn len(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(row, col)` pairs in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.row_start..self.row_end)
            .flat_map(move |row| (self.col_start..self.col_end).map(move |col| (row, col)))
    }
}

// ============================================================================
// Point sampling
// ============================================================================

/// One sampled row: a point at a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRow {
    /// Position of the point in the input.
    pub point_index: usize,
    pub time: DateTime<Utc>,
    /// Centre of the sampled cell.
    pub latitude: f64,
    pub longitude: f64,
    pub attributes: Attributes,
    /// One entry per table variable, `None` for fill.
    pub values: Vec<Option<f32>>,
}

/// A point that produced no rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPoint {
    pub point_index: usize,
    pub lon: f64,
    pub lat: f64,
    pub reason: String,
}

/// Rows for every (point, timestamp) pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeriesTable {
    pub variables: Vec<VariableSpec>,
    /// Attribute keys across all points, in first-seen order.
    pub attribute_columns: Vec<String>,
    pub rows: Vec<TimeSeriesRow>,
    pub skipped: Vec<SkippedPoint>,
}

impl TimeSeriesTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// Raster clipping
// ============================================================================

/// One band of a raster layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBand {
    pub variable: VariableSpec,
    /// Row-major, north first; masked cells are `NaN`.
    pub values: Vec<f32>,
}

/// All variables at one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pub time: DateTime<Utc>,
    pub bands: Vec<RasterBand>,
}

/// Clipped raster over the minimal cell window.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterResult {
    pub width: usize,
    pub height: usize,
    /// Western edge of the first column.
    pub west: f64,
    /// Northern edge of the first row.
    pub north: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    /// Window position inside the source grid.
    pub window: CellWindow,
    /// Cells kept by the mask.
    pub inside_cells: usize,
    pub layers: Vec<RasterLayer>,
}

// ============================================================================
// Vector grid
// ============================================================================

/// One polygon of a cell geometry, as `(lon, lat)` rings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellPolygon {
    pub exterior: Vec<(f64, f64)>,
    pub holes: Vec<Vec<(f64, f64)>>,
}

/// A retained grid cell with its values.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorCell {
    pub row: usize,
    pub col: usize,
    /// Centre as `(lon, lat)`.
    pub center: (f64, f64),
    /// Usually one polygon; an intersection can split a cell.
    pub geometry: Vec<CellPolygon>,
    /// Share of the cell footprint inside the target, `(0, 1]`.
    pub intersection_fraction: f64,
    /// `values[t][v]`, `None` for fill.
    pub values: Vec<Vec<Option<f32>>>,
}

/// Cells intersecting the target geometry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VectorGridResult {
    pub variables: Vec<VariableSpec>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub cells: Vec<VectorCell>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_iteration() {
        let window = CellWindow {
            row_start: 1,
            row_end: 3,
            col_start: 4,
            col_end: 6,
        };
        let cells: Vec<_> = window.cells().collect();
        assert_eq!(cells, vec![(1, 4), (1, 5), (2, 4), (2, 5)]);
        assert_eq!(window.len(), 4);
        assert!(!window.is_empty());
    }
}
