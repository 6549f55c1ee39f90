//! Candidate cell selection shared by the clip masker and the vector grid.

use era5_common::{BoundingBox, GriddedArray};

use crate::error::{GridProcessorError, Result};
use crate::types::CellWindow;

/// Slack for comparing cell edges against bbox edges.
const EDGE_EPSILON: f64 = 1e-9;

/// Smallest window of cells whose footprints overlap `bbox`.
///
/// Cells that only touch the bbox along an edge are left out, except when
/// the bbox is degenerate along that axis.
pub fn candidate_window(grid: &GriddedArray, bbox: &BoundingBox) -> Option<CellWindow> {
    let half_lat = grid.lat_step() / 2.0;
    let half_lon = grid.lon_step() / 2.0;

    let rows = axis_range(&grid.latitudes, half_lat, bbox.min_lat, bbox.max_lat)?;
    let cols = axis_range(&grid.longitudes, half_lon, bbox.min_lon, bbox.max_lon)?;

    Some(CellWindow {
        row_start: rows.0,
        row_end: rows.1,
        col_start: cols.0,
        col_end: cols.1,
    })
}

/// First and one-past-last index of cells overlapping `[min, max]`.
fn axis_range(centers: &[f64], half: f64, min: f64, max: f64) -> Option<(usize, usize)> {
    let degenerate = (max - min).abs() <= EDGE_EPSILON;
    let overlaps = |c: f64| {
        let (lo, hi) = (c - half, c + half);
        if degenerate {
            lo <= max + EDGE_EPSILON && hi >= min - EDGE_EPSILON
        } else {
            lo < max - EDGE_EPSILON && hi > min + EDGE_EPSILON
        }
    };

    let start = centers.iter().position(|&c| overlaps(c))?;
    let end = centers.iter().rposition(|&c| overlaps(c))? + 1;
    Some((start, end))
}

/// Check that all arrays of a request share one grid and return the first.
pub fn reference_grid(arrays: &[GriddedArray]) -> Result<&GriddedArray> {
    let first = arrays
        .first()
        .ok_or_else(|| GridProcessorError::empty_input("no gridded arrays"))?;
    if let Some(other) = arrays.iter().find(|a| !first.same_grid(a)) {
        return Err(GridProcessorError::grid_mismatch(format!(
            "{} and {} do not share axes",
            first.variable.internal_code, other.variable.internal_code
        )));
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::SyntheticGrid;

    #[test]
    fn test_aligned_bbox_selects_exact_cells() {
        // cell centres 10.0..10.9 / 45.5..44.6
        let grid = SyntheticGrid::new("t2m").indexed();
        let bbox = BoundingBox::new(10.15, 45.15, 10.35, 45.35);
        let window = candidate_window(&grid, &bbox).unwrap();
        assert_eq!((window.row_start, window.row_end), (2, 4));
        assert_eq!((window.col_start, window.col_end), (2, 4));
    }

    #[test]
    fn test_partial_overlap_widens_window() {
        let grid = SyntheticGrid::new("t2m").indexed();
        let bbox = BoundingBox::new(10.12, 45.32, 10.18, 45.38);
        let window = candidate_window(&grid, &bbox).unwrap();
        assert_eq!(window.len(), 4);
    }

    #[test]
    fn test_outside_bbox_has_no_window() {
        let grid = SyntheticGrid::new("t2m").indexed();
        let bbox = BoundingBox::new(20.0, 45.0, 21.0, 46.0);
        assert!(candidate_window(&grid, &bbox).is_none());
    }

    #[test]
    fn test_reference_grid_mismatch() {
        let a = SyntheticGrid::new("t2m").indexed();
        let b = SyntheticGrid::new("tp").shape(5, 5).indexed();
        assert!(matches!(
            reference_grid(&[a, b]),
            Err(GridProcessorError::GridMismatch(_))
        ));
        assert!(reference_grid(&[]).is_err());
    }
}
