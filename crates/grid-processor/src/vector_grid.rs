//! Per-cell polygons of the grid intersected with the target geometry.

use era5_common::{is_fill, AreaFeature, GriddedArray};
use rayon::prelude::*;
use tracing::debug;

use crate::config::{FootprintMode, ProcessingConfig};
use crate::error::Result;
use crate::target::{rect_polygon, to_cell_polygons, TargetGeometry};
use crate::types::{GridCell, VectorCell, VectorGridResult};
use crate::window::{candidate_window, reference_grid};

/// Emits every cell whose footprint overlaps the target with positive area.
#[derive(Debug, Clone, Default)]
pub struct VectorGridGenerator {
    config: ProcessingConfig,
}

impl VectorGridGenerator {
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    pub fn generate(
        &self,
        arrays: &[GriddedArray],
        polygons: &[AreaFeature],
    ) -> Result<VectorGridResult> {
        let grid = reference_grid(arrays)?;
        let target = TargetGeometry::from_features(polygons)?;

        let mut result = VectorGridResult {
            variables: arrays.iter().map(|a| a.variable).collect(),
            timestamps: grid.timestamps.clone(),
            cells: Vec::new(),
        };
        let Some(window) = candidate_window(grid, target.bbox()) else {
            debug!("Target does not overlap grid, no cells");
            return Ok(result);
        };

        let candidates: Vec<(usize, usize)> = window.cells().collect();
        result.cells = candidates
            .par_iter()
            .filter_map(|&(row, col)| self.build_cell(arrays, &target, GridCell::of(grid, row, col)))
            .collect();

        debug!(
            candidates = candidates.len(),
            retained = result.cells.len(),
            "Generated vector grid"
        );
        Ok(result)
    }

    fn build_cell(
        &self,
        arrays: &[GriddedArray],
        target: &TargetGeometry,
        cell: GridCell,
    ) -> Option<VectorCell> {
        let overlap = target.overlap(&cell.footprint);
        if overlap.fraction <= self.config.zero_area_epsilon {
            return None;
        }

        let geometry = match self.config.footprint {
            FootprintMode::Rectangle => {
                to_cell_polygons(&geo::MultiPolygon::new(vec![rect_polygon(&cell.footprint)]))
            }
            FootprintMode::Intersection => to_cell_polygons(&overlap.shape),
        };

        let n_times = arrays.first().map(|a| a.n_times()).unwrap_or(0);
        let values = (0..n_times)
            .map(|t| {
                arrays
                    .iter()
                    .map(|a| a.get(t, cell.row, cell.col).filter(|v| !is_fill(*v)))
                    .collect()
            })
            .collect();

        Some(VectorCell {
            row: cell.row,
            col: cell.col,
            center: cell.center,
            geometry,
            intersection_fraction: overlap.fraction,
            values,
        })
    }
}
