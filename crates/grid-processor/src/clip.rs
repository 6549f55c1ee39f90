//! Clip gridded arrays to a polygon set, producing one raster per timestamp.

use era5_common::{AreaFeature, GriddedArray};
use rayon::prelude::*;
use tracing::debug;

use crate::config::{ClipTest, ProcessingConfig};
use crate::error::{GridProcessorError, Result};
use crate::target::TargetGeometry;
use crate::types::{GridCell, RasterBand, RasterLayer, RasterResult};
use crate::window::{candidate_window, reference_grid};

/// Masks cells outside the target polygons and crops to the minimal window.
#[derive(Debug, Clone, Default)]
pub struct GeometryClipMasker {
    config: ProcessingConfig,
}

impl GeometryClipMasker {
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    pub fn clip(&self, arrays: &[GriddedArray], polygons: &[AreaFeature]) -> Result<RasterResult> {
        let grid = reference_grid(arrays)?;
        let target = TargetGeometry::from_features(polygons)?;
        let window = candidate_window(grid, target.bbox()).ok_or_else(|| {
            GridProcessorError::NoOverlap(format!("{:?}", target.bbox()))
        })?;

        let mask: Vec<bool> = window
            .cells()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|&(row, col)| self.is_inside(&target, &GridCell::of(grid, row, col)))
            .collect();
        let inside_cells = mask.iter().filter(|m| **m).count();

        let layers = grid
            .timestamps
            .iter()
            .enumerate()
            .map(|(t, time)| RasterLayer {
                time: *time,
                bands: arrays
                    .iter()
                    .map(|array| RasterBand {
                        variable: array.variable,
                        values: window
                            .cells()
                            .zip(&mask)
                            .map(|((row, col), &inside)| {
                                if inside {
                                    array.get(t, row, col).unwrap_or(f32::NAN)
                                } else {
                                    f32::NAN
                                }
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        let top_left = grid.cell_bounds(window.row_start, window.col_start);
        debug!(
            rows = window.rows(),
            cols = window.cols(),
            inside_cells,
            "Clipped grid to polygon"
        );

        Ok(RasterResult {
            width: window.cols(),
            height: window.rows(),
            west: top_left.min_lon,
            north: top_left.max_lat,
            pixel_width: grid.lon_step(),
            pixel_height: grid.lat_step(),
            window,
            inside_cells,
            layers,
        })
    }

    fn is_inside(&self, target: &TargetGeometry, cell: &GridCell) -> bool {
        match self.config.clip_test {
            ClipTest::Center => target.contains_point(cell.center.0, cell.center.1, self.config.boundary),
            ClipTest::Footprint => {
                target.touches(&cell.footprint, self.config.boundary, self.config.zero_area_epsilon)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoundaryPolicy;
    use test_utils::{assert_approx_eq, cell_aligned_rectangle, SyntheticGrid};

    #[test]
    fn test_aligned_square_keeps_inner_cells() {
        let grid = SyntheticGrid::new("t2m").indexed();
        let square = cell_aligned_rectangle(&grid, 2, 3, 3, 2);
        let raster = GeometryClipMasker::default().clip(&[grid], &[square]).unwrap();

        assert_eq!((raster.width, raster.height), (2, 3));
        assert_eq!(raster.inside_cells, 6);
        let band = &raster.layers[0].bands[0];
        assert_eq!(band.values[0], 3002.0);
        assert!(band.values.iter().all(|v| !v.is_nan()));
        assert_approx_eq!(raster.west, 10.25, 1e-9);
        assert_approx_eq!(raster.north, 45.35, 1e-9);
    }

    #[test]
    fn test_triangle_masks_corner_cells() {
        let grid = SyntheticGrid::new("t2m").indexed();
        // right triangle over a 2x2 block, hypotenuse from south-east to north-west
        let tri = AreaFeature::new(vec![
            (10.25, 45.15),
            (10.45, 45.15),
            (10.25, 45.35),
            (10.25, 45.15),
        ]);
        let raster = GeometryClipMasker::default().clip(&[grid], &[tri]).unwrap();
        assert_eq!((raster.width, raster.height), (2, 2));
        let band = &raster.layers[0].bands[0];
        assert!(band.values[1].is_nan());
        assert!(!band.values[2].is_nan());
    }

    #[test]
    fn test_open_boundary_excludes_centre_on_edge() {
        let grid = SyntheticGrid::new("t2m").indexed();
        // west edge runs through the centres of column 3
        let rect = AreaFeature::rectangle(10.3, 45.15, 10.45, 45.35);
        let closed = GeometryClipMasker::default()
            .clip(&[grid.clone()], &[rect.clone()])
            .unwrap();
        let open = GeometryClipMasker::new(ProcessingConfig {
            boundary: BoundaryPolicy::Open,
            ..Default::default()
        })
        .clip(&[grid], &[rect])
        .unwrap();
        assert!(open.inside_cells < closed.inside_cells);
    }

    #[test]
    fn test_polygon_outside_grid() {
        let grid = SyntheticGrid::new("t2m").indexed();
        let far = AreaFeature::rectangle(50.0, 0.0, 51.0, 1.0);
        assert!(matches!(
            GeometryClipMasker::default().clip(&[grid], &[far]),
            Err(GridProcessorError::NoOverlap(_))
        ));
    }
}
