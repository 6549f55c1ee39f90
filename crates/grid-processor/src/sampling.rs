//! Nearest-cell sampling of gridded arrays at point locations.

use era5_common::{is_fill, GriddedArray, PointFeature};
use tracing::{debug, warn};

use crate::config::ProcessingConfig;
use crate::error::{GridProcessorError, Result};
use crate::types::{SkippedPoint, TimeSeriesRow, TimeSeriesTable};
use crate::window::reference_grid;

/// Samples every array at every point, one row per (point, timestamp).
#[derive(Debug, Clone, Default)]
pub struct PointSampler {
    config: ProcessingConfig,
}

impl PointSampler {
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    /// Build the time-series table. Points outside the grid are skipped
    /// unless `fail_on_point_outside` is set.
    pub fn sample(&self, arrays: &[GriddedArray], points: &[PointFeature]) -> Result<TimeSeriesTable> {
        let grid = reference_grid(arrays)?;
        let coverage = grid.coverage();

        let mut table = TimeSeriesTable {
            variables: arrays.iter().map(|a| a.variable).collect(),
            attribute_columns: attribute_columns(points),
            rows: Vec::with_capacity(points.len() * grid.n_times()),
            skipped: Vec::new(),
        };

        for (point_index, point) in points.iter().enumerate() {
            if !point.lon.is_finite() || !point.lat.is_finite() || !coverage.contains(point.lon, point.lat) {
                if self.config.fail_on_point_outside {
                    return Err(GridProcessorError::PointOutsideGrid {
                        lon: point.lon,
                        lat: point.lat,
                    });
                }
                warn!(
                    point_index,
                    lon = point.lon,
                    lat = point.lat,
                    "Point outside grid coverage, skipping"
                );
                table.skipped.push(SkippedPoint {
                    point_index,
                    lon: point.lon,
                    lat: point.lat,
                    reason: "outside grid coverage".to_string(),
                });
                continue;
            }

            let row = nearest_index(&grid.latitudes, point.lat);
            let col = nearest_index(&grid.longitudes, point.lon);
            let (cell_lon, cell_lat) = grid.cell_center(row, col);

            for (t, time) in grid.timestamps.iter().enumerate() {
                let values = arrays
                    .iter()
                    .map(|a| a.get(t, row, col).filter(|v| !is_fill(*v)))
                    .collect();
                table.rows.push(TimeSeriesRow {
                    point_index,
                    time: *time,
                    latitude: cell_lat,
                    longitude: cell_lon,
                    attributes: point.attributes.clone(),
                    values,
                });
            }
        }

        debug!(
            points = points.len(),
            rows = table.rows.len(),
            skipped = table.skipped.len(),
            "Sampled points"
        );
        Ok(table)
    }
}

/// Index of the closest axis value; ties go to the lower index.
pub fn nearest_index(axis: &[f64], value: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &v) in axis.iter().enumerate() {
        let dist = (v - value).abs();
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

fn attribute_columns(points: &[PointFeature]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for key in points.iter().flat_map(|p| p.attributes.keys()) {
        if !columns.iter().any(|c| c == key) {
            columns.push(key.clone());
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{with_fill_cells, SyntheticGrid};

    #[test]
    fn test_nearest_cell() {
        let grid = SyntheticGrid::new("t2m").indexed();
        let sampler = PointSampler::default();
        // closest centre is (10.3, 45.2): col 3, row 3
        let table = sampler
            .sample(&[grid], &[PointFeature::new(10.33, 45.17)])
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].values, vec![Some(3003.0)]);
        assert_eq!(table.rows[0].longitude, 10.3);
        assert_eq!(table.rows[0].latitude, 45.2);
    }

    #[test]
    fn test_fill_becomes_none() {
        let grid = with_fill_cells(SyntheticGrid::new("t2m").indexed(), &[(0, 0)]);
        let table = PointSampler::default()
            .sample(&[grid], &[PointFeature::new(10.0, 45.5)])
            .unwrap();
        assert_eq!(table.rows[0].values, vec![None]);
    }

    #[test]
    fn test_outside_point_is_row_local_by_default() {
        let grid = SyntheticGrid::new("t2m").indexed();
        let points = vec![PointFeature::new(30.0, 10.0), PointFeature::new(10.0, 45.5)];
        let table = PointSampler::default().sample(&[grid], &points).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].point_index, 1);
        assert_eq!(table.skipped[0].point_index, 0);
    }

    #[test]
    fn test_outside_point_can_be_fatal() {
        let grid = SyntheticGrid::new("t2m").indexed();
        let sampler = PointSampler::new(ProcessingConfig {
            fail_on_point_outside: true,
            ..Default::default()
        });
        let err = sampler
            .sample(&[grid], &[PointFeature::new(30.0, 10.0)])
            .unwrap_err();
        assert_eq!(err, GridProcessorError::PointOutsideGrid { lon: 30.0, lat: 10.0 });
    }

    #[test]
    fn test_nearest_index_tie_goes_low() {
        assert_eq!(nearest_index(&[0.0, 1.0, 2.0], 0.5), 0);
        assert_eq!(nearest_index(&[2.0, 1.0, 0.0], 1.4), 1);
    }
}
