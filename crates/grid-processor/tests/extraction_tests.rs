//! Cross-processor tests on synthetic ERA5-Land grids.

use chrono::NaiveDate;
use era5_common::{AreaFeature, PointFeature};
use grid_processor::{
    GeometryClipMasker, PointSampler, ProcessingConfig, TargetGeometry, VectorGridGenerator,
};
use test_utils::{assert_approx_eq, cell_aligned_rectangle, hourly_timestamps, named_point, SyntheticGrid};

fn three_day_grid(code: &str) -> era5_common::GriddedArray {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    SyntheticGrid::new(code)
        .timestamps(hourly_timestamps(start, 3, &[0, 12]))
        .temperature()
}

// ============================================================================
// Point sampling
// ============================================================================

#[test]
fn test_one_point_two_hours_three_days_gives_six_rows() {
    let grid = three_day_grid("t2m");
    let point = named_point("station", (10.42, 45.18));

    let table = PointSampler::default().sample(&[grid], &[point]).unwrap();

    assert_eq!(table.len(), 6);
    assert_eq!(table.variables[0].display_name, "2m_temperature");
    assert_eq!(table.attribute_columns, vec!["name"]);
    assert!(table.rows.iter().all(|r| r.values[0].is_some()));
    assert!(table.rows.windows(2).all(|w| w[0].time < w[1].time));
}

#[test]
fn test_sampling_is_deterministic() {
    let grids = vec![three_day_grid("t2m"), three_day_grid("skt")];
    let points: Vec<PointFeature> = (0..5)
        .map(|i| PointFeature::new(10.03 + i as f64 * 0.17, 45.48 - i as f64 * 0.13))
        .collect();

    let sampler = PointSampler::default();
    let first = sampler.sample(&grids, &points).unwrap();
    let second = sampler.sample(&grids, &points).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 5 * 6);
}

#[test]
fn test_sampled_cell_is_nearest() {
    let grid = SyntheticGrid::new("t2m").indexed();
    let points: Vec<PointFeature> = [(10.049, 45.451), (10.651, 44.749), (10.9, 44.6)]
        .iter()
        .map(|&(lon, lat)| PointFeature::new(lon, lat))
        .collect();

    let table = PointSampler::default().sample(&[grid.clone()], &points).unwrap();
    for (row, point) in table.rows.iter().zip(&points) {
        let dlon = (row.longitude - point.lon).abs();
        let dlat = (row.latitude - point.lat).abs();
        assert!(dlon <= grid.lon_step() / 2.0 + 1e-9);
        assert!(dlat <= grid.lat_step() / 2.0 + 1e-9);
    }
}

// ============================================================================
// Clipping
// ============================================================================

#[test]
fn test_clip_keeps_exactly_cells_with_centre_inside() {
    let grid = SyntheticGrid::new("t2m").indexed();
    let polygon = AreaFeature::new(vec![
        (10.12, 45.12),
        (10.68, 45.16),
        (10.44, 45.47),
        (10.12, 45.12),
    ]);

    let raster = GeometryClipMasker::default()
        .clip(&[grid.clone()], &[polygon.clone()])
        .unwrap();
    let target = TargetGeometry::from_features(&[polygon]).unwrap();

    let expected = raster
        .window
        .cells()
        .filter(|&(row, col)| {
            let (lon, lat) = grid.cell_center(row, col);
            target.contains_point(lon, lat, ProcessingConfig::default().boundary)
        })
        .count();
    let kept = raster.layers[0].bands[0]
        .values
        .iter()
        .filter(|v| !v.is_nan())
        .count();

    assert_eq!(kept, expected);
    assert_eq!(kept, raster.inside_cells);
    assert!(kept > 0);
}

#[test]
fn test_clip_one_band_per_variable_per_timestamp() {
    let grids = vec![three_day_grid("t2m"), three_day_grid("d2m")];
    let square = cell_aligned_rectangle(&grids[0], 0, 0, 2, 2);

    let raster = GeometryClipMasker::default().clip(&grids, &[square]).unwrap();
    assert_eq!(raster.layers.len(), 6);
    assert!(raster.layers.iter().all(|l| l.bands.len() == 2));
    assert_eq!(raster.layers[0].bands[1].variable.display_name, "2m_dewpoint_temperature");
}

// ============================================================================
// Vector grid
// ============================================================================

#[test]
fn test_polygon_covering_four_cells() {
    let grid = three_day_grid("t2m");
    let square = cell_aligned_rectangle(&grid, 4, 4, 2, 2);

    let result = VectorGridGenerator::default().generate(&[grid], &[square]).unwrap();

    assert_eq!(result.cells.len(), 4);
    assert!(result.cells.iter().all(|c| c.intersection_fraction == 1.0));
    assert!(result.cells.iter().all(|c| c.values.len() == 6));
}

#[test]
fn test_two_disjoint_polygons_are_unioned() {
    let grid = SyntheticGrid::new("t2m").indexed();
    let a = cell_aligned_rectangle(&grid, 0, 0, 1, 1);
    let b = cell_aligned_rectangle(&grid, 5, 5, 1, 2);

    let result = VectorGridGenerator::default().generate(&[grid], &[a, b]).unwrap();
    assert_eq!(result.cells.len(), 3);
    let total: f64 = result.cells.iter().map(|c| c.intersection_fraction).sum();
    assert_approx_eq!(total, 3.0, 1e-6);
}
