//! File-level tests for the three result writers.

use chrono::NaiveDate;
use era5_common::AreaFeature;
use export::{write_raster_files, write_time_series_file, write_vector_grid_files, FeatureCollection};
use grid_processor::{GeometryClipMasker, PointSampler, VectorGridGenerator};
use test_utils::{hourly_timestamps, named_point, SyntheticGrid};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn grids() -> Vec<era5_common::GriddedArray> {
    let times = hourly_timestamps(day(1), 2, &[6, 18]);
    vec![
        SyntheticGrid::new("t2m").timestamps(times.clone()).temperature(),
        SyntheticGrid::new("tp").timestamps(times).constant(0.002),
    ]
}

#[test]
fn test_csv_file_has_one_row_per_point_and_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let points = vec![
        named_point("a", (10.21, 45.33)),
        named_point("b", (10.77, 44.81)),
    ];
    let table = PointSampler::default().sample(&grids(), &points).unwrap();

    let path = write_time_series_file(&table, dir.path(), day(1), day(2)).unwrap();
    assert!(path.ends_with("era5_results_2024-01-01_to_2024-01-02.csv"));

    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "name,point_index,time,latitude,longitude,2m_temperature,total_precipitation"
    );
    assert_eq!(lines.count(), 2 * 4);
}

#[test]
fn test_one_geotiff_per_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let polygon = AreaFeature::rectangle(10.22, 44.92, 10.58, 45.28);
    let raster = GeometryClipMasker::default().clip(&grids(), &[polygon]).unwrap();

    let paths = write_raster_files(&raster, dir.path()).unwrap();
    let names: Vec<String> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "era5_20240101_0600.tif",
            "era5_20240101_1800.tif",
            "era5_20240102_0600.tif",
            "era5_20240102_1800.tif",
        ]
    );
}

#[test]
fn test_one_geojson_per_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let polygon = AreaFeature::rectangle(10.22, 44.92, 10.58, 45.28);
    let grid = VectorGridGenerator::default().generate(&grids(), &[polygon]).unwrap();

    let paths = write_vector_grid_files(&grid, dir.path()).unwrap();
    assert_eq!(paths.len(), 4);

    let text = std::fs::read_to_string(&paths[3]).unwrap();
    let collection: FeatureCollection = serde_json::from_str(&text).unwrap();
    assert_eq!(collection.features.len(), grid.cells.len());
    let props = &collection.features[0].properties;
    assert_eq!(props["time"], "2024-01-02T18:00:00Z");
    assert!(props.contains_key("total_precipitation"));
    assert!(props.contains_key("intersection_fraction"));
}
