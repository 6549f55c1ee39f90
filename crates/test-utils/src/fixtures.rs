//! Common inputs for extraction tests.

use era5_common::{AreaFeature, GriddedArray, PointFeature};

/// Well-known places inside ERA5-Land land coverage, as `(lon, lat)`.
pub mod places {
    pub const ROME: (f64, f64) = (12.5, 41.9);
    pub const BOLOGNA: (f64, f64) = (11.34, 44.49);
    pub const INNSBRUCK: (f64, f64) = (11.4, 47.27);
}

/// A point feature carrying a `name` attribute.
pub fn named_point(name: &str, (lon, lat): (f64, f64)) -> PointFeature {
    PointFeature::new(lon, lat).with_attribute("name", name)
}

/// Rectangle whose edges lie exactly on cell boundaries of `grid`, covering
/// `rows x cols` cells starting at `(row, col)`.
pub fn cell_aligned_rectangle(
    grid: &GriddedArray,
    row: usize,
    col: usize,
    rows: usize,
    cols: usize,
) -> AreaFeature {
    let top_left = grid.cell_bounds(row, col);
    let bottom_right = grid.cell_bounds(row + rows - 1, col + cols - 1);
    AreaFeature::rectangle(
        top_left.min_lon,
        bottom_right.min_lat,
        bottom_right.max_lon,
        top_left.max_lat,
    )
}
