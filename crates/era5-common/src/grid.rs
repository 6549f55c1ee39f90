//! Decoded gridded data shared by the decoder and the processors.

use chrono::{DateTime, Utc};

use crate::bbox::BoundingBox;
use crate::error::{ExtractionError, ExtractionResult};
use crate::variables::VariableSpec;

/// ERA5-Land native grid spacing in degrees.
pub const NATIVE_RESOLUTION: f64 = 0.1;

/// Largest deviation of one axis step from the mean step, relative to it.
const SPACING_TOLERANCE: f64 = 0.01;

/// One variable on a regular lat/lon grid over a series of timestamps.
///
/// Latitudes are strictly descending (north first), longitudes strictly
/// ascending, both evenly spaced. Values are stored `[time][lat][lon]` in row-major order and
/// missing cells are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedArray {
    pub variable: VariableSpec,
    pub timestamps: Vec<DateTime<Utc>>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub values: Vec<f32>,
}

impl GriddedArray {
    /// Build an array, checking axis ordering, spacing and value count.
    pub fn new(
        variable: VariableSpec,
        timestamps: Vec<DateTime<Utc>>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        values: Vec<f32>,
    ) -> ExtractionResult<Self> {
        if latitudes.is_empty() || longitudes.is_empty() {
            return Err(ExtractionError::malformed(format!(
                "{}: empty spatial axis",
                variable.internal_code
            )));
        }
        if !latitudes.windows(2).all(|w| w[0] > w[1]) {
            return Err(ExtractionError::malformed(format!(
                "{}: latitudes are not strictly descending",
                variable.internal_code
            )));
        }
        if !longitudes.windows(2).all(|w| w[0] < w[1]) {
            return Err(ExtractionError::malformed(format!(
                "{}: longitudes are not strictly ascending",
                variable.internal_code
            )));
        }
        for (name, axis) in [("latitudes", &latitudes), ("longitudes", &longitudes)] {
            if !is_uniform_axis(axis) {
                return Err(ExtractionError::malformed(format!(
                    "{}: {} are not evenly spaced",
                    variable.internal_code, name
                )));
            }
        }
        let expected = timestamps.len() * latitudes.len() * longitudes.len();
        if values.len() != expected {
            return Err(ExtractionError::malformed(format!(
                "{}: expected {} values, found {}",
                variable.internal_code,
                expected,
                values.len()
            )));
        }

        Ok(Self {
            variable,
            timestamps,
            latitudes,
            longitudes,
            values,
        })
    }

    pub fn n_times(&self) -> usize {
        self.timestamps.len()
    }

    pub fn n_rows(&self) -> usize {
        self.latitudes.len()
    }

    pub fn n_cols(&self) -> usize {
        self.longitudes.len()
    }

    /// Value at `(time, row, col)`, `None` outside the array.
    pub fn get(&self, t: usize, row: usize, col: usize) -> Option<f32> {
        if t >= self.n_times() || row >= self.n_rows() || col >= self.n_cols() {
            return None;
        }
        self.values
            .get((t * self.n_rows() + row) * self.n_cols() + col)
            .copied()
    }

    /// All values of one timestamp, row-major.
    pub fn time_slice(&self, t: usize) -> &[f32] {
        let plane = self.n_rows() * self.n_cols();
        &self.values[t * plane..(t + 1) * plane]
    }

    /// Longitude spacing in degrees.
    pub fn lon_step(&self) -> f64 {
        axis_step(&self.longitudes)
    }

    /// Latitude spacing in degrees (positive).
    pub fn lat_step(&self) -> f64 {
        axis_step(&self.latitudes)
    }

    /// Area covered by the grid, outer cell edges included.
    pub fn coverage(&self) -> BoundingBox {
        let half_lon = self.lon_step() / 2.0;
        let half_lat = self.lat_step() / 2.0;
        BoundingBox::new(
            self.longitudes[0] - half_lon,
            self.latitudes[self.n_rows() - 1] - half_lat,
            self.longitudes[self.n_cols() - 1] + half_lon,
            self.latitudes[0] + half_lat,
        )
    }

    /// Centre `(lon, lat)` of a cell.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (self.longitudes[col], self.latitudes[row])
    }

    /// Footprint of a cell.
    pub fn cell_bounds(&self, row: usize, col: usize) -> BoundingBox {
        let (lon, lat) = self.cell_center(row, col);
        let half_lon = self.lon_step() / 2.0;
        let half_lat = self.lat_step() / 2.0;
        BoundingBox::new(lon - half_lon, lat - half_lat, lon + half_lon, lat + half_lat)
    }

    /// Whether two arrays share axes and timestamps.
    pub fn same_grid(&self, other: &GriddedArray) -> bool {
        self.timestamps == other.timestamps
            && self.latitudes == other.latitudes
            && self.longitudes == other.longitudes
    }

    /// Keep only timestamps accepted by `keep`.
    pub fn retain_times<F>(&mut self, keep: F)
    where
        F: Fn(&DateTime<Utc>) -> bool,
    {
        let plane = self.n_rows() * self.n_cols();
        let mut timestamps = Vec::with_capacity(self.timestamps.len());
        let mut values = Vec::with_capacity(self.values.len());
        for (t, ts) in self.timestamps.iter().enumerate() {
            if keep(ts) {
                timestamps.push(*ts);
                values.extend_from_slice(&self.values[t * plane..(t + 1) * plane]);
            }
        }
        self.timestamps = timestamps;
        self.values = values;
    }
}

fn axis_step(axis: &[f64]) -> f64 {
    if axis.len() < 2 {
        return NATIVE_RESOLUTION;
    }
    ((axis[axis.len() - 1] - axis[0]) / (axis.len() - 1) as f64).abs()
}

/// Whether every step of a monotonic axis matches the mean step.
pub fn is_uniform_axis(axis: &[f64]) -> bool {
    let step = axis_step(axis);
    axis.windows(2)
        .all(|w| ((w[1] - w[0]).abs() - step).abs() <= step * SPACING_TOLERANCE)
}

/// True for the in-memory fill sentinel.
pub fn is_fill(value: f32) -> bool {
    value.is_nan()
}
