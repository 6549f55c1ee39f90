//! Synthetic gridded data with predictable, verifiable values.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use era5_common::{GriddedArray, VariableCodeMapper};

/// Builder for a regular ERA5-like grid.
///
/// Defaults: one timestamp (2024-01-01T00:00Z), 10x10 cells of 0.1° whose
/// north-west cell centre is (10.0, 45.5).
#[derive(Debug, Clone)]
pub struct SyntheticGrid {
    code: String,
    timestamps: Vec<DateTime<Utc>>,
    west: f64,
    north: f64,
    rows: usize,
    cols: usize,
    step: f64,
}

impl SyntheticGrid {
    /// Grid for an internal variable code from the ERA5-Land table.
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            timestamps: vec![Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()],
            west: 10.0,
            north: 45.5,
            rows: 10,
            cols: 10,
            step: 0.1,
        }
    }

    pub fn timestamps(mut self, timestamps: Vec<DateTime<Utc>>) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Centre of the north-west cell.
    pub fn origin(mut self, west: f64, north: f64) -> Self {
        self.west = west;
        self.north = north;
        self
    }

    pub fn shape(mut self, rows: usize, cols: usize) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    pub fn step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    /// Descending cell-centre latitudes.
    pub fn latitudes(&self) -> Vec<f64> {
        (0..self.rows)
            .map(|r| round_coord(self.north - r as f64 * self.step))
            .collect()
    }

    /// Ascending cell-centre longitudes.
    pub fn longitudes(&self) -> Vec<f64> {
        (0..self.cols)
            .map(|c| round_coord(self.west + c as f64 * self.step))
            .collect()
    }

    /// Fill every `(time, row, col)` from a closure.
    pub fn build_with<F>(self, value: F) -> GriddedArray
    where
        F: Fn(usize, usize, usize) -> f32,
    {
        let spec = VariableCodeMapper::era5_land()
            .by_code(&self.code)
            .expect("Unknown variable code in SyntheticGrid");
        let mut values = Vec::with_capacity(self.timestamps.len() * self.rows * self.cols);
        for t in 0..self.timestamps.len() {
            for row in 0..self.rows {
                for col in 0..self.cols {
                    values.push(value(t, row, col));
                }
            }
        }
        let latitudes = self.latitudes();
        let longitudes = self.longitudes();
        GriddedArray::new(spec, self.timestamps, latitudes, longitudes, values)
            .expect("SyntheticGrid produced an invalid array")
    }

    /// Each value encodes its position: `t * 1_000_000 + col * 1000 + row`.
    pub fn indexed(self) -> GriddedArray {
        self.build_with(|t, row, col| (t * 1_000_000 + col * 1000 + row) as f32)
    }

    /// Kelvin values from about 250K (north-west) to 310K (south-east).
    pub fn temperature(self) -> GriddedArray {
        let (rows, cols) = (self.rows.max(1) as f32, self.cols.max(1) as f32);
        self.build_with(move |t, row, col| {
            250.0 + (col as f32 / cols) * 30.0 + (row as f32 / rows) * 30.0 + t as f32
        })
    }

    pub fn constant(self, value: f32) -> GriddedArray {
        self.build_with(move |_, _, _| value)
    }
}

/// Replace the listed `(row, col)` cells with the fill sentinel at every time.
pub fn with_fill_cells(mut array: GriddedArray, cells: &[(usize, usize)]) -> GriddedArray {
    let (rows, cols) = (array.n_rows(), array.n_cols());
    for t in 0..array.n_times() {
        for &(row, col) in cells {
            array.values[(t * rows + row) * cols + col] = f32::NAN;
        }
    }
    array
}

/// Every listed hour of every day from `start`, `days` days long.
pub fn hourly_timestamps(start: NaiveDate, days: u32, hours: &[u8]) -> Vec<DateTime<Utc>> {
    start
        .iter_days()
        .take(days as usize)
        .flat_map(|day| {
            hours.iter().map(move |&h| {
                day.and_hms_opt(h as u32, 0, 0)
                    .expect("hour out of range")
                    .and_utc()
            })
        })
        .collect()
}

fn round_coord(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}
