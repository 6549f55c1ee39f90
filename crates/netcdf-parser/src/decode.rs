//! Turn a [`RawDataset`] into validated [`GriddedArray`]s.
//!
//! Output axes follow one convention regardless of how the file stores them:
//! latitudes descending, longitudes ascending in `-180..180`, time ascending.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use era5_common::{is_uniform_axis, GriddedArray, VariableSpec};
use tracing::{debug, warn};

use crate::dataset::{RawAxis, RawDataset, RawVariable};
use crate::error::{NetCdfError, NetCdfResult};

/// Time axis names, current CDS output first.
pub const TIME_AXIS_NAMES: [&str; 2] = ["valid_time", "time"];
pub const LATITUDE_AXIS_NAMES: [&str; 2] = ["latitude", "lat"];
pub const LONGITUDE_AXIS_NAMES: [&str; 2] = ["longitude", "lon"];

/// Decode every requested variable from `raw`, in request order.
pub fn decode_dataset(
    raw: &RawDataset,
    variables: &[VariableSpec],
) -> NetCdfResult<Vec<GriddedArray>> {
    let time_axis = raw
        .time
        .as_ref()
        .ok_or_else(|| NetCdfError::missing("time axis (valid_time or time)"))?;
    let lat_axis = raw
        .latitude
        .as_ref()
        .ok_or_else(|| NetCdfError::missing("latitude axis"))?;
    let lon_axis = raw
        .longitude
        .as_ref()
        .ok_or_else(|| NetCdfError::missing("longitude axis"))?;

    let units = time_axis
        .units
        .as_deref()
        .ok_or_else(|| NetCdfError::missing(format!("units attribute on {}", time_axis.name)))?;
    let timestamps = parse_cf_time(units, &time_axis.values)?;
    if !timestamps.windows(2).all(|w| w[0] < w[1]) {
        return Err(NetCdfError::malformed("time axis is not strictly increasing"));
    }

    let lat = LatitudeOrder::from_axis(lat_axis)?;
    let lon = LongitudeOrder::from_axis(lon_axis)?;

    debug!(
        times = timestamps.len(),
        rows = lat.values.len(),
        cols = lon.values.len(),
        flipped = lat.flipped,
        "Decoding NetCDF grid"
    );

    variables
        .iter()
        .map(|spec| {
            let var = find_variable(raw, spec)?;
            check_layout(var, time_axis, lat_axis, lon_axis)?;
            if let Some(units) = var.units.as_deref() {
                if units != spec.unit {
                    warn!(
                        variable = spec.display_name,
                        file_units = units,
                        expected_units = spec.unit,
                        "Unit mismatch, keeping file values as-is"
                    );
                }
            }

            let values = reorder(var, timestamps.len(), &lat, &lon);
            GriddedArray::new(
                *spec,
                timestamps.clone(),
                lat.values.clone(),
                lon.values.clone(),
                values,
            )
            .map_err(|e| NetCdfError::malformed(e.to_string()))
        })
        .collect()
}

/// Look a variable up by internal code, falling back to its display name.
fn find_variable<'a>(raw: &'a RawDataset, spec: &VariableSpec) -> NetCdfResult<&'a RawVariable> {
    raw.variable(spec.internal_code)
        .or_else(|| raw.variable(spec.display_name))
        .ok_or_else(|| {
            NetCdfError::malformed(format!(
                "variable set mismatch: '{}' ({}) not present in file",
                spec.internal_code, spec.display_name
            ))
        })
}

/// Check that a variable is `[time, lat, lon]` once singleton extras are dropped.
fn check_layout(
    var: &RawVariable,
    time: &RawAxis,
    lat: &RawAxis,
    lon: &RawAxis,
) -> NetCdfResult<()> {
    let axis_names = [time.name.as_str(), lat.name.as_str(), lon.name.as_str()];
    let mut kept = Vec::with_capacity(3);
    for dim in &var.dimensions {
        if axis_names.contains(&dim.name.as_str()) {
            kept.push(dim);
        } else if dim.len != 1 {
            return Err(NetCdfError::malformed(format!(
                "{}: unexpected dimension '{}' of length {}",
                var.name, dim.name, dim.len
            )));
        }
    }

    let names: Vec<&str> = kept.iter().map(|d| d.name.as_str()).collect();
    let expected: &[&str] = if names.len() == 2 && time.values.len() == 1 {
        &axis_names[1..]
    } else {
        &axis_names
    };
    if names != expected {
        return Err(NetCdfError::malformed(format!(
            "{}: dimensions {:?}, expected {:?}",
            var.name, names, expected
        )));
    }

    let lengths = [time.values.len(), lat.values.len(), lon.values.len()];
    let lengths = &lengths[3 - expected.len()..];
    for (dim, len) in kept.iter().zip(lengths) {
        if dim.len != *len {
            return Err(NetCdfError::malformed(format!(
                "{}: dimension '{}' has length {}, axis has {}",
                var.name, dim.name, dim.len, len
            )));
        }
    }

    let expected_len: usize = lengths.iter().product();
    if var.data.len() != expected_len {
        return Err(NetCdfError::malformed(format!(
            "{}: {} values for shape {:?}",
            var.name,
            var.data.len(),
            lengths
        )));
    }
    Ok(())
}

fn reorder(
    var: &RawVariable,
    n_times: usize,
    lat: &LatitudeOrder,
    lon: &LongitudeOrder,
) -> Vec<f32> {
    let rows = lat.values.len();
    let cols = lon.values.len();
    let mut out = Vec::with_capacity(n_times * rows * cols);
    for t in 0..n_times {
        for row in 0..rows {
            let src_row = if lat.flipped { rows - 1 - row } else { row };
            for &src_col in &lon.source_index {
                out.push(var.unpack(var.data[(t * rows + src_row) * cols + src_col]));
            }
        }
    }
    out
}

struct LatitudeOrder {
    values: Vec<f64>,
    flipped: bool,
}

impl LatitudeOrder {
    fn from_axis(axis: &RawAxis) -> NetCdfResult<Self> {
        let values = &axis.values;
        if values.is_empty() {
            return Err(NetCdfError::malformed("latitude axis is empty"));
        }
        if values.windows(2).all(|w| w[0] > w[1]) {
            return Ok(Self {
                values: values.clone(),
                flipped: false,
            });
        }
        if values.windows(2).all(|w| w[0] < w[1]) {
            return Ok(Self {
                values: values.iter().rev().copied().collect(),
                flipped: true,
            });
        }
        Err(NetCdfError::malformed("latitude axis is not monotonic"))
    }
}

struct LongitudeOrder {
    values: Vec<f64>,
    /// `values[i]` comes from file column `source_index[i]`.
    source_index: Vec<usize>,
}

impl LongitudeOrder {
    fn from_axis(axis: &RawAxis) -> NetCdfResult<Self> {
        let raw = &axis.values;
        if raw.is_empty() {
            return Err(NetCdfError::malformed("longitude axis is empty"));
        }
        let ascending = raw.windows(2).all(|w| w[0] < w[1]);
        let descending = raw.windows(2).all(|w| w[0] > w[1]);
        if !ascending && !descending {
            return Err(NetCdfError::malformed("longitude axis is not monotonic"));
        }

        let wrapped: Vec<f64> = raw.iter().map(|&l| wrap_longitude(l)).collect();
        let mut source_index: Vec<usize> = (0..wrapped.len()).collect();
        source_index.sort_by(|&a, &b| wrapped[a].total_cmp(&wrapped[b]));
        let values: Vec<f64> = source_index.iter().map(|&i| wrapped[i]).collect();

        if !values.windows(2).all(|w| w[0] < w[1]) {
            return Err(NetCdfError::malformed(
                "longitude axis has duplicate cells after wrapping to -180..180",
            ));
        }
        // A regional axis spanning 180 degrees east splits into two runs with a gap.
        if !is_uniform_axis(&values) {
            return Err(NetCdfError::malformed(
                "longitude axis is not evenly spaced after wrapping to -180..180; \
                 grids crossing the antimeridian are not supported",
            ));
        }
        Ok(Self {
            values,
            source_index,
        })
    }
}

/// Map a `0..360` longitude onto `-180..180`.
pub fn wrap_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

/// Decode CF time values (`"hours since 1900-01-01 00:00:00"`).
pub fn parse_cf_time(units: &str, values: &[f64]) -> NetCdfResult<Vec<DateTime<Utc>>> {
    let (unit, epoch) = units
        .split_once(" since ")
        .ok_or_else(|| NetCdfError::InvalidTime(format!("unsupported units '{}'", units)))?;

    let seconds_per_unit = match unit.trim().to_lowercase().as_str() {
        "seconds" | "second" | "secs" | "s" => 1.0,
        "minutes" | "minute" | "mins" | "min" => 60.0,
        "hours" | "hour" | "hrs" | "h" => 3600.0,
        "days" | "day" | "d" => 86400.0,
        other => {
            return Err(NetCdfError::InvalidTime(format!(
                "unsupported time unit '{}'",
                other
            )))
        }
    };
    let epoch = parse_epoch(epoch)?;

    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                return Err(NetCdfError::InvalidTime(format!("non-finite time value {}", v)));
            }
            let millis = (v * seconds_per_unit * 1000.0).round() as i64;
            Ok(epoch + Duration::milliseconds(millis))
        })
        .collect()
}

fn parse_epoch(s: &str) -> NetCdfResult<DateTime<Utc>> {
    let cleaned = s
        .trim()
        .trim_end_matches("UTC")
        .trim_end_matches('Z')
        .trim()
        .replace('T', " ");

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Ok(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(&cleaned, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| NetCdfError::InvalidTime(format!("unparseable epoch '{}'", s)))
}
