//! File reading through the native netcdf library.
//!
//! Only the coordinate axes and the variables asked for are read. All values
//! are pulled as `f64`; libnetcdf converts packed integer storage for us and
//! the packing attributes are applied later by the decoder.

use std::path::Path;
use std::sync::Once;

use tracing::debug;

use crate::dataset::{RawAxis, RawDataset, RawDimension, RawVariable};
use crate::decode::{LATITUDE_AXIS_NAMES, LONGITUDE_AXIS_NAMES, TIME_AXIS_NAMES};
use crate::error::{NetCdfError, NetCdfResult};

/// Silence HDF5's automatic error printing to stderr.
///
/// HDF5 reports every failed attribute lookup on stderr even when the caller
/// handles it. Safe to call any number of times; call it before the first
/// file is opened.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 with null handlers only disables automatic printing.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Read axes plus the named variables (missing names are skipped).
pub fn read_dataset<P: AsRef<Path>>(path: P, names: &[&str]) -> NetCdfResult<RawDataset> {
    silence_hdf5_errors();

    let path = path.as_ref();
    let file = netcdf::open(path).map_err(|e| {
        NetCdfError::InvalidFormat(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let time = read_axis(&file, &TIME_AXIS_NAMES, true)?;
    let latitude = read_axis(&file, &LATITUDE_AXIS_NAMES, false)?;
    let longitude = read_axis(&file, &LONGITUDE_AXIS_NAMES, false)?;

    let mut variables = Vec::with_capacity(names.len());
    for name in names {
        let Some(var) = file.variable(name) else {
            continue;
        };
        variables.push(read_variable(&var)?);
    }

    debug!(
        path = %path.display(),
        variables = variables.len(),
        "Read NetCDF file"
    );

    Ok(RawDataset {
        time,
        latitude,
        longitude,
        variables,
    })
}

fn read_axis(
    file: &netcdf::File,
    candidates: &[&str],
    with_units: bool,
) -> NetCdfResult<Option<RawAxis>> {
    for name in candidates {
        let Some(var) = file.variable(name) else {
            continue;
        };
        let values: Vec<f64> = var
            .get_values(..)
            .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to read {}: {}", name, e)))?;
        let mut axis = RawAxis::new(*name, values);
        if with_units {
            axis.units = get_string_attr(&var, "units");
        }
        return Ok(Some(axis));
    }
    Ok(None)
}

fn read_variable(var: &netcdf::Variable) -> NetCdfResult<RawVariable> {
    let name = var.name();
    let dimensions = var
        .dimensions()
        .iter()
        .map(|d| RawDimension::new(d.name(), d.len()))
        .collect();
    let data: Vec<f64> = var
        .get_values(..)
        .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to read {}: {}", name, e)))?;

    let mut raw = RawVariable::new(name, dimensions, data);
    raw.units = get_string_attr(var, "units");
    raw.scale_factor = get_f64_attr(var, "scale_factor");
    raw.add_offset = get_f64_attr(var, "add_offset");
    raw.fill_value = get_f64_attr(var, "_FillValue");
    raw.missing_value = get_f64_attr(var, "missing_value");
    Ok(raw)
}

/// Check the attribute list first so HDF5 does not log a lookup failure.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

fn get_string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}
