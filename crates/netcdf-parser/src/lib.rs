//! NetCDF decoding for ERA5-Land retrievals.
//!
//! Reading happens in two steps:
//!
//! 1. [`native::read_dataset`] pulls axes and variables out of the file into a
//!    [`RawDataset`] using libnetcdf.
//! 2. [`decode_dataset`] validates that data and produces one
//!    [`GriddedArray`](era5_common::GriddedArray) per requested variable with
//!    normalised axes and `NaN` for fill values.
//!
//! The second step has no I/O, so most tests run it on synthetic data.

pub mod dataset;
pub mod decode;
pub mod error;
#[cfg(feature = "native")]
pub mod native;

pub use dataset::{RawAxis, RawDataset, RawDimension, RawVariable};
pub use decode::{decode_dataset, parse_cf_time, wrap_longitude};
pub use error::{NetCdfError, NetCdfResult};
#[cfg(feature = "native")]
pub use native::silence_hdf5_errors;

/// Read and decode a file in one call.
#[cfg(feature = "native")]
pub fn decode_file<P: AsRef<std::path::Path>>(
    path: P,
    variables: &[era5_common::VariableSpec],
) -> NetCdfResult<Vec<era5_common::GriddedArray>> {
    let names: Vec<&str> = variables
        .iter()
        .flat_map(|v| [v.internal_code, v.display_name])
        .collect();
    let raw = native::read_dataset(path, &names)?;
    decode_dataset(&raw, variables)
}
