//! Result writers for ERA5-Land extractions.
//!
//! - [`csv`]: time-series table for point mode
//! - [`geotiff`]: one Float32 GeoTIFF per timestamp for raster mode
//! - [`geojson`]: one FeatureCollection per timestamp for vector mode, plus
//!   the GeoJSON types used to read input features

pub mod csv;
pub mod error;
pub mod geojson;
pub mod geotiff;

pub use csv::{write_time_series, write_time_series_file};
pub use error::{ExportError, ExportResult};
pub use geojson::{write_vector_grid_files, Feature, FeatureCollection, Geometry};
pub use geotiff::{encode_geotiff, write_raster_files};
