//! Common types and utilities shared across the ERA5-Land extractor crates.

pub mod bbox;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod time;
pub mod variables;

pub use bbox::BoundingBox;
pub use error::{ErrorKind, ExtractionError, ExtractionResult};
pub use geometry::{AreaFeature, Attributes, ExtractionGeometry, GeometryKind, PointFeature};
pub use grid::{is_fill, is_uniform_axis, GriddedArray, NATIVE_RESOLUTION};
pub use variables::{VariableCodeMapper, VariableSpec};
