//! Spatial extraction over decoded ERA5-Land grids.
//!
//! Three processors share one set of rules for selecting cells:
//!
//! ```text
//! GriddedArray[] ──┬─► PointSampler         ─► TimeSeriesTable
//!                  ├─► GeometryClipMasker   ─► RasterResult
//!                  └─► VectorGridGenerator  ─► VectorGridResult
//! ```
//!
//! Only cells whose footprint overlaps the target bounding box are ever
//! materialised. Fill values stay `NaN` in rasters and become `None` in
//! tables and vector cells.

pub mod clip;
pub mod config;
pub mod error;
pub mod sampling;
pub mod target;
pub mod types;
pub mod vector_grid;
pub mod window;

pub use clip::GeometryClipMasker;
pub use config::{BoundaryPolicy, ClipTest, FootprintMode, ProcessingConfig};
pub use error::{GridProcessorError, Result};
pub use sampling::PointSampler;
pub use target::TargetGeometry;
pub use types::{
    CellPolygon, CellWindow, GridCell, RasterBand, RasterLayer, RasterResult, SkippedPoint,
    TimeSeriesRow, TimeSeriesTable, VectorCell, VectorGridResult,
};
pub use vector_grid::VectorGridGenerator;
