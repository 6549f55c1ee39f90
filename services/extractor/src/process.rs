//! Decoded grids to extraction output.

use era5_common::{ExtractionError, ExtractionGeometry, ExtractionResult, GriddedArray};
use grid_processor::{GeometryClipMasker, PointSampler, ProcessingConfig, VectorGridGenerator};
use tracing::{debug, info};

use crate::job::ExtractionOutput;
use crate::request::{PolygonOutput, RequestDescriptor};

/// Drop timestamps outside the requested dates and hours, then run the
/// processor matching the geometry kind.
pub fn extract(
    mut arrays: Vec<GriddedArray>,
    descriptor: &RequestDescriptor,
    config: &ProcessingConfig,
) -> ExtractionResult<ExtractionOutput> {
    let decoded = arrays.first().map(|a| a.n_times()).unwrap_or(0);
    for array in &mut arrays {
        array.retain_times(|t| descriptor.wants(t));
    }
    let kept = arrays.first().map(|a| a.n_times()).unwrap_or(0);
    if decoded > 0 && kept == 0 {
        return Err(ExtractionError::malformed(
            "file holds no timestamps inside the requested window",
        ));
    }
    debug!(decoded, kept, "Filtered timestamps");

    let output = match &descriptor.features {
        ExtractionGeometry::Points(points) => {
            let table = PointSampler::new(config.clone()).sample(&arrays, points)?;
            info!(rows = table.len(), skipped = table.skipped.len(), "Sampled points");
            ExtractionOutput::TimeSeries(table)
        }
        ExtractionGeometry::Polygons(polygons) => match descriptor.polygon_output {
            PolygonOutput::Raster => {
                let raster = GeometryClipMasker::new(config.clone()).clip(&arrays, polygons)?;
                info!(
                    width = raster.width,
                    height = raster.height,
                    inside = raster.inside_cells,
                    "Clipped raster"
                );
                ExtractionOutput::Raster(raster)
            }
            PolygonOutput::Vector => {
                let grid = VectorGridGenerator::new(config.clone()).generate(&arrays, polygons)?;
                info!(cells = grid.cells.len(), "Generated vector grid");
                ExtractionOutput::VectorGrid(grid)
            }
        },
    };
    Ok(output)
}
