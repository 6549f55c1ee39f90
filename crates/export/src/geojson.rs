//! GeoJSON types and the vector-grid writer.
//!
//! The same types parse the extractor's input features, so geometry
//! positions accept an optional third ordinate and `properties: null`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use era5_common::time::file_stamp;
use era5_common::VariableCodeMapper;
use grid_processor::{CellPolygon, VectorCell, VectorGridResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{ExportError, ExportResult};

/// `[lon, lat]` or `[lon, lat, z]`.
pub type Position = Vec<f64>;

/// A GeoJSON FeatureCollection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub type_: String,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            type_: "FeatureCollection".to_string(),
            features,
        }
    }
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// A GeoJSON Feature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    /// `None` for features with `"geometry": null`.
    pub geometry: Option<Geometry>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: Geometry, properties: Map<String, Value>) -> Self {
        Self {
            type_: "Feature".to_string(),
            id: None,
            geometry: Some(geometry),
            properties,
        }
    }
}

/// Geometry types accepted as input and produced as output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    /// Rings; the first is the exterior.
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
}

impl Geometry {
    /// Polygon for one part, MultiPolygon for several.
    pub fn from_cell_polygons(parts: &[CellPolygon]) -> Option<Self> {
        let mut rings: Vec<Vec<Vec<Position>>> = parts.iter().map(polygon_rings).collect();
        match rings.len() {
            0 => None,
            1 => rings.pop().map(|coordinates| Geometry::Polygon { coordinates }),
            _ => Some(Geometry::MultiPolygon { coordinates: rings }),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

fn polygon_rings(polygon: &CellPolygon) -> Vec<Vec<Position>> {
    std::iter::once(&polygon.exterior)
        .chain(&polygon.holes)
        .map(|ring| ring.iter().map(|&(x, y)| vec![x, y]).collect())
        .collect()
}

/// `era5_<YYYYMMDD_HHMM>_grid.geojson`
pub fn grid_file_name(time: &DateTime<Utc>) -> String {
    format!("era5_{}_grid.geojson", file_stamp(time))
}

/// One FeatureCollection per timestamp.
pub fn vector_grid_collections(
    result: &VectorGridResult,
) -> ExportResult<Vec<(DateTime<Utc>, FeatureCollection)>> {
    let mapper = VariableCodeMapper::era5_land();
    let names = result
        .variables
        .iter()
        .map(|v| mapper.to_display(v.internal_code))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ExportError::InvalidInput(e.to_string()))?;

    result
        .timestamps
        .iter()
        .enumerate()
        .map(|(t, time)| {
            let features = result
                .cells
                .iter()
                .filter_map(|cell| cell_feature(cell, t, time, &names))
                .collect();
            Ok((*time, FeatureCollection::new(features)))
        })
        .collect()
}

fn cell_feature(cell: &VectorCell, t: usize, time: &DateTime<Utc>, names: &[&str]) -> Option<Feature> {
    let geometry = Geometry::from_cell_polygons(&cell.geometry)?;
    let mut properties = Map::new();
    let values = cell.values.get(t).map(Vec::as_slice).unwrap_or(&[]);
    for (i, name) in names.iter().enumerate() {
        let value = values
            .get(i)
            .copied()
            .flatten()
            .map(|v| Value::from(f64::from(v)))
            .unwrap_or(Value::Null);
        properties.insert(name.to_string(), value);
    }
    properties.insert(
        "intersection_fraction".to_string(),
        Value::from(cell.intersection_fraction),
    );
    properties.insert("lat_center".to_string(), Value::from(cell.center.1));
    properties.insert("lon_center".to_string(), Value::from(cell.center.0));
    properties.insert("row".to_string(), Value::from(cell.row));
    properties.insert("col".to_string(), Value::from(cell.col));
    properties.insert(
        "time".to_string(),
        Value::from(time.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    Some(Feature::new(geometry, properties))
}

/// Write one GeoJSON file per timestamp into `dir`.
pub fn write_vector_grid_files(result: &VectorGridResult, dir: &Path) -> ExportResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut paths = Vec::new();
    for (time, collection) in vector_grid_collections(result)? {
        let path = dir.join(grid_file_name(&time));
        let file = std::fs::File::create(&path)?;
        serde_json::to_writer(std::io::BufWriter::new(file), &collection)?;
        paths.push(path);
    }
    info!(files = paths.len(), cells = result.cells.len(), "Wrote vector grid");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use era5_common::AreaFeature;
    use grid_processor::VectorGridGenerator;
    use test_utils::{cell_aligned_rectangle, with_fill_cells, SyntheticGrid};

    #[test]
    fn test_parse_input_collection() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [10.5, 45.2, 120.0]},
                 "properties": {"name": "a"}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [11.0, 44.9]},
                 "properties": null}
            ]
        }"#;
        let collection: FeatureCollection = serde_json::from_str(json).unwrap();
        assert_eq!(collection.features.len(), 2);
        assert_eq!(collection.features[0].properties["name"], "a");
        assert!(collection.features[1].properties.is_empty());
        assert_eq!(
            collection.features[0].geometry,
            Some(Geometry::Point { coordinates: vec![10.5, 45.2, 120.0] })
        );
    }

    #[test]
    fn test_grid_properties() {
        let grid = with_fill_cells(SyntheticGrid::new("t2m").indexed(), &[(2, 2)]);
        let square = cell_aligned_rectangle(&grid, 2, 2, 1, 2);
        let result = VectorGridGenerator::default().generate(&[grid], &[square]).unwrap();

        let collections = vector_grid_collections(&result).unwrap();
        assert_eq!(collections.len(), 1);
        let features = &collections[0].1.features;
        assert_eq!(features.len(), 2);

        let filled = features
            .iter()
            .find(|f| f.properties["col"] == 2)
            .unwrap();
        assert_eq!(filled.properties["2m_temperature"], Value::Null);
        assert_eq!(filled.properties["intersection_fraction"], 1.0);
        assert_eq!(filled.properties["time"], "2024-01-01T00:00:00Z");
        assert!(!filled.properties.contains_key("t2m"));
        assert!(matches!(filled.geometry, Some(Geometry::Polygon { .. })));
    }

    #[test]
    fn test_multipart_cell_becomes_multipolygon() {
        let parts = vec![
            CellPolygon {
                exterior: AreaFeature::rectangle(0.0, 0.0, 1.0, 1.0).exterior,
                holes: vec![],
            },
            CellPolygon {
                exterior: AreaFeature::rectangle(2.0, 0.0, 3.0, 1.0).exterior,
                holes: vec![],
            },
        ];
        let geometry = Geometry::from_cell_polygons(&parts).unwrap();
        let json = serde_json::to_value(&geometry).unwrap();
        assert_eq!(json["type"], "MultiPolygon");
        assert_eq!(json["coordinates"].as_array().unwrap().len(), 2);
        assert!(Geometry::from_cell_polygons(&[]).is_none());
    }

    #[test]
    fn test_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let grid = SyntheticGrid::new("t2m").indexed();
        let square = cell_aligned_rectangle(&grid, 0, 0, 1, 1);
        let result = VectorGridGenerator::default().generate(&[grid], &[square]).unwrap();

        let paths = write_vector_grid_files(&result, dir.path()).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("era5_20240101_0000_grid.geojson"));
        let text = std::fs::read_to_string(&paths[0]).unwrap();
        let parsed: FeatureCollection = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.features.len(), 1);
    }
}
