//! GeoJSON input features.
//!
//! Accepts a FeatureCollection or a single Feature. Points and MultiPoints
//! become point features; Polygons and MultiPolygons become area features.
//! Multi-part geometries are split into one feature per part, each keeping
//! the original properties. A mix of points and polygons is rejected.

use std::path::Path;

use era5_common::{AreaFeature, ExtractionError, ExtractionGeometry, ExtractionResult, PointFeature};
use export::geojson::{Feature, FeatureCollection, Geometry, Position};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Parse features from a GeoJSON document.
pub fn parse_features(json: &str) -> ExtractionResult<ExtractionGeometry> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ExtractionError::invalid_request(format!("invalid GeoJSON: {}", e)))?;

    let features = match value.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            serde_json::from_value::<FeatureCollection>(value)
                .map_err(|e| ExtractionError::invalid_request(format!("invalid FeatureCollection: {}", e)))?
                .features
        }
        Some("Feature") => vec![serde_json::from_value::<Feature>(value)
            .map_err(|e| ExtractionError::invalid_request(format!("invalid Feature: {}", e)))?],
        other => {
            return Err(ExtractionError::invalid_request(format!(
                "expected a FeatureCollection or Feature, found {:?}",
                other
            )))
        }
    };

    collect(features)
}

/// Read and parse a GeoJSON file.
pub fn load_features(path: &Path) -> ExtractionResult<ExtractionGeometry> {
    let content = std::fs::read_to_string(path)?;
    let geometry = parse_features(&content)?;
    debug!(path = %path.display(), features = geometry.len(), "Loaded input features");
    Ok(geometry)
}

fn collect(features: Vec<Feature>) -> ExtractionResult<ExtractionGeometry> {
    let mut points = Vec::new();
    let mut polygons = Vec::new();

    for (index, feature) in features.into_iter().enumerate() {
        let properties = feature.properties;
        match feature.geometry {
            None => warn!(feature = index, "Skipping feature without geometry"),
            Some(Geometry::Point { coordinates }) => {
                points.push(point(&coordinates, &properties, index)?);
            }
            Some(Geometry::MultiPoint { coordinates }) => {
                for position in &coordinates {
                    points.push(point(position, &properties, index)?);
                }
            }
            Some(Geometry::Polygon { coordinates }) => {
                polygons.push(area(&coordinates, &properties, index)?);
            }
            Some(Geometry::MultiPolygon { coordinates }) => {
                for rings in &coordinates {
                    polygons.push(area(rings, &properties, index)?);
                }
            }
        }
    }

    match (points.is_empty(), polygons.is_empty()) {
        (false, false) => Err(ExtractionError::invalid_request(
            "input mixes points and polygons",
        )),
        (true, false) => Ok(ExtractionGeometry::Polygons(polygons)),
        _ => Ok(ExtractionGeometry::Points(points)),
    }
}

fn position(position: &Position, index: usize) -> ExtractionResult<(f64, f64)> {
    match position.as_slice() {
        [lon, lat, ..] => Ok((*lon, *lat)),
        _ => Err(ExtractionError::invalid_request(format!(
            "feature {} has a position with fewer than two ordinates",
            index
        ))),
    }
}

fn point(coords: &Position, properties: &Map<String, Value>, index: usize) -> ExtractionResult<PointFeature> {
    let (lon, lat) = position(coords, index)?;
    Ok(PointFeature {
        lon,
        lat,
        attributes: properties.clone(),
    })
}

fn area(
    rings: &[Vec<Position>],
    properties: &Map<String, Value>,
    index: usize,
) -> ExtractionResult<AreaFeature> {
    let mut rings = rings
        .iter()
        .map(|ring| ring.iter().map(|p| position(p, index)).collect::<ExtractionResult<Vec<_>>>());
    let exterior = rings
        .next()
        .transpose()?
        .ok_or_else(|| ExtractionError::invalid_request(format!("feature {} has an empty polygon", index)))?;
    let holes = rings.collect::<ExtractionResult<Vec<_>>>()?;

    Ok(AreaFeature {
        exterior,
        holes,
        attributes: properties.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use era5_common::{ErrorKind, GeometryKind};

    #[test]
    fn test_points_keep_attributes() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [12.49, 41.89]},
                 "properties": {"name": "Rome", "elevation": 21}},
                {"type": "Feature", "geometry": {"type": "MultiPoint", "coordinates": [[11.34, 44.49], [11.40, 44.50]]},
                 "properties": {"name": "Bologna"}}
            ]
        }"#;
        let geometry = parse_features(json).unwrap();
        let ExtractionGeometry::Points(points) = geometry else {
            panic!("expected points");
        };
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].attributes["name"], "Rome");
        assert_eq!(points[0].attributes["elevation"], 21);
        assert_eq!(points[2].attributes["name"], "Bologna");
        assert_eq!((points[2].lon, points[2].lat), (11.40, 44.50));
    }

    #[test]
    fn test_single_polygon_feature() {
        let json = r#"{"type": "Feature", "properties": null, "geometry": {"type": "Polygon",
            "coordinates": [[[10.0, 45.0], [10.5, 45.0], [10.5, 45.5], [10.0, 45.0]],
                            [[10.1, 45.05], [10.2, 45.05], [10.2, 45.1], [10.1, 45.05]]]}}"#;
        let geometry = parse_features(json).unwrap();
        assert_eq!(geometry.kind(), GeometryKind::Polygons);
        let ExtractionGeometry::Polygons(polygons) = geometry else {
            unreachable!()
        };
        assert_eq!(polygons[0].exterior.len(), 4);
        assert_eq!(polygons[0].holes.len(), 1);
    }

    #[test]
    fn test_mixed_input_is_rejected() {
        let json = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [10.0, 45.0]}},
            {"type": "Feature", "properties": {}, "geometry": {"type": "Polygon",
             "coordinates": [[[10.0, 45.0], [10.5, 45.0], [10.5, 45.5], [10.0, 45.0]]]}}
        ]}"#;
        let err = parse_features(json).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("mixes"));
    }

    #[test]
    fn test_bad_documents() {
        assert!(parse_features("not json").is_err());
        assert!(parse_features(r#"{"type": "Point", "coordinates": [1, 2]}"#).is_err());
        let short = r#"{"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [10.0]}}"#;
        assert!(parse_features(short).unwrap_err().to_string().contains("two ordinates"));
    }
}
