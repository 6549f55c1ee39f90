//! User-supplied features the extraction runs against.
//!
//! Coordinates are `(lon, lat)` pairs in EPSG:4326. Any reprojection happens
//! before features reach this crate.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// Non-geometry attributes carried by an input feature, in source order.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// A point feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointFeature {
    pub lon: f64,
    pub lat: f64,
    #[serde(default)]
    pub attributes: Attributes,
}

impl PointFeature {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            lon,
            lat,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A polygon feature: one exterior ring and optional holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaFeature {
    pub exterior: Vec<(f64, f64)>,
    #[serde(default)]
    pub holes: Vec<Vec<(f64, f64)>>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl AreaFeature {
    pub fn new(exterior: Vec<(f64, f64)>) -> Self {
        Self {
            exterior,
            holes: Vec::new(),
            attributes: Attributes::new(),
        }
    }

    /// Axis-aligned rectangle, handy for tests and bbox requests.
    pub fn rectangle(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::new(vec![
            (min_lon, min_lat),
            (max_lon, min_lat),
            (max_lon, max_lat),
            (min_lon, max_lat),
            (min_lon, min_lat),
        ])
    }

    /// Number of distinct exterior vertices (closing vertex not counted).
    pub fn distinct_vertices(&self) -> usize {
        let mut seen: Vec<(f64, f64)> = Vec::with_capacity(self.exterior.len());
        for &c in &self.exterior {
            if !seen.contains(&c) {
                seen.push(c);
            }
        }
        seen.len()
    }
}

/// Which extraction path a geometry takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    Points,
    Polygons,
}

/// The full set of input features for one extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "features", rename_all = "lowercase")]
pub enum ExtractionGeometry {
    Points(Vec<PointFeature>),
    Polygons(Vec<AreaFeature>),
}

impl ExtractionGeometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Self::Points(_) => GeometryKind::Points,
            Self::Polygons(_) => GeometryKind::Polygons,
        }
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        match self {
            Self::Points(points) => points.len(),
            Self::Polygons(polygons) => polygons.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every coordinate of every feature (exterior rings only for polygons).
    pub fn coordinates(&self) -> Vec<(f64, f64)> {
        match self {
            Self::Points(points) => points.iter().map(|p| (p.lon, p.lat)).collect(),
            Self::Polygons(polygons) => polygons
                .iter()
                .flat_map(|p| p.exterior.iter().copied())
                .collect(),
        }
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::from_coords(self.coordinates())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_has_four_distinct_vertices() {
        let rect = AreaFeature::rectangle(10.0, 45.0, 10.2, 45.2);
        assert_eq!(rect.exterior.len(), 5);
        assert_eq!(rect.distinct_vertices(), 4);
    }

    #[test]
    fn test_geometry_bbox() {
        let geometry = ExtractionGeometry::Points(vec![
            PointFeature::new(10.0, 45.0),
            PointFeature::new(12.0, 44.0),
        ]);
        assert_eq!(geometry.kind(), GeometryKind::Points);
        assert_eq!(geometry.bbox(), Some(BoundingBox::new(10.0, 44.0, 12.0, 45.0)));
    }

    #[test]
    fn test_attributes_keep_insertion_order() {
        let point = PointFeature::new(0.0, 0.0)
            .with_attribute("zeta", 1)
            .with_attribute("alpha", "a");
        let keys: Vec<_> = point.attributes.keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }
}
