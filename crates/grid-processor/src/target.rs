//! The polygon set an extraction clips against.

use era5_common::{AreaFeature, BoundingBox};
use geo::{Area, BooleanOps, Contains, Coord, Intersects, LineString, MultiPolygon, Polygon, Rect};

use crate::config::BoundaryPolicy;
use crate::error::{GridProcessorError, Result};
use crate::types::CellPolygon;

/// Union of all input polygons.
#[derive(Debug, Clone)]
pub struct TargetGeometry {
    shape: MultiPolygon<f64>,
    bbox: BoundingBox,
}

/// How much of a cell footprint the target covers.
#[derive(Debug, Clone)]
pub struct CellOverlap {
    pub fraction: f64,
    pub shape: MultiPolygon<f64>,
}

impl TargetGeometry {
    /// Union the features into one geometry.
    ///
    /// Zero-area polygons are kept for the bbox but contribute no shape.
    pub fn from_features(features: &[AreaFeature]) -> Result<Self> {
        let bbox = BoundingBox::from_coords(features.iter().flat_map(|f| f.exterior.iter().copied()))
            .ok_or_else(|| GridProcessorError::empty_input("no polygon coordinates"))?;

        let mut polygons = features
            .iter()
            .map(to_polygon)
            .filter(|p| p.unsigned_area() > 0.0);

        let shape = match polygons.next() {
            None => MultiPolygon::new(Vec::new()),
            Some(first) => polygons.fold(MultiPolygon::new(vec![first]), |acc, p| {
                acc.union(&MultiPolygon::new(vec![p]))
            }),
        };

        Ok(Self { shape, bbox })
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn area(&self) -> f64 {
        self.shape.unsigned_area()
    }

    pub fn is_empty(&self) -> bool {
        self.shape.0.is_empty()
    }

    /// Point-in-polygon under the given boundary policy.
    pub fn contains_point(&self, lon: f64, lat: f64, policy: BoundaryPolicy) -> bool {
        let coord = Coord { x: lon, y: lat };
        match policy {
            BoundaryPolicy::Closed => self.shape.intersects(&coord),
            BoundaryPolicy::Open => self.shape.contains(&coord),
        }
    }

    /// Whether a footprint shares any point (closed) or any area (open).
    pub fn touches(&self, footprint: &BoundingBox, policy: BoundaryPolicy, epsilon: f64) -> bool {
        match policy {
            BoundaryPolicy::Closed => self.shape.intersects(&rect_polygon(footprint)),
            BoundaryPolicy::Open => self.overlap(footprint).fraction > epsilon,
        }
    }

    /// Exact intersection of the target with a footprint.
    pub fn overlap(&self, footprint: &BoundingBox) -> CellOverlap {
        let rect = rect_polygon(footprint);
        let rect_area = rect.unsigned_area();
        if self.is_empty() || rect_area <= 0.0 || !self.shape.intersects(&rect) {
            return CellOverlap {
                fraction: 0.0,
                shape: MultiPolygon::new(Vec::new()),
            };
        }
        if self.shape.contains(&rect) {
            return CellOverlap {
                fraction: 1.0,
                shape: MultiPolygon::new(vec![rect]),
            };
        }

        let shape = self.shape.intersection(&MultiPolygon::new(vec![rect]));
        let fraction = (shape.unsigned_area() / rect_area).min(1.0);
        CellOverlap { fraction, shape }
    }
}

fn to_polygon(feature: &AreaFeature) -> Polygon<f64> {
    Polygon::new(
        LineString::from(feature.exterior.clone()),
        feature
            .holes
            .iter()
            .map(|ring| LineString::from(ring.clone()))
            .collect(),
    )
}

/// Footprint rectangle as a polygon.
pub fn rect_polygon(b: &BoundingBox) -> Polygon<f64> {
    Rect::new(
        Coord {
            x: b.min_lon,
            y: b.min_lat,
        },
        Coord {
            x: b.max_lon,
            y: b.max_lat,
        },
    )
    .to_polygon()
}

/// Convert a geo shape into plain coordinate rings.
pub fn to_cell_polygons(shape: &MultiPolygon<f64>) -> Vec<CellPolygon> {
    shape
        .iter()
        .map(|poly| CellPolygon {
            exterior: ring_coords(poly.exterior()),
            holes: poly.interiors().iter().map(ring_coords).collect(),
        })
        .collect()
}

fn ring_coords(ring: &LineString<f64>) -> Vec<(f64, f64)> {
    ring.coords().map(|c| (c.x, c.y)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::assert_approx_eq;

    fn unit_square() -> AreaFeature {
        AreaFeature::rectangle(0.0, 0.0, 1.0, 1.0)
    }

    #[test]
    fn test_boundary_policies() {
        let target = TargetGeometry::from_features(&[unit_square()]).unwrap();
        assert!(target.contains_point(0.5, 0.5, BoundaryPolicy::Closed));
        assert!(target.contains_point(0.5, 0.5, BoundaryPolicy::Open));
        assert!(target.contains_point(1.0, 0.5, BoundaryPolicy::Closed));
        assert!(!target.contains_point(1.0, 0.5, BoundaryPolicy::Open));
        assert!(!target.contains_point(1.5, 0.5, BoundaryPolicy::Closed));
    }

    #[test]
    fn test_overlap_fraction() {
        let target = TargetGeometry::from_features(&[unit_square()]).unwrap();
        let inside = target.overlap(&BoundingBox::new(0.2, 0.2, 0.4, 0.4));
        assert_eq!(inside.fraction, 1.0);

        let half = target.overlap(&BoundingBox::new(0.5, 0.0, 1.5, 1.0));
        assert_approx_eq!(half.fraction, 0.5, 1e-9);

        let outside = target.overlap(&BoundingBox::new(2.0, 2.0, 3.0, 3.0));
        assert_eq!(outside.fraction, 0.0);
    }

    #[test]
    fn test_union_of_adjacent_squares() {
        let target = TargetGeometry::from_features(&[
            unit_square(),
            AreaFeature::rectangle(1.0, 0.0, 2.0, 1.0),
        ])
        .unwrap();
        assert_approx_eq!(target.area(), 2.0, 1e-9);
        assert_eq!(*target.bbox(), BoundingBox::new(0.0, 0.0, 2.0, 1.0));
    }

    #[test]
    fn test_zero_area_polygon_is_empty() {
        let flat = AreaFeature::new(vec![(0.0, 0.0), (1.0, 0.0), (0.5, 0.0), (0.0, 0.0)]);
        let target = TargetGeometry::from_features(&[flat]).unwrap();
        assert!(target.is_empty());
        assert_eq!(target.overlap(&BoundingBox::new(0.0, -0.5, 1.0, 0.5)).fraction, 0.0);
    }
}
