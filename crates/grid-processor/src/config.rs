//! Configuration for the grid processors.

use serde::{Deserialize, Serialize};

/// Default buffer added around point requests, in degrees.
pub const DEFAULT_POINT_BUFFER: f64 = 0.1;
/// Default buffer added around polygon requests, in degrees.
pub const DEFAULT_POLYGON_BUFFER: f64 = 0.2;
/// Intersection fractions at or below this are treated as zero area.
pub const DEFAULT_ZERO_AREA_EPSILON: f64 = 1e-9;

/// Configuration shared by the sampler, the clip masker and the vector grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Whether points on the polygon boundary count as inside.
    pub boundary: BoundaryPolicy,

    /// Cell inclusion test used by the clip masker.
    pub clip_test: ClipTest,

    /// Geometry emitted for vector-grid cells.
    pub footprint: FootprintMode,

    /// Abort the whole extraction on the first point outside the grid.
    pub fail_on_point_outside: bool,

    /// Fraction threshold below which an intersection is discarded.
    pub zero_area_epsilon: f64,

    /// Area buffer for point requests (degrees).
    pub point_buffer: f64,

    /// Area buffer for polygon requests (degrees).
    pub polygon_buffer: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            boundary: BoundaryPolicy::Closed,
            clip_test: ClipTest::Center,
            footprint: FootprintMode::Intersection,
            fail_on_point_outside: false,
            zero_area_epsilon: DEFAULT_ZERO_AREA_EPSILON,
            point_buffer: DEFAULT_POINT_BUFFER,
            polygon_buffer: DEFAULT_POLYGON_BUFFER,
        }
    }
}

impl ProcessingConfig {
    /// Override fields that have an environment variable set.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("ERA5_BOUNDARY_POLICY") {
            self.boundary = BoundaryPolicy::from_str(&val);
        }

        if let Ok(val) = std::env::var("ERA5_CLIP_TEST") {
            self.clip_test = ClipTest::from_str(&val);
        }

        if let Ok(val) = std::env::var("ERA5_FOOTPRINT") {
            self.footprint = FootprintMode::from_str(&val);
        }

        if let Ok(val) = std::env::var("ERA5_FAIL_ON_POINT_OUTSIDE") {
            self.fail_on_point_outside = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("ERA5_POINT_BUFFER") {
            if let Ok(buffer) = val.parse() {
                self.point_buffer = buffer;
            }
        }

        if let Ok(val) = std::env::var("ERA5_POLYGON_BUFFER") {
            if let Ok(buffer) = val.parse() {
                self.polygon_buffer = buffer;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..1.0).contains(&self.zero_area_epsilon) {
            return Err("zero_area_epsilon must be in [0, 1)".to_string());
        }

        if !(self.point_buffer >= 0.0 && self.point_buffer.is_finite()) {
            return Err("point_buffer must be a finite value >= 0".to_string());
        }

        if !(self.polygon_buffer >= 0.0 && self.polygon_buffer.is_finite()) {
            return Err("polygon_buffer must be a finite value >= 0".to_string());
        }

        Ok(())
    }
}

/// Treatment of points lying exactly on a polygon edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryPolicy {
    /// Boundary points are inside.
    #[default]
    Closed,
    /// Boundary points are outside.
    Open,
}

impl BoundaryPolicy {
    /// Parse from string (case-insensitive), defaulting to closed.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "open" => Self::Open,
            _ => Self::Closed,
        }
    }
}

/// How the clip masker decides whether a cell belongs to the polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipTest {
    /// Cell centre inside the polygon.
    #[default]
    Center,
    /// Cell footprint touches the polygon.
    Footprint,
}

impl ClipTest {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "footprint" | "intersects" => Self::Footprint,
            _ => Self::Center,
        }
    }
}

/// Geometry written for each vector-grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FootprintMode {
    /// The whole cell rectangle.
    Rectangle,
    /// The part of the cell inside the polygon.
    #[default]
    Intersection,
}

impl FootprintMode {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "rectangle" | "cell" => Self::Rectangle,
            _ => Self::Intersection,
        }
    }
}
