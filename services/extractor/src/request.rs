//! Request validation and provider request projection.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use era5_common::time::{dates_in_range, format_hour};
use era5_common::{
    BoundingBox, ExtractionError, ExtractionGeometry, ExtractionResult, GeometryKind,
    VariableCodeMapper, VariableSpec,
};
use grid_processor::ProcessingConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Spatial selector sent to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestGeometry {
    Point { lon: f64, lat: f64 },
    BoundingBox(BoundingBox),
}

impl RequestGeometry {
    pub fn bbox(&self) -> BoundingBox {
        match *self {
            Self::Point { lon, lat } => BoundingBox::new(lon, lat, lon, lat),
            Self::BoundingBox(bbox) => bbox,
        }
    }
}

/// What polygon extractions produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolygonOutput {
    /// Clipped multi-band raster.
    #[default]
    Raster,
    /// Attributed per-cell polygons.
    Vector,
}

/// A validated extraction request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub geometry: RequestGeometry,
    pub features: ExtractionGeometry,
    pub variables: Vec<VariableSpec>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Sorted, unique, each `<= 23`.
    pub hours: Vec<u8>,
    pub polygon_output: PolygonOutput,
}

/// Provider dataset name and request body.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub dataset: String,
    pub inputs: Value,
}

impl RequestDescriptor {
    /// Area `[N, W, S, E]` with the configured buffer.
    pub fn area(&self, config: &ProcessingConfig) -> [f64; 4] {
        let buffer = match self.features.kind() {
            GeometryKind::Points => config.point_buffer,
            GeometryKind::Polygons => config.polygon_buffer,
        };
        self.geometry.bbox().expand(buffer).clamp_to_valid().to_nwse()
    }

    /// Project into the provider's request vocabulary.
    ///
    /// Year, month and day are independent lists, so a range spanning a
    /// month boundary over-fetches; timestamps are filtered after decoding.
    pub fn to_provider_request(&self, dataset: &str, config: &ProcessingConfig) -> ProviderRequest {
        let dates = dates_in_range(self.start_date, self.end_date);
        let years: BTreeSet<String> = dates.iter().map(|d| d.year().to_string()).collect();
        let months: BTreeSet<String> = dates.iter().map(|d| format!("{:02}", d.month())).collect();
        let days: BTreeSet<String> = dates.iter().map(|d| format!("{:02}", d.day())).collect();

        // The retrieve API takes long names; codes only identify file variables.
        let inputs = json!({
            "variable": self.variables.iter().map(|v| v.display_name).collect::<Vec<_>>(),
            "year": years,
            "month": months,
            "day": days,
            "time": self.hours.iter().map(|h| format_hour(*h)).collect::<Vec<_>>(),
            "area": self.area(config),
            "data_format": "netcdf",
            "download_format": "unarchived",
        });

        ProviderRequest {
            dataset: dataset.to_string(),
            inputs,
        }
    }

    /// Whether a decoded timestamp was actually asked for.
    pub fn wants(&self, time: &DateTime<Utc>) -> bool {
        let date = time.date_naive();
        date >= self.start_date
            && date <= self.end_date
            && time.minute() == 0
            && self.hours.binary_search(&(time.hour() as u8)).is_ok()
    }
}

/// Builds a [`RequestDescriptor`], checking every constraint before any I/O.
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    variables: Vec<String>,
    hours: Vec<u8>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    features: Option<ExtractionGeometry>,
    polygon_output: PolygonOutput,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables by display name.
    pub fn variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn hours(mut self, hours: impl IntoIterator<Item = u8>) -> Self {
        self.hours = hours.into_iter().collect();
        self
    }

    pub fn date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn features(mut self, features: ExtractionGeometry) -> Self {
        self.features = Some(features);
        self
    }

    pub fn polygon_output(mut self, output: PolygonOutput) -> Self {
        self.polygon_output = output;
        self
    }

    pub fn build(self) -> ExtractionResult<RequestDescriptor> {
        if self.variables.is_empty() {
            return Err(ExtractionError::invalid_request("no variables selected"));
        }

        if self.hours.is_empty() {
            return Err(ExtractionError::invalid_request("no hours selected"));
        }
        if let Some(hour) = self.hours.iter().find(|h| **h > 23) {
            return Err(ExtractionError::invalid_request(format!(
                "hour {} is outside 0..=23",
                hour
            )));
        }

        let (start_date, end_date) = match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if start <= end => (start, end),
            (Some(start), Some(end)) => {
                return Err(ExtractionError::invalid_request(format!(
                    "start date {} is after end date {}",
                    start, end
                )))
            }
            _ => return Err(ExtractionError::invalid_request("date range not set")),
        };

        let features = self
            .features
            .ok_or_else(|| ExtractionError::invalid_request("no geometry"))?;
        let geometry = validate_geometry(&features)?;

        let mapper = VariableCodeMapper::era5_land();
        let mut variables: Vec<VariableSpec> = Vec::with_capacity(self.variables.len());
        for name in &self.variables {
            let spec = mapper.by_display(name.trim())?;
            if !variables.contains(&spec) {
                variables.push(spec);
            }
        }

        let hours: Vec<u8> = self.hours.into_iter().collect::<BTreeSet<_>>().into_iter().collect();

        Ok(RequestDescriptor {
            geometry,
            features,
            variables,
            start_date,
            end_date,
            hours,
            polygon_output: self.polygon_output,
        })
    }
}

fn validate_geometry(features: &ExtractionGeometry) -> ExtractionResult<RequestGeometry> {
    let coords = features.coordinates();
    if coords.is_empty() {
        return Err(ExtractionError::invalid_request("geometry has no coordinates"));
    }
    if let Some((lon, lat)) = coords.iter().find(|(lon, lat)| !lon.is_finite() || !lat.is_finite()) {
        return Err(ExtractionError::invalid_request(format!(
            "non-finite coordinate ({}, {})",
            lon, lat
        )));
    }
    if let Some((_, lat)) = coords.iter().find(|(_, lat)| !(-90.0..=90.0).contains(lat)) {
        return Err(ExtractionError::invalid_request(format!(
            "latitude {} is outside [-90, 90]",
            lat
        )));
    }

    match features {
        ExtractionGeometry::Points(points) if points.len() == 1 => Ok(RequestGeometry::Point {
            lon: points[0].lon,
            lat: points[0].lat,
        }),
        ExtractionGeometry::Polygons(polygons) => {
            if let Some(index) = polygons.iter().position(|p| p.distinct_vertices() < 3) {
                return Err(ExtractionError::invalid_request(format!(
                    "polygon {} has fewer than three distinct vertices",
                    index
                )));
            }
            bbox_of(&coords)
        }
        ExtractionGeometry::Points(_) => bbox_of(&coords),
    }
}

fn bbox_of(coords: &[(f64, f64)]) -> ExtractionResult<RequestGeometry> {
    BoundingBox::from_coords(coords.iter().copied())
        .map(RequestGeometry::BoundingBox)
        .ok_or_else(|| ExtractionError::invalid_request("geometry has no coordinates"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use era5_common::{AreaFeature, ErrorKind, PointFeature};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn point_request() -> RequestBuilder {
        RequestBuilder::new()
            .variables(["2m_temperature"])
            .hours([0, 12])
            .date_range(date(2024, 1, 1), date(2024, 1, 3))
            .features(ExtractionGeometry::Points(vec![PointFeature::new(10.5, 45.2)]))
    }

    #[test]
    fn test_valid_point_request() {
        let descriptor = point_request().build().unwrap();
        assert_eq!(descriptor.geometry, RequestGeometry::Point { lon: 10.5, lat: 45.2 });
        assert_eq!(descriptor.variables[0].internal_code, "t2m");
        assert_eq!(descriptor.hours, vec![0, 12]);
    }

    #[test]
    fn test_rejects_start_after_end() {
        let err = point_request()
            .date_range(date(2024, 1, 5), date(2024, 1, 1))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("after end date"));
    }

    #[test]
    fn test_rejects_empty_hours() {
        let err = point_request().hours(Vec::<u8>::new()).build().unwrap_err();
        assert_eq!(err, ExtractionError::invalid_request("no hours selected"));

        let err = point_request().hours([24]).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_rejects_empty_variables() {
        let err = point_request().variables(Vec::<String>::new()).build().unwrap_err();
        assert_eq!(err, ExtractionError::invalid_request("no variables selected"));
    }

    #[test]
    fn test_first_violation_is_reported() {
        let err = RequestBuilder::new()
            .date_range(date(2024, 2, 1), date(2024, 1, 1))
            .build()
            .unwrap_err();
        assert_eq!(err, ExtractionError::invalid_request("no variables selected"));
    }

    #[test]
    fn test_unknown_variable() {
        let err = point_request().variables(["t2m"]).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownVariable);
    }

    #[test]
    fn test_geometry_checks() {
        let err = point_request()
            .features(ExtractionGeometry::Points(vec![]))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let err = point_request()
            .features(ExtractionGeometry::Points(vec![PointFeature::new(10.0, 95.0)]))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("latitude"));

        let sliver = AreaFeature::new(vec![(10.0, 45.0), (10.1, 45.0), (10.0, 45.0)]);
        let err = point_request()
            .features(ExtractionGeometry::Polygons(vec![sliver]))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("three distinct vertices"));
    }

    #[test]
    fn test_duplicates_are_collapsed() {
        let descriptor = point_request()
            .variables(["total_precipitation", "2m_temperature", "total_precipitation"])
            .hours([12, 0, 12])
            .build()
            .unwrap();
        let codes: Vec<_> = descriptor.variables.iter().map(|v| v.internal_code).collect();
        assert_eq!(codes, vec!["tp", "t2m"]);
        assert_eq!(descriptor.hours, vec![0, 12]);
    }

    #[test]
    fn test_multiple_points_use_bbox() {
        let descriptor = point_request()
            .features(ExtractionGeometry::Points(vec![
                PointFeature::new(10.0, 45.0),
                PointFeature::new(11.0, 44.0),
            ]))
            .build()
            .unwrap();
        assert_eq!(
            descriptor.geometry,
            RequestGeometry::BoundingBox(BoundingBox::new(10.0, 44.0, 11.0, 45.0))
        );
    }

    #[test]
    fn test_provider_request() {
        let descriptor = point_request()
            .date_range(date(2024, 1, 30), date(2024, 2, 2))
            .build()
            .unwrap();
        let request = descriptor.to_provider_request("reanalysis-era5-land", &ProcessingConfig::default());
        let inputs = &request.inputs;

        assert_eq!(request.dataset, "reanalysis-era5-land");
        assert_eq!(inputs["variable"], json!(["2m_temperature"]));
        assert_eq!(inputs["year"], json!(["2024"]));
        assert_eq!(inputs["month"], json!(["01", "02"]));
        assert_eq!(inputs["day"], json!(["01", "02", "30", "31"]));
        assert_eq!(inputs["time"], json!(["00:00", "12:00"]));
        assert_eq!(inputs["data_format"], "netcdf");
        assert_eq!(inputs["download_format"], "unarchived");

        let area: Vec<f64> = serde_json::from_value(inputs["area"].clone()).unwrap();
        let expected = [45.3, 10.4, 45.1, 10.6];
        for (a, e) in area.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9);
        }
    }

    #[test]
    fn test_wants_filters_overfetched_days() {
        let descriptor = point_request()
            .date_range(date(2024, 1, 30), date(2024, 2, 2))
            .build()
            .unwrap();
        let at = |d: NaiveDate, h: u32| d.and_hms_opt(h, 0, 0).unwrap().and_utc();

        assert!(descriptor.wants(&at(date(2024, 1, 31), 12)));
        assert!(!descriptor.wants(&at(date(2024, 1, 1), 0)));
        assert!(!descriptor.wants(&at(date(2024, 2, 29), 0)));
        assert!(!descriptor.wants(&at(date(2024, 2, 1), 6)));
    }
}
