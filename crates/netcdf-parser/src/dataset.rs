//! In-memory view of a NetCDF file before any interpretation.
//!
//! The native reader fills these structures straight from libnetcdf. Keeping
//! them free of library types lets the decoding rules run on synthetic data.

/// A named dimension and its length.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDimension {
    pub name: String,
    pub len: usize,
}

impl RawDimension {
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            len,
        }
    }
}

/// A coordinate axis as stored in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAxis {
    pub name: String,
    pub values: Vec<f64>,
    /// CF `units` attribute, required for the time axis.
    pub units: Option<String>,
}

impl RawAxis {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
            units: None,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }
}

/// A data variable with its packing attributes, values still packed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVariable {
    pub name: String,
    pub dimensions: Vec<RawDimension>,
    pub data: Vec<f64>,
    pub units: Option<String>,
    pub scale_factor: Option<f64>,
    pub add_offset: Option<f64>,
    pub fill_value: Option<f64>,
    pub missing_value: Option<f64>,
}

impl RawVariable {
    pub fn new(name: impl Into<String>, dimensions: Vec<RawDimension>, data: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            dimensions,
            data,
            units: None,
            scale_factor: None,
            add_offset: None,
            fill_value: None,
            missing_value: None,
        }
    }

    /// Whether a packed value is one of the declared fill markers.
    pub fn is_declared_fill(&self, raw: f64) -> bool {
        raw.is_nan() || self.fill_value == Some(raw) || self.missing_value == Some(raw)
    }

    /// Unpack one raw value, mapping fill markers to `NaN`.
    pub fn unpack(&self, raw: f64) -> f32 {
        if self.is_declared_fill(raw) {
            return f32::NAN;
        }
        (raw * self.scale_factor.unwrap_or(1.0) + self.add_offset.unwrap_or(0.0)) as f32
    }
}

/// Everything the decoder needs from one file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawDataset {
    pub time: Option<RawAxis>,
    pub latitude: Option<RawAxis>,
    pub longitude: Option<RawAxis>,
    pub variables: Vec<RawVariable>,
}

impl RawDataset {
    pub fn variable(&self, name: &str) -> Option<&RawVariable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_applies_packing_and_fill() {
        let mut var = RawVariable::new("t2m", vec![], vec![]);
        var.scale_factor = Some(0.5);
        var.add_offset = Some(250.0);
        var.fill_value = Some(-32767.0);

        assert_eq!(var.unpack(10.0), 255.0);
        assert!(var.unpack(-32767.0).is_nan());
        // zero is data, never fill
        assert_eq!(var.unpack(0.0), 250.0);
    }
}
