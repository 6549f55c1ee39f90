//! ERA5-Land variable catalogue.
//!
//! The provider's request API uses long display names (`2m_temperature`)
//! while the NetCDF files it returns use short internal codes (`t2m`). Every
//! translation between the two goes through [`VariableCodeMapper`] so that
//! provider codes never leak into user-facing output.

use serde::Serialize;

use crate::error::{ExtractionError, ExtractionResult};

/// One entry of the variable catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct VariableSpec {
    /// Short code used inside the NetCDF file (e.g. `t2m`).
    pub internal_code: &'static str,
    /// Long name used by the provider request and in all outputs.
    pub display_name: &'static str,
    /// Native unit string.
    pub unit: &'static str,
}

const fn var(
    internal_code: &'static str,
    display_name: &'static str,
    unit: &'static str,
) -> VariableSpec {
    VariableSpec {
        internal_code,
        display_name,
        unit,
    }
}

/// ERA5-Land single-level variables offered for extraction.
pub static ERA5_LAND_VARIABLES: &[VariableSpec] = &[
    var("t2m", "2m_temperature", "K"),
    var("d2m", "2m_dewpoint_temperature", "K"),
    var("skt", "skin_temperature", "K"),
    var("stl1", "soil_temperature_level_1", "K"),
    var("stl2", "soil_temperature_level_2", "K"),
    var("stl3", "soil_temperature_level_3", "K"),
    var("stl4", "soil_temperature_level_4", "K"),
    var("tp", "total_precipitation", "m"),
    var("e", "total_evaporation", "m of water equivalent"),
    var("pev", "potential_evaporation", "m"),
    var("sf", "snowfall", "m of water equivalent"),
    var("sd", "snow_depth", "m of water equivalent"),
    var("asn", "snow_albedo", "(0 - 1)"),
    var("smlt", "snow_melt", "m of water equivalent"),
    var("swvl1", "volumetric_soil_water_layer_1", "m3 m-3"),
    var("swvl2", "volumetric_soil_water_layer_2", "m3 m-3"),
    var("swvl3", "volumetric_soil_water_layer_3", "m3 m-3"),
    var("swvl4", "volumetric_soil_water_layer_4", "m3 m-3"),
    var("ssrd", "surface_solar_radiation_downwards", "J m-2"),
    var("ssr", "surface_net_solar_radiation", "J m-2"),
    var("strd", "surface_thermal_radiation_downwards", "J m-2"),
    var("str", "surface_net_thermal_radiation", "J m-2"),
    var("u10", "10m_u_component_of_wind", "m s-1"),
    var("v10", "10m_v_component_of_wind", "m s-1"),
    var("sp", "surface_pressure", "Pa"),
    var("lai_hv", "leaf_area_index_high_vegetation", "m2 m-2"),
    var("lai_lv", "leaf_area_index_low_vegetation", "m2 m-2"),
    var("ro", "runoff", "m"),
    var("sro", "surface_runoff", "m"),
    var("ssro", "sub_surface_runoff", "m"),
];

/// Bidirectional lookup between internal codes and display names.
#[derive(Debug, Clone, Copy)]
pub struct VariableCodeMapper {
    table: &'static [VariableSpec],
}

impl VariableCodeMapper {
    /// Mapper over the ERA5-Land catalogue.
    pub const fn era5_land() -> Self {
        Self {
            table: ERA5_LAND_VARIABLES,
        }
    }

    /// Translate a display name into its internal code.
    pub fn to_internal(&self, display_name: &str) -> ExtractionResult<&'static str> {
        self.by_display(display_name).map(|spec| spec.internal_code)
    }

    /// Translate an internal code into its display name.
    pub fn to_display(&self, internal_code: &str) -> ExtractionResult<&'static str> {
        self.by_code(internal_code).map(|spec| spec.display_name)
    }

    /// Full spec for a display name.
    pub fn by_display(&self, display_name: &str) -> ExtractionResult<VariableSpec> {
        self.table
            .iter()
            .find(|spec| spec.display_name == display_name)
            .copied()
            .ok_or_else(|| ExtractionError::UnknownVariable(display_name.to_string()))
    }

    /// Full spec for an internal code.
    pub fn by_code(&self, internal_code: &str) -> ExtractionResult<VariableSpec> {
        self.table
            .iter()
            .find(|spec| spec.internal_code == internal_code)
            .copied()
            .ok_or_else(|| ExtractionError::UnknownVariable(internal_code.to_string()))
    }

    pub fn all(&self) -> &'static [VariableSpec] {
        self.table
    }
}

impl Default for VariableCodeMapper {
    fn default() -> Self {
        Self::era5_land()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_lookup() {
        let mapper = VariableCodeMapper::era5_land();
        assert_eq!(mapper.to_internal("2m_temperature").unwrap(), "t2m");
        assert_eq!(mapper.to_display("t2m").unwrap(), "2m_temperature");
        assert_eq!(mapper.by_code("t2m").unwrap().unit, "K");
    }

    #[test]
    fn test_unknown_variable() {
        let mapper = VariableCodeMapper::era5_land();
        assert_eq!(
            mapper.to_internal("air_quality"),
            Err(ExtractionError::UnknownVariable("air_quality".to_string()))
        );
        assert!(mapper.to_display("2m_temperature").is_err());
    }
}
