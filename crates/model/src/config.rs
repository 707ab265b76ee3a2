//! Model arguments and their validation
//!
//! [`ModelArgs`] mirrors what a user supplies, with string keys for the
//! decay function and search-radius mode. [`ModelArgs::validate`] checks
//! them without touching the filesystem and returns the typed
//! [`ValidatedArgs`] the pipeline runs on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use greenaccess_algorithms::kernel::DecayFunction;
use greenaccess_core::{Error, Result};
use greenaccess_parallel::ProcessingMode;

/// How search radii are assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchRadiusMode {
    /// One radius for every greenspace class and population group
    #[serde(rename = "radius_uniform")]
    Uniform,
    /// A radius per greenspace land-cover class, from the LULC table
    #[serde(rename = "radius_per_greenspace_class")]
    PerGreenspaceClass,
    /// A radius per population group, from the radii table
    #[serde(rename = "radius_per_pop_group")]
    PerPopGroup,
}

impl SearchRadiusMode {
    pub const ALL: [SearchRadiusMode; 3] = [
        SearchRadiusMode::Uniform,
        SearchRadiusMode::PerGreenspaceClass,
        SearchRadiusMode::PerPopGroup,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            SearchRadiusMode::Uniform => "radius_uniform",
            SearchRadiusMode::PerGreenspaceClass => "radius_per_greenspace_class",
            SearchRadiusMode::PerPopGroup => "radius_per_pop_group",
        }
    }
}

impl fmt::Display for SearchRadiusMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SearchRadiusMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.key() == key)
            .ok_or_else(|| Error::InvalidParameter {
                name: "search_radius_mode",
                value: s.to_string(),
                reason: format!(
                    "must be one of {}",
                    Self::ALL.map(|m| m.key()).join(", ")
                ),
            })
    }
}

/// Arguments of one model run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelArgs {
    /// Directory receiving `output/` and `intermediate/`
    pub workspace_dir: PathBuf,
    /// Appended to every output file stem
    #[serde(default)]
    pub results_suffix: String,
    /// Absent or negative: sequential; 0: all cores; n: n threads
    #[serde(default)]
    pub n_workers: Option<i64>,
    /// Land-use/land-cover GeoTIFF, linearly projected in metres
    pub lulc_raster_path: PathBuf,
    /// CSV with `lucode`, `greenspace` and optionally `search_radius_m`
    pub lulc_attribute_table: PathBuf,
    /// Population count GeoTIFF
    pub population_raster_path: PathBuf,
    /// Administrative units, GeoJSON polygons with optional `pop_*` fields
    pub aoi_vector_path: PathBuf,
    /// Required greenspace in m² per capita
    pub greenspace_demand: f64,
    pub decay_function: String,
    #[serde(default)]
    pub decay_function_power_beta: Option<f64>,
    pub search_radius_mode: String,
    /// Radius in metres for the uniform mode
    #[serde(default)]
    pub search_radius: Option<f64>,
    /// CSV with `pop_group` and `search_radius_m`, for the per-group mode
    #[serde(default)]
    pub population_group_radii_table: Option<PathBuf>,
    /// Also report under/oversupplied population per group
    #[serde(default)]
    pub aggregate_by_pop_group: bool,
}

/// Arguments after validation, with typed options
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedArgs {
    pub decay: DecayFunction,
    pub mode: SearchRadiusMode,
    pub demand: f64,
    /// Set for [`SearchRadiusMode::Uniform`]
    pub uniform_radius: Option<f64>,
    /// Set for [`SearchRadiusMode::PerPopGroup`]
    pub radii_table: Option<PathBuf>,
    pub processing: ProcessingMode,
    /// Normalized suffix, empty or starting with `_`
    pub suffix: String,
}

impl ModelArgs {
    /// Load arguments from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Check every argument that can be checked without reading inputs.
    pub fn validate(&self) -> Result<ValidatedArgs> {
        if !(self.greenspace_demand.is_finite() && self.greenspace_demand > 0.0) {
            return Err(Error::InvalidParameter {
                name: "greenspace_demand",
                value: self.greenspace_demand.to_string(),
                reason: "must be a positive number of m² per capita".into(),
            });
        }

        let decay = DecayFunction::parse(&self.decay_function, self.decay_function_power_beta)?;
        let mode: SearchRadiusMode = self.search_radius_mode.parse()?;

        let uniform_radius = match (mode, self.search_radius) {
            (SearchRadiusMode::Uniform, Some(r)) if r.is_finite() && r > 0.0 => Some(r),
            (SearchRadiusMode::Uniform, other) => {
                return Err(Error::InvalidParameter {
                    name: "search_radius",
                    value: other.map_or_else(|| "none".into(), |r| r.to_string()),
                    reason: "a positive radius in metres is required for radius_uniform".into(),
                })
            }
            _ => None,
        };

        let radii_table = match (mode, &self.population_group_radii_table) {
            (SearchRadiusMode::PerPopGroup, Some(path)) => Some(path.clone()),
            (SearchRadiusMode::PerPopGroup, None) => {
                return Err(Error::InvalidParameter {
                    name: "population_group_radii_table",
                    value: "none".into(),
                    reason: "required for radius_per_pop_group".into(),
                })
            }
            _ => None,
        };

        Ok(ValidatedArgs {
            decay,
            mode,
            demand: self.greenspace_demand,
            uniform_radius,
            radii_table,
            processing: ProcessingMode::from_workers(self.n_workers),
            suffix: normalize_suffix(&self.results_suffix),
        })
    }
}

/// `""` stays empty, anything else gains a leading underscore if missing
pub fn normalize_suffix(suffix: &str) -> String {
    let suffix = suffix.trim();
    if suffix.is_empty() || suffix.starts_with('_') {
        suffix.to_string()
    } else {
        format!("_{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ModelArgs {
        ModelArgs {
            workspace_dir: "ws".into(),
            results_suffix: String::new(),
            n_workers: None,
            lulc_raster_path: "lulc.tif".into(),
            lulc_attribute_table: "lulc.csv".into(),
            population_raster_path: "pop.tif".into(),
            aoi_vector_path: "aois.geojson".into(),
            greenspace_demand: 10.0,
            decay_function: "dichotomy".into(),
            decay_function_power_beta: None,
            search_radius_mode: "radius_uniform".into(),
            search_radius: Some(100.0),
            population_group_radii_table: None,
            aggregate_by_pop_group: false,
        }
    }

    #[test]
    fn test_valid_uniform() {
        let v = args().validate().unwrap();
        assert_eq!(v.mode, SearchRadiusMode::Uniform);
        assert_eq!(v.decay, DecayFunction::Dichotomy);
        assert_eq!(v.uniform_radius, Some(100.0));
        assert_eq!(v.processing, ProcessingMode::Sequential);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let mut a = args();
        a.search_radius_mode = "radius_by_magic".into();
        assert!(matches!(
            a.validate(),
            Err(Error::InvalidParameter { name: "search_radius_mode", .. })
        ));

        let mut a = args();
        a.decay_function = "linear".into();
        assert!(matches!(
            a.validate(),
            Err(Error::InvalidParameter { name: "decay_function", .. })
        ));
    }

    #[test]
    fn test_power_needs_negative_beta() {
        let mut a = args();
        a.decay_function = "power".into();
        assert!(a.validate().is_err());
        a.decay_function_power_beta = Some(0.5);
        assert!(a.validate().is_err());
        a.decay_function_power_beta = Some(-0.5);
        assert_eq!(a.validate().unwrap().decay, DecayFunction::Power { beta: -0.5 });
    }

    #[test]
    fn test_mode_specific_requirements() {
        let mut a = args();
        a.search_radius = Some(0.0);
        assert!(a.validate().is_err());

        let mut a = args();
        a.search_radius_mode = "radius_per_pop_group".into();
        assert!(a.validate().is_err());
        a.population_group_radii_table = Some("radii.csv".into());
        let v = a.validate().unwrap();
        assert_eq!(v.uniform_radius, None);
        assert_eq!(v.radii_table, Some(PathBuf::from("radii.csv")));
    }

    #[test]
    fn test_demand_must_be_positive() {
        let mut a = args();
        a.greenspace_demand = 0.0;
        assert!(a.validate().is_err());
        a.greenspace_demand = f64::NAN;
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_from_json_defaults() {
        let json = r#"{
            "workspace_dir": "ws",
            "lulc_raster_path": "lulc.tif",
            "lulc_attribute_table": "lulc.csv",
            "population_raster_path": "pop.tif",
            "aoi_vector_path": "aois.geojson",
            "greenspace_demand": 10,
            "decay_function": "gaussian",
            "search_radius_mode": "radius_per_greenspace_class",
            "n_workers": 0
        }"#;
        let a: ModelArgs = serde_json::from_str(json).unwrap();
        assert!(!a.aggregate_by_pop_group);
        let v = a.validate().unwrap();
        assert_eq!(v.mode, SearchRadiusMode::PerGreenspaceClass);
        assert_eq!(v.processing, ProcessingMode::Parallel);
    }

    #[test]
    fn test_suffix_normalization() {
        assert_eq!(normalize_suffix(""), "");
        assert_eq!(normalize_suffix("run1"), "_run1");
        assert_eq!(normalize_suffix("_run1"), "_run1");
    }
}
