//! Coordinate Reference System handling
//!
//! Only linearly projected systems measured in metres are accepted by the
//! accessibility model; geographic (degree-based) systems are detected and
//! rejected before any distance math runs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Coordinate Reference System, identified by EPSG code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self { epsg: Some(code) }
    }

    /// Parse an OGC CRS name as found in GeoJSON `crs` members, e.g.
    /// `urn:ogc:def:crs:EPSG::32631` or `EPSG:32631`.
    pub fn from_ogc_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Some(Self::from_epsg(4326));
        }
        let idx = upper.rfind("EPSG")?;
        let code: String = upper[idx + 4..]
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        code.parse().ok().map(Self::from_epsg)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// OGC URN for this CRS, used when writing GeoJSON.
    pub fn ogc_urn(&self) -> Option<String> {
        self.epsg.map(|code| format!("urn:ogc:def:crs:EPSG::{}", code))
    }

    /// Whether this is a geographic (degree-based) CRS.
    ///
    /// EPSG codes in the 4000-4999 block are geographic 2D/3D systems.
    pub fn is_geographic(&self) -> bool {
        self.epsg.is_some_and(|code| (4000..5000).contains(&code))
    }

    /// Size of one linear unit in metres.
    ///
    /// Projected inputs are required to be in metres, so this is `1.0` for
    /// every accepted CRS and an error for geographic systems.
    pub fn linear_units(&self) -> Result<f64> {
        if self.is_geographic() {
            return Err(Error::InvalidParameter {
                name: "crs",
                value: self.identifier(),
                reason: "must be a linear projection in metres, not geographic".into(),
            });
        }
        Ok(1.0)
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        matches!((self.epsg, other.epsg), (Some(a), Some(b)) if a == b)
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Fail unless two optional CRSs are compatible.
///
/// A missing CRS on either side is accepted; it is assumed to share the
/// other side's projection.
pub fn ensure_compatible(a: Option<&CRS>, b: Option<&CRS>) -> Result<()> {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_equivalent(b) => {
            Err(Error::CrsMismatch(a.identifier(), b.identifier()))
        }
        _ => Ok(()),
    }
}
