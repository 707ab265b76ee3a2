//! Greenspace-population ratio (the first 2SFCA step)

use greenaccess_core::raster::Raster;
use greenaccess_core::Result;

use super::pixelwise;

/// Catchment populations at or below this are treated as degenerate; the
/// ratio then falls back to the greenspace area itself.
const DEGENERATE_POPULATION: f64 = 1.0;

/// Areas this close to zero count as non-greenspace
const AREA_EPSILON: f64 = 1e-8;

fn ratio(area: Option<f64>, population: Option<f64>) -> Option<f64> {
    let area = area?;
    if area.abs() <= AREA_EPSILON {
        return Some(0.0);
    }
    let population = population?;
    let r = if population <= DEGENERATE_POPULATION {
        area
    } else {
        area / population
    };
    Some(r.max(0.0))
}

/// Ratio of greenspace area to decayed catchment population.
///
/// Non-greenspace pixels (area 0) are 0 whenever the area is valid. On
/// greenspace pixels the ratio is `area / population`, or `area` when the
/// population is at most 1 person; negative results are floored to 0.
/// Nodata in the area, or in the population of a greenspace pixel, gives
/// nodata.
pub fn greenspace_population_ratio(
    greenspace_area: &Raster<f32>,
    decayed_population: &Raster<f32>,
) -> Result<Raster<f32>> {
    pixelwise(&[greenspace_area, decayed_population], |v| ratio(v[0], v[1]))
}
