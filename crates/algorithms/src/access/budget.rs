//! Per-capita budget and supply classification

use greenaccess_core::raster::Raster;
use greenaccess_core::Result;

use super::pixelwise;

/// Which side of a zero budget a population filter keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplyFilter {
    /// Budget below zero
    Undersupplied,
    /// Budget above zero
    Oversupplied,
}

impl SupplyFilter {
    fn matches(&self, budget: f64) -> bool {
        match self {
            SupplyFilter::Undersupplied => budget < 0.0,
            SupplyFilter::Oversupplied => budget > 0.0,
        }
    }
}

/// Per-capita greenspace budget, `supply - demand`.
///
/// Valid wherever the supply is valid.
pub fn greenspace_budget(supply: &Raster<f32>, demand: f64) -> Result<Raster<f32>> {
    pixelwise(&[supply], |v| v[0].map(|s| s - demand))
}

/// Total supply-demand, `budget * population`
pub fn supply_demand(budget: &Raster<f32>, population: &Raster<f32>) -> Result<Raster<f32>> {
    multiply(budget, population)
}

/// Product of two rasters, valid where both are valid
pub fn multiply(a: &Raster<f32>, b: &Raster<f32>) -> Result<Raster<f32>> {
    pixelwise(&[a, b], |v| Some(v[0]? * v[1]?))
}

/// Population where the budget matches `filter`, zero elsewhere.
///
/// Valid wherever both the population and the budget are valid.
pub fn filter_population(
    population: &Raster<f32>,
    budget: &Raster<f32>,
    filter: SupplyFilter,
) -> Result<Raster<f32>> {
    pixelwise(&[population, budget], |v| {
        let (pop, budget) = (v[0]?, v[1]?);
        Some(if filter.matches(budget) { pop } else { 0.0 })
    })
}
