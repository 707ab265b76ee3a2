//! Nodata-aware combination of several rasters
//!
//! Both sums use union-of-validity: a pixel is nodata only when no input
//! contributes a valid term.

use greenaccess_core::raster::Raster;
use greenaccess_core::{Error, Result};

use super::pixelwise;

/// Elementwise sum; nodata terms are skipped
pub fn nodata_sum(rasters: &[&Raster<f32>]) -> Result<Raster<f32>> {
    pixelwise(rasters, |values| {
        values
            .iter()
            .flatten()
            .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
    })
}

/// Elementwise sum of `value * weight` pairs.
///
/// A pair contributes where both its value and its weight are valid.
pub fn weighted_sum(values: &[&Raster<f32>], weights: &[&Raster<f32>]) -> Result<Raster<f32>> {
    if values.len() != weights.len() {
        return Err(Error::InvalidParameter {
            name: "weights",
            value: weights.len().to_string(),
            reason: format!("expected one weight raster per value raster ({})", values.len()),
        });
    }
    let n = values.len();
    let inputs: Vec<&Raster<f32>> = values.iter().chain(weights).copied().collect();
    pixelwise(&inputs, |px| {
        let (vals, wts) = px.split_at(n);
        vals.iter()
            .zip(wts)
            .filter_map(|(v, w)| Some((*v)? * (*w)?))
            .fold(None, |acc, term| Some(acc.unwrap_or(0.0) + term))
    })
}
