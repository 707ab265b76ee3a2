//! Two-step floating catchment area (2SFCA) raster algebra
//!
//! Per-pixel operators over float32 rasters that all emit the float32
//! nodata sentinel:
//! - **greenspace**: land-cover codes to eligible greenspace area
//! - **ratio**: greenspace area per decayed population
//! - **budget**: per-capita budget, supply-demand totals, under/over-supplied population
//! - **combine**: nodata-aware sums and weighted sums across rasters

mod budget;
mod combine;
mod greenspace;
mod ratio;

pub use budget::{filter_population, greenspace_budget, multiply, supply_demand, SupplyFilter};
pub use combine::{nodata_sum, weighted_sum};
pub use greenspace::{greenspace_area, GreenspaceParams};
pub use ratio::greenspace_population_ratio;

use ndarray::Array2;
use crate::maybe_rayon::*;
use greenaccess_core::raster::{Raster, FLOAT32_NODATA};
use greenaccess_core::{Error, Result};

/// Valid value of a pixel as f64, `None` for nodata
#[inline]
pub(crate) fn valid_at(raster: &Raster<f32>, row: usize, col: usize) -> Option<f64> {
    let v = unsafe { raster.get_unchecked(row, col) };
    if raster.is_nodata(v) {
        None
    } else {
        Some(v as f64)
    }
}

/// Combine `inputs` pixel by pixel. `f` sees `None` for nodata operands and
/// returns `None` for a nodata output. The first input supplies the
/// output's georeference.
pub(crate) fn pixelwise<F>(inputs: &[&Raster<f32>], f: F) -> Result<Raster<f32>>
where
    F: Fn(&[Option<f64>]) -> Option<f64> + Sync + Send,
{
    let first = inputs
        .first()
        .ok_or_else(|| Error::Algorithm("pixelwise operation needs at least one raster".into()))?;
    for other in &inputs[1..] {
        first.check_same_shape(other)?;
    }

    let (rows, cols) = first.shape();
    let data: Vec<f32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut values = vec![None; inputs.len()];
            let mut row_data = vec![FLOAT32_NODATA; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                for (slot, raster) in values.iter_mut().zip(inputs) {
                    *slot = valid_at(raster, row, col);
                }
                if let Some(v) = f(&values) {
                    *out = v as f32;
                }
            }
            row_data
        })
        .collect();

    let mut output = first.with_same_meta::<f32>(rows, cols);
    output.set_nodata(Some(FLOAT32_NODATA));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}
