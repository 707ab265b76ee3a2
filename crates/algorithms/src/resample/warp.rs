//! Resampling onto a target grid
//!
//! Source and target must share a projection (or either may carry none);
//! only the pixel grid changes. Each target pixel is sampled at its centre.

use ndarray::Array2;
use crate::maybe_rayon::*;
use greenaccess_core::crs::ensure_compatible;
use greenaccess_core::raster::{Raster, RasterElement};
use greenaccess_core::{Error, Result};

use super::GridSpec;

/// Interpolation used when sampling the source grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResampleMethod {
    /// Value of the source pixel containing the target centre
    #[default]
    Nearest,
    /// Weighted mean of the four surrounding source pixel centres; nodata
    /// and out-of-range neighbours are dropped and the remaining weights
    /// renormalized
    Bilinear,
}

/// Resample `source` onto `target`.
///
/// The output keeps the source nodata (or the type's default sentinel when
/// the source has none) and takes the target CRS, falling back to the
/// source CRS.
pub fn warp<T: RasterElement>(
    source: &Raster<T>,
    target: &GridSpec,
    method: ResampleMethod,
) -> Result<Raster<T>> {
    ensure_compatible(source.crs(), target.crs.as_ref())?;

    let (rows, cols) = target.shape();
    let transform = target.transform();
    let nodata = source.nodata().unwrap_or_else(T::default_nodata);
    let (src_rows, src_cols) = source.shape();

    let data: Vec<T> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![nodata; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let (x, y) = transform.pixel_to_geo(col, row);
                let (fc, fr) = source.geo_to_pixel(x, y);
                if !(fc >= 0.0 && fr >= 0.0 && fc < src_cols as f64 && fr < src_rows as f64) {
                    continue;
                }
                let sampled = match method {
                    ResampleMethod::Nearest => {
                        let v = unsafe { source.get_unchecked(fr as usize, fc as usize) };
                        if source.is_nodata(v) {
                            None
                        } else {
                            Some(v)
                        }
                    }
                    ResampleMethod::Bilinear => bilinear(source, fc, fr),
                };
                if let Some(v) = sampled {
                    *out = v;
                }
            }
            row_data
        })
        .collect();

    let mut output = Raster::from_array(
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?,
    );
    output.set_transform(transform);
    output.set_crs(target.crs.clone().or_else(|| source.crs().cloned()));
    output.set_nodata(Some(nodata));
    Ok(output)
}

fn bilinear<T: RasterElement>(source: &Raster<T>, fc: f64, fr: f64) -> Option<T> {
    let (rows, cols) = source.shape();
    // fractional position relative to pixel centres
    let cx = fc - 0.5;
    let cy = fr - 0.5;
    let c0 = cx.floor();
    let r0 = cy.floor();
    let tx = cx - c0;
    let ty = cy - r0;

    let mut acc = 0.0;
    let mut weight = 0.0;
    for (dr, wy) in [(0.0, 1.0 - ty), (1.0, ty)] {
        for (dc, wx) in [(0.0, 1.0 - tx), (1.0, tx)] {
            let w = wx * wy;
            let r = r0 + dr;
            let c = c0 + dc;
            if w <= 0.0 || r < 0.0 || c < 0.0 || r >= rows as f64 || c >= cols as f64 {
                continue;
            }
            let v = unsafe { source.get_unchecked(r as usize, c as usize) };
            if source.is_nodata(v) {
                continue;
            }
            if let Some(v) = v.to_f64() {
                acc += v * w;
                weight += w;
            }
        }
    }

    if weight <= 1e-12 {
        return None;
    }
    num_traits::cast(acc / weight)
}
