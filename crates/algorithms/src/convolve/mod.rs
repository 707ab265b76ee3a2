//! Nodata-aware 2-D convolution
//!
//! The signal's nodata pixels contribute zero and stay nodata in the
//! output; pixels beyond the raster edge also contribute zero. The kernel is
//! centred on its middle pixel and never normalized, so convolving a
//! population raster with a decay kernel yields decayed population counts.

mod fft;

use ndarray::Array2;
use tracing::debug;

use crate::maybe_rayon::*;
use greenaccess_core::raster::{Raster, FLOAT32_NODATA};
use greenaccess_core::{Algorithm, Error, Result};

/// Kernels with more taps than this use the FFT path under `Auto`
const FFT_TAP_THRESHOLD: usize = 625;

/// How the convolution sum is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvolutionMethod {
    /// Direct for small kernels, FFT for large ones
    #[default]
    Auto,
    /// Sum over non-zero kernel taps
    Direct,
    /// Frequency-domain product
    Fft,
}

/// Parameters for convolution
#[derive(Debug, Clone, Default)]
pub struct ConvolveParams {
    pub method: ConvolutionMethod,
    /// Floor negative results at zero, leaving nodata untouched
    pub clamp_negative: bool,
}

/// Convolution algorithm
#[derive(Debug, Clone, Default)]
pub struct Convolve;

impl Algorithm for Convolve {
    type Input = (Raster<f32>, Raster<f32>);
    type Output = Raster<f32>;
    type Params = ConvolveParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Convolve"
    }

    fn description(&self) -> &'static str {
        "Nodata-aware 2-D convolution of a signal raster with a kernel raster"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        convolve(&input.0, &input.1, &params)
    }
}

/// Convolve `signal` with `kernel`.
///
/// The output has the signal's shape, georeference and the float32 nodata
/// sentinel.
pub fn convolve(signal: &Raster<f32>, kernel: &Raster<f32>, params: &ConvolveParams) -> Result<Raster<f32>> {
    let (rows, cols) = signal.shape();
    let (k_rows, k_cols) = kernel.shape();
    if k_rows == 0 || k_cols == 0 {
        return Err(Error::Algorithm("convolution kernel is empty".into()));
    }

    let values: Vec<f64> = signal
        .data()
        .iter()
        .map(|&v| if signal.is_nodata(v) { 0.0 } else { v as f64 })
        .collect();
    let weights: Vec<f64> = kernel
        .data()
        .iter()
        .map(|&w| if kernel.is_nodata(w) { 0.0 } else { w as f64 })
        .collect();

    let taps = weights.iter().filter(|w| **w != 0.0).count();
    let use_fft = match params.method {
        ConvolutionMethod::Direct => false,
        ConvolutionMethod::Fft => true,
        ConvolutionMethod::Auto => taps > FFT_TAP_THRESHOLD,
    };
    debug!(
        "convolving {}x{} raster with {}x{} kernel ({} taps, {})",
        rows,
        cols,
        k_rows,
        k_cols,
        taps,
        if use_fft { "fft" } else { "direct" }
    );

    let sums = if use_fft {
        fft_same(&values, rows, cols, &weights, k_rows, k_cols)
    } else {
        direct_same(&values, rows, cols, &weights, k_rows, k_cols)
    };

    let data: Vec<f32> = sums
        .into_iter()
        .zip(signal.data().iter())
        .map(|(sum, &src)| {
            if signal.is_nodata(src) {
                FLOAT32_NODATA
            } else if params.clamp_negative && sum < 0.0 {
                0.0
            } else {
                sum as f32
            }
        })
        .collect();

    let mut output = signal.with_same_meta::<f32>(rows, cols);
    output.set_nodata(Some(FLOAT32_NODATA));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Convolve and floor negative values at zero.
///
/// Used wherever a decayed population feeds a ratio denominator.
pub fn convolve_and_clamp(signal: &Raster<f32>, kernel: &Raster<f32>) -> Result<Raster<f32>> {
    convolve(
        signal,
        kernel,
        &ConvolveParams {
            method: ConvolutionMethod::Auto,
            clamp_negative: true,
        },
    )
}

fn direct_same(
    values: &[f64],
    rows: usize,
    cols: usize,
    weights: &[f64],
    k_rows: usize,
    k_cols: usize,
) -> Vec<f64> {
    let (hr, hc) = ((k_rows / 2) as isize, (k_cols / 2) as isize);
    // out[r][c] = sum k[i][j] * s[r + hr - i][c + hc - j]
    let taps: Vec<(isize, isize, f64)> = weights
        .iter()
        .enumerate()
        .filter(|(_, w)| **w != 0.0)
        .map(|(idx, &w)| {
            let (i, j) = ((idx / k_cols) as isize, (idx % k_cols) as isize);
            (hr - i, hc - j, w)
        })
        .collect();

    (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0.0; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let mut sum = 0.0;
                for &(dr, dc, w) in &taps {
                    let r = row as isize + dr;
                    let c = col as isize + dc;
                    if r >= 0 && c >= 0 && (r as usize) < rows && (c as usize) < cols {
                        sum += w * values[r as usize * cols + c as usize];
                    }
                }
                *out = sum;
            }
            row_data
        })
        .collect()
}

fn fft_same(
    values: &[f64],
    rows: usize,
    cols: usize,
    weights: &[f64],
    k_rows: usize,
    k_cols: usize,
) -> Vec<f64> {
    let full = fft::full_convolution(values, rows, cols, weights, k_rows, k_cols);
    let full_cols = cols + k_cols - 1;
    let (hr, hc) = (k_rows / 2, k_cols / 2);
    let mut out = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        let start = (r + hr) * full_cols + hc;
        out.extend_from_slice(&full[start..start + cols]);
    }
    out
}
