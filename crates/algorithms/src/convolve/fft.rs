//! Frequency-domain linear convolution
//!
//! Row-column decomposition: rows are transformed in place, columns by
//! transposing, transforming rows again and transposing back.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::sync::Arc;

use crate::maybe_rayon::*;

fn fft_rows(data: &mut [Complex<f64>], width: usize, fft: &Arc<dyn Fft<f64>>) {
    data.par_chunks_mut(width).for_each(|row| fft.process(row));
}

fn transpose(data: &[Complex<f64>], rows: usize, cols: usize) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::new(0.0, 0.0); rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = data[r * cols + c];
        }
    }
    out
}

fn fft2(
    planner: &mut FftPlanner<f64>,
    mut data: Vec<Complex<f64>>,
    rows: usize,
    cols: usize,
    direction: FftDirection,
) -> Vec<Complex<f64>> {
    let row_fft = planner.plan_fft(cols, direction);
    let col_fft = planner.plan_fft(rows, direction);
    fft_rows(&mut data, cols, &row_fft);
    let mut cols_major = transpose(&data, rows, cols);
    fft_rows(&mut cols_major, rows, &col_fft);
    transpose(&cols_major, cols, rows)
}

/// Full linear convolution of `signal` (`rows x cols`) with `kernel`
/// (`k_rows x k_cols`), both row-major. The result has shape
/// `(rows + k_rows - 1, cols + k_cols - 1)`.
pub(super) fn full_convolution(
    signal: &[f64],
    rows: usize,
    cols: usize,
    kernel: &[f64],
    k_rows: usize,
    k_cols: usize,
) -> Vec<f64> {
    let p_rows = rows + k_rows - 1;
    let p_cols = cols + k_cols - 1;

    let pad = |src: &[f64], h: usize, w: usize| {
        let mut out = vec![Complex::new(0.0, 0.0); p_rows * p_cols];
        for r in 0..h {
            for c in 0..w {
                out[r * p_cols + c] = Complex::new(src[r * w + c], 0.0);
            }
        }
        out
    };

    let mut planner = FftPlanner::new();
    let s = fft2(&mut planner, pad(signal, rows, cols), p_rows, p_cols, FftDirection::Forward);
    let k = fft2(&mut planner, pad(kernel, k_rows, k_cols), p_rows, p_cols, FftDirection::Forward);

    let product: Vec<Complex<f64>> = s.iter().zip(&k).map(|(a, b)| a * b).collect();
    let scale = 1.0 / (p_rows * p_cols) as f64;
    fft2(&mut planner, product, p_rows, p_cols, FftDirection::Inverse)
        .into_iter()
        .map(|z| z.re * scale)
        .collect()
}
