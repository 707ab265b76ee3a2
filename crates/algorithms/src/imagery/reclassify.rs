//! Raster reclassification
//!
//! Reclassify integer-coded rasters through an exact value map. Every code
//! found in the raster must have an entry; a missing entry is reported with
//! the raster, table and column it was looked up in.

use ndarray::Array2;
use std::collections::HashMap;
use crate::maybe_rayon::*;
use greenaccess_core::raster::{Raster, RasterElement, FLOAT32_NODATA};
use greenaccess_core::{Error, Result};

/// Parameters for reclassification
#[derive(Debug, Clone, Default)]
pub struct ReclassifyParams {
    /// Output value per input code
    pub values: HashMap<i64, f64>,
    /// Names used in a mapping error
    pub raster_name: String,
    pub table_name: String,
    pub column: String,
}

impl ReclassifyParams {
    pub fn new(values: HashMap<i64, f64>) -> Self {
        Self {
            values,
            raster_name: "raster".into(),
            table_name: "table".into(),
            column: "value".into(),
        }
    }

    /// Name the raster, table and column for error reporting
    pub fn described(
        mut self,
        raster_name: impl Into<String>,
        table_name: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        self.raster_name = raster_name.into();
        self.table_name = table_name.into();
        self.column = column.into();
        self
    }

    fn missing(&self, value: String) -> Error {
        Error::Mapping {
            raster: self.raster_name.clone(),
            column: self.column.clone(),
            table: self.table_name.clone(),
            value,
        }
    }
}

/// Reclassify every valid cell through `params.values`.
///
/// The output is float32 with the float32 nodata sentinel wherever the input
/// is nodata. A non-integral cell value or a code absent from the map fails
/// with [`Error::Mapping`]; the reported value is the first offending cell
/// in row-major order.
pub fn reclassify<T: RasterElement>(raster: &Raster<T>, params: &ReclassifyParams) -> Result<Raster<f32>> {
    let (rows, cols) = raster.shape();

    let row_results: Vec<std::result::Result<Vec<f32>, String>> = (0..rows)
        .into_par_iter()
        .map(|row| {
            let mut row_data = vec![FLOAT32_NODATA; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let val = unsafe { raster.get_unchecked(row, col) };
                if raster.is_nodata(val) {
                    continue;
                }
                let code = val
                    .to_f64()
                    .filter(|v| v.fract() == 0.0)
                    .and_then(num_traits::cast::<f64, i64>);
                let mapped = code.and_then(|c| params.values.get(&c));
                match mapped {
                    Some(&v) => *out = v as f32,
                    None => return Err(format!("{:?}", val)),
                }
            }
            Ok(row_data)
        })
        .collect();

    let mut data = Vec::with_capacity(rows * cols);
    for row in row_results {
        data.extend(row.map_err(|value| params.missing(value))?);
    }

    let mut output = raster.with_same_meta::<f32>(rows, cols);
    output.set_nodata(Some(FLOAT32_NODATA));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}
