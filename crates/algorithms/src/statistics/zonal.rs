//! Zonal statistics
//!
//! Sums raster values inside each feature of a polygon layer. A feature's
//! zone is its pixel coverage (see [`feature_coverage`]), computed once and
//! reused for every raster on the same grid. Zones may overlap: a pixel
//! under two features counts toward both.

use crate::maybe_rayon::*;
use crate::vector::feature_coverage;
use greenaccess_core::crs::ensure_compatible;
use greenaccess_core::raster::{Raster, RasterElement};
use greenaccess_core::vector::FeatureCollection;
use greenaccess_core::{Error, GeoTransform, Result};

/// Result of zonal statistics for one feature
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZonalSum {
    /// Valid pixels in the zone
    pub count: usize,
    /// Nodata pixels in the zone
    pub nodata_count: usize,
    /// Sum of valid pixel values
    pub sum: f64,
}

/// Per-feature pixel coverage of a layer on one grid
#[derive(Debug, Clone)]
pub struct Zones {
    cells: Vec<Vec<usize>>,
    rows: usize,
    cols: usize,
    transform: GeoTransform,
}

impl Zones {
    /// Compute the coverage of every feature, in layer order, on the grid of
    /// `template`.
    pub fn from_features<T: RasterElement>(
        features: &FeatureCollection,
        template: &Raster<T>,
    ) -> Result<Self> {
        ensure_compatible(features.crs.as_ref(), template.crs())?;
        let (rows, cols) = template.shape();
        let transform = *template.transform();
        let cells = features
            .iter()
            .map(|f| feature_coverage(&f.polygons(), &transform, rows, cols))
            .collect();
        Ok(Self {
            cells,
            rows,
            cols,
            transform,
        })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Sum `values` over every zone, in layer order.
    pub fn sums<T: RasterElement>(&self, values: &Raster<T>) -> Result<Vec<ZonalSum>> {
        if values.shape() != (self.rows, self.cols) {
            return Err(Error::SizeMismatch {
                er: self.rows,
                ec: self.cols,
                ar: values.rows(),
                ac: values.cols(),
            });
        }
        if *values.transform() != self.transform {
            return Err(Error::Algorithm(
                "zonal values are not on the grid the zones were computed for".into(),
            ));
        }
        let data = values
            .data()
            .as_slice()
            .ok_or_else(|| Error::Algorithm("raster data is not contiguous".into()))?;

        Ok((&self.cells)
            .into_par_iter()
            .map(|cells| {
                let mut stat = ZonalSum::default();
                for &idx in cells {
                    let v = data[idx];
                    match v.to_f64() {
                        Some(x) if !values.is_nodata(v) => {
                            stat.count += 1;
                            stat.sum += x;
                        }
                        _ => stat.nodata_count += 1,
                    }
                }
                stat
            })
            .collect())
    }
}

/// Sum `values` inside every feature of `features`.
pub fn zonal_sums<T: RasterElement>(
    values: &Raster<T>,
    features: &FeatureCollection,
) -> Result<Vec<ZonalSum>> {
    Zones::from_features(features, values)?.sums(values)
}
