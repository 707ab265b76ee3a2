//! Pixel geometry normalization

use greenaccess_core::raster::{Raster, RasterElement};
use greenaccess_core::{GeoTransform, CRS};

/// Sign-preserving square pixel size.
///
/// Both sides become the mean of the absolute source sizes, each keeping the
/// sign of its axis. Already-square pixels are returned unchanged.
pub fn square_off_pixels(pixel_size: (f64, f64)) -> (f64, f64) {
    let (w, h) = pixel_size;
    if w.abs() == h.abs() {
        return pixel_size;
    }
    let side = (w.abs() + h.abs()) / 2.0;
    (side.copysign(w), side.copysign(h))
}

/// Target grid of a resampling operation
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    /// Signed `(width, height)` of one pixel
    pub pixel_size: (f64, f64),
    /// `(min_x, min_y, max_x, max_y)`
    pub bounds: (f64, f64, f64, f64),
    pub crs: Option<CRS>,
}

impl GridSpec {
    /// The grid a raster already sits on
    pub fn of<T: RasterElement>(raster: &Raster<T>) -> Self {
        Self {
            pixel_size: raster.pixel_size(),
            bounds: raster.bounds(),
            crs: raster.crs().cloned(),
        }
    }

    /// Same extent and CRS with a different pixel size
    pub fn with_pixel_size(mut self, pixel_size: (f64, f64)) -> Self {
        self.pixel_size = pixel_size;
        self
    }

    /// `(rows, cols)` needed to cover the bounds, at least one of each
    pub fn shape(&self) -> (usize, usize) {
        let (min_x, min_y, max_x, max_y) = self.bounds;
        let cols = ((max_x - min_x) / self.pixel_size.0.abs()).round().max(1.0);
        let rows = ((max_y - min_y) / self.pixel_size.1.abs()).round().max(1.0);
        (rows as usize, cols as usize)
    }

    /// North-up transform anchored on the bounds corner matching the pixel signs
    pub fn transform(&self) -> GeoTransform {
        let (min_x, min_y, max_x, max_y) = self.bounds;
        let (w, h) = self.pixel_size;
        let origin_x = if w >= 0.0 { min_x } else { max_x };
        let origin_y = if h < 0.0 { max_y } else { min_y };
        GeoTransform::new(origin_x, origin_y, w, h)
    }

    /// Absolute pixel area in squared linear units
    pub fn pixel_area(&self) -> f64 {
        (self.pixel_size.0 * self.pixel_size.1).abs()
    }
}
