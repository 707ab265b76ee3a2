//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;

pub use element::{RasterElement, SampleKind};
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};

/// Nodata for integer feature-ID rasters
pub const UINT32_NODATA: u32 = u32::MAX;
/// Nodata for every derived floating-point raster
pub const FLOAT32_NODATA: f32 = f32::MIN;
/// Nodata reserved for byte-typed auxiliary rasters
pub const BYTE_NODATA: u8 = 255;
