//! # GreenAccess Algorithms
//!
//! Raster and vector operators behind the greenspace accessibility model.
//!
//! ## Available Algorithm Categories
//!
//! - **kernel**: distance-decay kernels
//! - **resample**: square pixels, grid warping, mass-conserving population resampling
//! - **convolve**: nodata-aware 2-D convolution (direct and FFT)
//! - **imagery**: reclassification of coded rasters
//! - **access**: 2SFCA ratio, budget and combination algebra
//! - **vector**: polygon rasterization and overlap measurement
//! - **statistics**: zonal sums

pub(crate) mod maybe_rayon;

pub mod access;
pub mod convolve;
pub mod imagery;
pub mod kernel;
pub mod resample;
pub mod statistics;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::access::{
        filter_population, greenspace_area, greenspace_budget, greenspace_population_ratio,
        multiply, nodata_sum, supply_demand, weighted_sum, GreenspaceParams, SupplyFilter,
    };
    pub use crate::convolve::{convolve, convolve_and_clamp, ConvolutionMethod, ConvolveParams};
    pub use crate::imagery::{reclassify, ReclassifyParams};
    pub use crate::kernel::{decay_kernel, DecayFunction, DecayKernelParams};
    pub use crate::resample::{
        resample_population, square_off_pixels, warp, GridSpec, ResampleMethod,
    };
    pub use crate::statistics::{zonal_sums, ZonalSum, Zones};
    pub use crate::vector::{measure_overlap, rasterize_attribute, OverlapReport};
    pub use greenaccess_core::prelude::*;
}
