//! Statistical summaries of raster data
//!
//! - **zonal**: sums of raster values inside polygon zones

pub mod zonal;

pub use zonal::{zonal_sums, ZonalSum, Zones};
