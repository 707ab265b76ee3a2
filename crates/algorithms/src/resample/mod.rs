//! Grid normalization and resampling
//!
//! - **pixel**: square pixel sizes and target grid specifications
//! - **warp**: nearest and bilinear resampling onto a target grid
//! - **mass**: population resampling that preserves total counts

mod mass;
mod pixel;
mod warp;

pub use mass::resample_population;
pub use pixel::{square_off_pixels, GridSpec};
pub use warp::{warp, ResampleMethod};
