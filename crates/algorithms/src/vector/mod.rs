//! Vector operations on administrative-unit layers
//!
//! - Rasterize: burn an attribute onto a grid, per-feature pixel coverage
//! - Overlap: compare summed polygon area with the union area

mod overlap;
mod rasterize;

pub use overlap::{measure_overlap, OverlapReport};
pub use rasterize::{feature_coverage, rasterize_attribute};
