//! Categorical raster operations
//!
//! - Reclassify: exact value-map reclassification of coded rasters

mod reclassify;

pub use reclassify::{reclassify, ReclassifyParams};
