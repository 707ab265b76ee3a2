//! # GreenAccess Core
//!
//! Core types, traits and I/O for the GreenAccess urban greenspace
//! accessibility engine.
//!
//! This crate provides:
//! - `Raster<T>`: generic georeferenced grid with a typed, per-raster nodata
//! - `GeoTransform`: affine transformation for georeferencing
//! - `CRS`: projection identity and the linear-units check
//! - `FeatureCollection`: polygon layers with an ordered field schema
//! - I/O for GeoTIFF, GeoJSON and CSV tables

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement, FLOAT32_NODATA};
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection};
    pub use crate::Algorithm;
}

/// Core trait for raster operators.
///
/// Operators are pure functions that transform input data according to
/// parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
