//! Decay kernel synthesis
//!
//! A kernel of radius `R` (in pixels) is a square window of side
//! `2 * ceil(R) + 1`. The weight at offset `(dy, dx)` from the centre is
//! `f(hypot(dy, dx), R)` and zero wherever the distance exceeds `R`.

use ndarray::Array2;
use std::fmt;
use tracing::debug;

use greenaccess_core::raster::{Raster, FLOAT32_NODATA};
use greenaccess_core::{Algorithm, Error, GeoTransform, Result};

/// Distance-decay function applied inside the search radius
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DecayFunction {
    /// Every pixel within the radius counts fully
    #[default]
    Dichotomy,
    /// `exp(-d/R)`
    Exponential,
    /// Truncated normal reaching exactly 0 at `d = R`
    Gaussian,
    /// Epanechnikov-style `0.75 * (1 - (d/R)^2)`
    Density,
    /// `d^beta`, with `beta < 0`
    Power { beta: f64 },
}

impl DecayFunction {
    /// Parse a decay key, validating `beta` for the power function.
    ///
    /// Keys are case-insensitive. `beta` is ignored for every other key.
    pub fn parse(key: &str, beta: Option<f64>) -> Result<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "dichotomy" => Ok(DecayFunction::Dichotomy),
            "exponential" => Ok(DecayFunction::Exponential),
            "gaussian" => Ok(DecayFunction::Gaussian),
            "density" => Ok(DecayFunction::Density),
            "power" => {
                let beta = beta.ok_or_else(|| Error::InvalidParameter {
                    name: "decay_function_power_beta",
                    value: "none".into(),
                    reason: "required when the decay function is 'power'".into(),
                })?;
                Self::power(beta)
            }
            other => Err(Error::InvalidParameter {
                name: "decay_function",
                value: other.to_string(),
                reason: "expected one of dichotomy, exponential, gaussian, density, power"
                    .into(),
            }),
        }
    }

    /// Power decay with a finite, strictly negative exponent
    pub fn power(beta: f64) -> Result<Self> {
        if !beta.is_finite() || beta >= 0.0 {
            return Err(Error::InvalidParameter {
                name: "decay_function_power_beta",
                value: beta.to_string(),
                reason: "must be finite and negative".into(),
            });
        }
        Ok(DecayFunction::Power { beta })
    }

    pub fn key(&self) -> &'static str {
        match self {
            DecayFunction::Dichotomy => "dichotomy",
            DecayFunction::Exponential => "exponential",
            DecayFunction::Gaussian => "gaussian",
            DecayFunction::Density => "density",
            DecayFunction::Power { .. } => "power",
        }
    }

    /// Weight at distance `d` for a kernel of radius `radius` (both in pixels)
    pub fn weight(&self, d: f64, radius: f64) -> f64 {
        if d > radius {
            return 0.0;
        }
        // a zero radius only ever evaluates the centre pixel
        let ratio = if radius > 0.0 { d / radius } else { 0.0 };
        match self {
            DecayFunction::Dichotomy => 1.0,
            DecayFunction::Exponential => (-ratio).exp(),
            DecayFunction::Gaussian => {
                let edge = (-0.5f64).exp();
                ((-0.5 * ratio * ratio).exp() - edge) / (1.0 - edge)
            }
            DecayFunction::Density => 0.75 * (1.0 - ratio * ratio),
            // the centre pixel is weighted as if one pixel away
            DecayFunction::Power { beta } => d.max(1.0).powf(*beta),
        }
    }
}

impl fmt::Display for DecayFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecayFunction::Power { beta } => write!(f, "power(beta={})", beta),
            other => f.write_str(other.key()),
        }
    }
}

/// Parameters for kernel synthesis
#[derive(Debug, Clone)]
pub struct DecayKernelParams {
    pub function: DecayFunction,
    /// Search radius in pixels
    pub radius: f64,
    /// Divide every weight by the kernel sum. Catchment convolution keeps
    /// weights unnormalized so outputs stay in population units.
    pub normalize: bool,
}

impl Default for DecayKernelParams {
    fn default() -> Self {
        Self {
            function: DecayFunction::Dichotomy,
            radius: 1.0,
            normalize: false,
        }
    }
}

/// Decay kernel synthesizer
#[derive(Debug, Clone, Default)]
pub struct DecayKernel;

impl Algorithm for DecayKernel {
    type Input = ();
    type Output = Raster<f32>;
    type Params = DecayKernelParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "DecayKernel"
    }

    fn description(&self) -> &'static str {
        "Build a square raster of distance-decay weights around a centre pixel"
    }

    fn execute(&self, _input: (), params: Self::Params) -> Result<Self::Output> {
        decay_kernel(&params)
    }
}

/// Build a decay kernel raster.
///
/// The kernel carries the unit geotransform `(0, 1, 0, 0, 0, -1)` and the
/// float32 nodata sentinel, and has no CRS.
pub fn decay_kernel(params: &DecayKernelParams) -> Result<Raster<f32>> {
    let radius = params.radius;
    if !radius.is_finite() || radius < 0.0 {
        return Err(Error::InvalidParameter {
            name: "radius",
            value: radius.to_string(),
            reason: "kernel radius must be a finite, non-negative number of pixels".into(),
        });
    }

    let half = radius.ceil() as usize;
    let side = 2 * half + 1;
    let mut weights = Array2::<f64>::zeros((side, side));
    for ((row, col), w) in weights.indexed_iter_mut() {
        let dy = row as f64 - half as f64;
        let dx = col as f64 - half as f64;
        *w = params.function.weight(dy.hypot(dx), radius);
    }

    if params.normalize {
        let total = weights.sum();
        if total > 0.0 {
            weights.mapv_inplace(|w| w / total);
        }
    }

    debug!(
        "built {} kernel with radius {:.3} px ({}x{})",
        params.function, radius, side, side
    );

    let mut kernel = Raster::from_array(weights.mapv(|w| w as f32));
    kernel.set_transform(GeoTransform::default());
    kernel.set_nodata(Some(FLOAT32_NODATA));
    Ok(kernel)
}
