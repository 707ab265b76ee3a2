//! Distance-decay kernels
//!
//! - **decay**: square windows of decay weights for catchment convolution

mod decay;

pub use decay::{decay_kernel, DecayFunction, DecayKernel, DecayKernelParams};
