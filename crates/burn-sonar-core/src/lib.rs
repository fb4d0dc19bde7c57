//! Shared building blocks for burn-sonar
//!
//! - [`tensor`] - Noise normalization and multi-dimension statistics
//! - [`fft`] - Host-side FFT over selected axes
//! - [`guidance`] - Reference-latent guidance (linear and Euler-rate)
//! - [`error`] - Configuration and validation errors

pub mod error;
pub mod fft;
pub mod guidance;
pub mod tensor;

pub use error::{ConfigError, ValidationError};
pub use guidance::{Guidance, GuidanceType, guidance_euler, guidance_linear, prepare_ref_latent};
pub use tensor::{NORMALIZE_DIMS, SPATIAL_DIMS, normalize, scale_noise};
