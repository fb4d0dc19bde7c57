//! Reference-latent guidance
//!
//! Pulls a working tensor toward a reference latent whose per-channel
//! statistics have been normalized away and replaced with the statistics of
//! the tensor being guided.
//!
//! # Methods
//!
//! - **Linear**: interpolate the sample toward the shifted reference
//! - **Euler**: treat the shifted reference (matched to the denoised
//!   estimate) as a target and take an extra Euler step toward it

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tensor::{NORMALIZE_DIMS, SPATIAL_DIMS, mean_dims, normalize, std_dims};

/// Guidance method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceType {
    /// `(1 - g) * x + g * ref_shift`
    Linear,
    /// Euler step toward the shifted reference, scaled by `g`
    Euler,
}

impl GuidanceType {
    pub fn name(&self) -> &'static str {
        match self {
            GuidanceType::Linear => "linear",
            GuidanceType::Euler => "euler",
        }
    }
}

impl fmt::Display for GuidanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GuidanceType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(GuidanceType::Linear),
            "euler" => Ok(GuidanceType::Euler),
            _ => Err(ConfigError::UnknownGuidanceType(s.to_string())),
        }
    }
}

/// Normalize a reference latent per channel over its spatial dimensions
pub fn prepare_ref_latent<B: Backend>(latent: Tensor<B, 4>) -> Tensor<B, 4> {
    normalize(latent, &SPATIAL_DIMS)
}

/// Give the normalized reference the mean and deviation of `stats_source`
fn shift_reference<B: Backend>(ref_latent: Tensor<B, 4>, stats_source: Tensor<B, 4>) -> Tensor<B, 4> {
    let avg = mean_dims(stats_source.clone(), &NORMALIZE_DIMS);
    let std = std_dims(stats_source, &NORMALIZE_DIMS);
    ref_latent * std + avg
}

/// Blend `x` toward the reference shifted to `x`'s own statistics
pub fn guidance_linear<B: Backend>(
    x: Tensor<B, 4>,
    ref_latent: Tensor<B, 4>,
    guidance_factor: f32,
) -> Tensor<B, 4> {
    let ref_shift = shift_reference(ref_latent, x.clone());
    x * (1.0 - guidance_factor) + ref_shift * guidance_factor
}

/// Euler step from `x` toward the reference shifted to `denoised`'s statistics
///
/// The step size is `(sigma_next - sigma) * guidance_factor`.
pub fn guidance_euler<B: Backend>(
    sigma: f32,
    sigma_next: f32,
    x: Tensor<B, 4>,
    denoised: Tensor<B, 4>,
    ref_latent: Tensor<B, 4>,
    guidance_factor: f32,
) -> Tensor<B, 4> {
    let ref_shift = shift_reference(ref_latent, denoised);
    let d = (x.clone() - ref_shift) / sigma;
    let dt = (sigma_next - sigma) * guidance_factor;
    x + d * dt
}

/// Per-run guidance state owned by a sampler
#[derive(Debug, Clone)]
pub struct Guidance<B: Backend> {
    ref_latent: Option<Tensor<B, 4>>,
    guidance_type: Option<GuidanceType>,
    guidance_factor: f32,
}

impl<B: Backend> Guidance<B> {
    /// Create guidance state, normalizing the reference latent once
    pub fn new(
        guidance_type: Option<GuidanceType>,
        ref_latent: Option<Tensor<B, 4>>,
        guidance_factor: f32,
    ) -> Self {
        Self {
            ref_latent: ref_latent.map(prepare_ref_latent),
            guidance_type,
            guidance_factor,
        }
    }

    /// Guidance that never changes its input
    pub fn disabled() -> Self {
        Self {
            ref_latent: None,
            guidance_type: None,
            guidance_factor: 0.0,
        }
    }

    /// Move the reference latent to `device`
    pub fn to_device(mut self, device: &B::Device) -> Self {
        self.ref_latent = self.ref_latent.map(|r| r.to_device(device));
        self
    }

    pub fn guidance_type(&self) -> Option<GuidanceType> {
        self.guidance_type
    }

    pub fn guidance_factor(&self) -> f32 {
        self.guidance_factor
    }

    /// The normalized reference latent, if any
    pub fn ref_latent(&self) -> Option<&Tensor<B, 4>> {
        self.ref_latent.as_ref()
    }

    /// Whether [`Guidance::apply`] can change its input
    pub fn is_active(&self) -> bool {
        self.ref_latent.is_some() && self.guidance_type.is_some() && self.guidance_factor != 0.0
    }

    /// Apply guidance to `x` for the step `sigma -> sigma_next`
    pub fn apply(
        &self,
        sigma: f32,
        sigma_next: f32,
        x: Tensor<B, 4>,
        denoised: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        if self.guidance_factor == 0.0 {
            return x;
        }
        let (Some(ref_latent), Some(guidance_type)) = (&self.ref_latent, self.guidance_type) else {
            return x;
        };
        match guidance_type {
            GuidanceType::Linear => guidance_linear(x, ref_latent.clone(), self.guidance_factor),
            GuidanceType::Euler => guidance_euler(
                sigma,
                sigma_next,
                x,
                denoised,
                ref_latent.clone(),
                self.guidance_factor,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::from_host;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn pattern(dims: [usize; 4], phase: f32) -> Tensor<TestBackend, 4> {
        let n: usize = dims.iter().product();
        let values: Vec<f32> = (0..n).map(|i| (i as f32 * 0.91 + phase).sin() * 2.0 + 0.3).collect();
        from_host(values, dims, &Default::default())
    }

    #[test]
    fn test_parse_guidance_type() {
        assert_eq!("LINEAR".parse::<GuidanceType>().unwrap(), GuidanceType::Linear);
        assert_eq!("euler".parse::<GuidanceType>().unwrap(), GuidanceType::Euler);
        assert!(matches!(
            "cubic".parse::<GuidanceType>(),
            Err(ConfigError::UnknownGuidanceType(_))
        ));
        let parsed: GuidanceType = serde_json::from_str("\"linear\"").unwrap();
        assert_eq!(parsed, GuidanceType::Linear);
    }

    #[test]
    fn test_prepare_ref_latent_per_channel() {
        let latent = pattern([1, 2, 4, 4], 0.0);
        let prepared = prepare_ref_latent(latent);
        let std: Vec<f32> = std_dims(prepared.clone(), &SPATIAL_DIMS).to_data().to_vec().unwrap();
        let mean: Vec<f32> = mean_dims(prepared, &SPATIAL_DIMS).to_data().to_vec().unwrap();
        assert_eq!(std.len(), 2);
        assert!(std.iter().all(|s| (s - 1.0).abs() < 1e-4));
        assert!(mean.iter().all(|m| m.abs() < 1e-4));
    }

    #[test]
    fn test_linear_zero_factor_is_identity() {
        let x = pattern([1, 2, 3, 3], 0.5);
        let guidance = Guidance::new(Some(GuidanceType::Linear), Some(pattern([1, 2, 3, 3], 1.0)), 0.0);
        assert!(!guidance.is_active());
        let out: Vec<f32> = guidance.apply(1.0, 0.5, x.clone(), x.clone()).to_data().to_vec().unwrap();
        let expected: Vec<f32> = x.to_data().to_vec().unwrap();
        assert_eq!(out, expected);

        let direct: Vec<f32> = guidance_linear(x.clone(), pattern([1, 2, 3, 3], 1.0), 0.0)
            .to_data()
            .to_vec()
            .unwrap();
        assert_eq!(direct, expected);
    }

    #[test]
    fn test_linear_full_factor_matches_reference_shape() {
        let x = pattern([1, 1, 4, 4], 0.2);
        let reference = prepare_ref_latent(pattern([1, 1, 4, 4], 2.0));
        let out = guidance_linear(x.clone(), reference.clone(), 1.0);
        // output carries x's statistics
        let out_mean: Vec<f32> = mean_dims(out.clone(), &NORMALIZE_DIMS).to_data().to_vec().unwrap();
        let x_mean: Vec<f32> = mean_dims(x.clone(), &NORMALIZE_DIMS).to_data().to_vec().unwrap();
        assert!((out_mean[0] - x_mean[0]).abs() < 1e-4);
        let out_std: Vec<f32> = std_dims(out, &NORMALIZE_DIMS).to_data().to_vec().unwrap();
        let x_std: Vec<f32> = std_dims(x, &NORMALIZE_DIMS).to_data().to_vec().unwrap();
        assert!((out_std[0] - x_std[0]).abs() < 1e-3);
    }

    #[test]
    fn test_missing_reference_is_noop() {
        let x = pattern([1, 1, 2, 2], 0.0);
        let guidance = Guidance::<TestBackend>::new(Some(GuidanceType::Euler), None, 0.5);
        let out: Vec<f32> = guidance.apply(1.0, 0.5, x.clone(), x.clone()).to_data().to_vec().unwrap();
        assert_eq!(out, x.to_data().to_vec::<f32>().unwrap());
    }

    #[test]
    fn test_euler_step_toward_reference() {
        let x = pattern([1, 1, 3, 3], 0.0);
        let denoised = pattern([1, 1, 3, 3], 0.4);
        let reference = prepare_ref_latent(pattern([1, 1, 3, 3], 1.3));
        let out = guidance_euler(2.0, 1.0, x.clone(), denoised.clone(), reference.clone(), 0.5);

        let shift = shift_reference(reference, denoised);
        let expected = x.clone() + (x - shift) / 2.0 * -0.5;
        let out: Vec<f32> = out.to_data().to_vec().unwrap();
        let expected: Vec<f32> = expected.to_data().to_vec().unwrap();
        for (a, b) in out.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
