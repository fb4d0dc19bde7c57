//! Noise reshaped by the structure of a reference signal
//!
//! Three modulation functions are available:
//!
//! - intensity: damp noise where the reference deviates strongly
//! - frequency: boost high spatial frequencies with a 2D FFT high-pass
//! - spectral signum: pull extreme log-magnitudes toward the middle of the
//!   spectrum's distribution
//!
//! Intensity and frequency results are rescaled to the input noise's norm
//! and blended with it by `strength`. Spectral results are returned as-is.
//! The FFT work is done on the host.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use burn_sonar_core::fft::{fft_dims, real_part, to_complex};
use burn_sonar_core::tensor::{frobenius_norm, from_host, quantile, std_dims, to_host};
use burn_sonar_core::{ConfigError, scale_noise};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::item::NoiseSpec;
use crate::sampler::{BindOptions, BoxedNoiseSampler, NoiseSampler, NoiseSamplerFactory};

/// Lower percentile for spectral reshaping; the upper one mirrors it
const SPECTRAL_PERCENTILE: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulationType {
    /// Pass-through scale and normalize
    #[default]
    None,
    Intensity,
    Frequency,
    SpectralSignum,
}

impl ModulationType {
    pub fn name(&self) -> &'static str {
        match self {
            ModulationType::None => "none",
            ModulationType::Intensity => "intensity",
            ModulationType::Frequency => "frequency",
            ModulationType::SpectralSignum => "spectral_signum",
        }
    }
}

impl fmt::Display for ModulationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModulationType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ModulationType::None),
            "intensity" => Ok(ModulationType::Intensity),
            "frequency" => Ok(ModulationType::Frequency),
            "spectral_signum" => Ok(ModulationType::SpectralSignum),
            _ => Err(ConfigError::UnknownModulationType(s.to_string())),
        }
    }
}

/// Dimensions the modulation statistics and transforms run over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulationDims {
    Channel,
    Spatial,
    #[default]
    ChannelSpatial,
}

impl ModulationDims {
    pub fn dims(&self) -> &'static [usize] {
        match self {
            ModulationDims::Channel => &[1],
            ModulationDims::Spatial => &[2, 3],
            ModulationDims::ChannelSpatial => &[1, 2, 3],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModulationDims::Channel => "channel",
            ModulationDims::Spatial => "spatial",
            ModulationDims::ChannelSpatial => "channel_spatial",
        }
    }
}

impl fmt::Display for ModulationDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts the names and the numeric selectors `1`, `2`, `3`
impl FromStr for ModulationDims {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "channel" | "1" => Ok(ModulationDims::Channel),
            "spatial" | "2" => Ok(ModulationDims::Spatial),
            "channel_spatial" | "3" => Ok(ModulationDims::ChannelSpatial),
            _ => Err(ConfigError::UnknownModulationDims(s.to_string())),
        }
    }
}

/// `1 / (std(reference - mean) * |intensity| + 1)` over `dims`
fn deviation_scaling<B: Backend>(reference: Tensor<B, 4>, intensity: f32, dims: &[usize]) -> Tensor<B, 4> {
    let centered = reference.clone() - reference.mean().unsqueeze::<4>();
    (std_dims(centered, dims) * intensity.abs() + 1.0).recip()
}

fn match_norm<B: Backend>(x: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 4> {
    let scale = frobenius_norm(target) / frobenius_norm(x.clone());
    x * scale
}

/// Damp noise where the reference has high deviation
pub fn intensity_modulate<B: Backend>(
    reference: Tensor<B, 4>,
    noise: Tensor<B, 4>,
    intensity: f32,
    dims: &[usize],
) -> Tensor<B, 4> {
    let scaling = deviation_scaling(reference, intensity, dims);
    let scaled = noise.clone() * scaling + noise.clone();
    let scaled = match_norm(scaled, noise.clone());
    scaled * intensity + noise * (1.0 - intensity)
}

/// Emphasize high spatial frequencies of the deviation-scaled noise
pub fn frequency_modulate<B: Backend>(
    reference: Tensor<B, 4>,
    noise: Tensor<B, 4>,
    intensity: f32,
    dims: &[usize],
) -> Tensor<B, 4> {
    let shape = noise.dims();
    let [_, _, height, width] = shape;
    let device = noise.device();
    let scaling = deviation_scaling(reference, intensity, dims);
    let input = scaling * noise.clone() + noise.clone();

    let mut spectrum = to_complex(&to_host(input));
    fft_dims(&mut spectrum, shape, &[2, 3], false);
    let b2 = intensity * intensity;
    let plane = height * width;
    for (i, bin) in spectrum.iter_mut().enumerate() {
        let y = (i % plane) / width;
        let x = i % width;
        let fy = y as f32 / height as f32;
        let fx = x as f32 / width as f32;
        let high_pass = 1.0 - (-(fy * fy + fx * fx) * b2).exp();
        *bin *= 1.0 + high_pass;
    }
    fft_dims(&mut spectrum, shape, &[2, 3], true);

    let filtered = from_host::<B>(real_part(&spectrum), shape, &device);
    let filtered = match_norm(filtered, noise.clone());
    filtered * intensity + noise * (1.0 - intensity)
}

/// Soft-clamp the log-magnitude spectrum of `noise` toward its 5th..95th percentile band
///
/// Quantiles are taken per batch sample.
pub fn spectral_modulate<B: Backend>(noise: Tensor<B, 4>, intensity: f32, dims: &[usize]) -> Tensor<B, 4> {
    let shape = noise.dims();
    let device = noise.device();
    let mut spectrum = to_complex(&to_host(noise));
    fft_dims(&mut spectrum, shape, dims, false);

    let per_sample = shape[1..].iter().product::<usize>();
    if per_sample > 0 {
        for sample in spectrum.chunks_mut(per_sample) {
            let log_amp: Vec<f32> = sample.iter().map(|c| c.norm().ln()).collect();
            let mut magnitudes: Vec<f32> = log_amp.iter().map(|v| v.abs()).collect();
            let q_low = quantile(&mut magnitudes, SPECTRAL_PERCENTILE);
            let q_high = quantile(&mut magnitudes, 1.0 - SPECTRAL_PERCENTILE);
            let q_max = quantile(&mut magnitudes, 1.0);

            for (bin, &la) in sample.iter_mut().zip(&log_amp) {
                let high = if la > q_high {
                    1.0 - ((la - q_high) / (q_max - q_high)).min(0.5)
                } else {
                    1.0
                };
                let low = if la < q_low {
                    1.0 + (1.0 - la / q_low).min(0.5)
                } else {
                    1.0
                };
                *bin *= (low * high).powf(intensity);
            }
        }
    }

    fft_dims(&mut spectrum, shape, dims, true);
    from_host(real_part(&spectrum), shape, &device)
}

/// Modulate each draw of `base` by a reference signal
///
/// The reference is the bound latent unless `ref_latent` is set. `base` is
/// always bound normalized, whatever the caller asks for; the caller's flag
/// only sets the defaults of `normalize_result` and `normalize_noise`.
#[derive(Debug, Clone)]
pub struct ModulatedNoise<B: Backend> {
    pub factor: f32,
    pub base: NoiseSpec<B>,
    pub normalize_result: Option<bool>,
    pub normalize_noise: Option<bool>,
    pub normalize_ref: bool,
    pub modulation_type: ModulationType,
    pub strength: f32,
    pub dims: ModulationDims,
    pub ref_latent: Option<Tensor<B, 4>>,
}

impl<B: Backend> ModulatedNoise<B> {
    pub fn new(factor: f32, base: impl Into<NoiseSpec<B>>, modulation_type: ModulationType) -> Self {
        Self {
            factor,
            base: base.into(),
            normalize_result: None,
            normalize_noise: None,
            normalize_ref: true,
            modulation_type,
            strength: 2.0,
            dims: ModulationDims::default(),
            ref_latent: None,
        }
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_dims(mut self, dims: ModulationDims) -> Self {
        self.dims = dims;
        self
    }

    pub fn with_ref_latent(mut self, ref_latent: Tensor<B, 4>) -> Self {
        self.ref_latent = Some(ref_latent);
        self
    }

    pub fn with_normalize_result(mut self, normalize: bool) -> Self {
        self.normalize_result = Some(normalize);
        self
    }

    pub fn with_normalize_noise(mut self, normalize: bool) -> Self {
        self.normalize_noise = Some(normalize);
        self
    }

    pub fn with_normalize_ref(mut self, normalize: bool) -> Self {
        self.normalize_ref = normalize;
        self
    }
}

impl<B: Backend> NoiseSamplerFactory<B> for ModulatedNoise<B> {
    fn factor(&self) -> f32 {
        self.factor
    }

    fn set_factor(&mut self, factor: f32) {
        self.factor = factor;
    }

    fn make_noise_sampler(
        &self,
        x: &Tensor<B, 4>,
        options: &BindOptions,
    ) -> Result<BoxedNoiseSampler<B>, ConfigError> {
        let base = self
            .base
            .make_noise_sampler(x, &options.with_normalized(true))?;
        let reference = self
            .ref_latent
            .as_ref()
            .map(|r| r.clone().to_device(&x.device()))
            .unwrap_or_else(|| x.clone());
        debug!(
            modulation_type = self.modulation_type.name(),
            dims = self.dims.name(),
            strength = self.strength,
            "bound modulated noise"
        );
        Ok(Box::new(ModulatedNoiseSampler {
            base,
            reference: scale_noise(reference, 1.0, self.normalize_ref),
            modulation_type: self.modulation_type,
            strength: self.strength,
            dims: self.dims,
            factor: self.factor,
            normalize_result: options.normalize_or_default(self.normalize_result),
            normalize_noise: options.normalize_or_default(self.normalize_noise),
        }))
    }
}

struct ModulatedNoiseSampler<B: Backend> {
    base: BoxedNoiseSampler<B>,
    reference: Tensor<B, 4>,
    modulation_type: ModulationType,
    strength: f32,
    dims: ModulationDims,
    factor: f32,
    normalize_result: bool,
    normalize_noise: bool,
}

impl<B: Backend> NoiseSampler<B> for ModulatedNoiseSampler<B> {
    fn sample(&mut self, sigma: f32, sigma_next: f32) -> Tensor<B, 4> {
        let raw = self.base.sample(sigma, sigma_next);
        if self.modulation_type == ModulationType::None {
            return scale_noise(raw, self.factor, self.normalize_result || self.normalize_noise);
        }
        let noise = scale_noise(raw, 1.0, self.normalize_noise);
        let dims = self.dims.dims();
        let modulated = match self.modulation_type {
            ModulationType::Intensity => {
                intensity_modulate(self.reference.clone(), noise, self.strength, dims)
            }
            ModulationType::Frequency => {
                frequency_modulate(self.reference.clone(), noise, self.strength, dims)
            }
            ModulationType::SpectralSignum => spectral_modulate(noise, self.strength, dims),
            ModulationType::None => noise,
        };
        scale_noise(modulated, self.factor, self.normalize_result)
    }
}
