//! Sonar Naive sampler: ancestral Euler with reference guidance
//!
//! Same update as Sonar Euler Ancestral at `eta = 1`, except the integrated
//! sample is pulled toward a reference latent before noise is injected.

use burn::prelude::*;
use burn_sonar_core::{Guidance, GuidanceType};
use burn_sonar_noise::{BoxedNoiseSampler, NoiseSampler, NoiseType};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SamplerError;
use crate::euler_ancestral::ancestral_noise_sampler;
use crate::momentum::{SonarConfig, SonarState};
use crate::sampling::{Denoiser, SonarStep, StepCallback, StepOutput, denoise_at, run_sampler};
use crate::scheduler::{get_ancestral_step, to_d};

/// Sonar Naive configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SonarNaiveConfig {
    pub sonar: SonarConfig,
    pub noise_type: NoiseType,
    pub s_noise: f32,
    pub guidance_type: Option<GuidanceType>,
    pub guidance_factor: f32,
    pub seed: Option<u64>,
}

impl Default for SonarNaiveConfig {
    fn default() -> Self {
        Self {
            sonar: SonarConfig::default(),
            noise_type: NoiseType::Gaussian,
            s_noise: 1.0,
            guidance_type: None,
            guidance_factor: 0.0,
            seed: None,
        }
    }
}

pub struct SonarNaive<B: Backend> {
    state: SonarState<B>,
    guidance: Guidance<B>,
    sigmas: Vec<f32>,
    noise_sampler: BoxedNoiseSampler<B>,
    s_noise: f32,
}

impl<B: Backend> SonarNaive<B> {
    pub fn new(
        sigmas: Vec<f32>,
        noise_sampler: BoxedNoiseSampler<B>,
        guidance: Guidance<B>,
        config: &SonarNaiveConfig,
    ) -> Self {
        debug!(
            steps = sigmas.len().saturating_sub(1),
            guidance_active = guidance.is_active(),
            "created sonar naive sampler"
        );
        Self {
            state: SonarState::new(config.sonar),
            guidance,
            sigmas,
            noise_sampler,
            s_noise: config.s_noise,
        }
    }
}

impl<B: Backend> SonarStep<B> for SonarNaive<B> {
    fn sigmas(&self) -> &[f32] {
        &self.sigmas
    }

    fn step<D: Denoiser<B>>(&mut self, step_index: usize, x: Tensor<B, 4>, denoiser: &mut D) -> StepOutput<B> {
        self.state.init_history(&x);

        let sigma_from = self.sigmas[step_index];
        let sigma_to = self.sigmas[step_index + 1];
        let (sigma_down, sigma_up) = get_ancestral_step(sigma_from, sigma_to, 1.0);

        let denoised = denoise_at(denoiser, x.clone(), sigma_from);
        let derivative = to_d(x.clone(), sigma_from, denoised.clone());
        let dt = sigma_down - sigma_from;

        let mut x = self.state.momentum_step(x, derivative, dt);
        if sigma_to > 0.0 {
            x = self.guidance.apply(sigma_from, sigma_to, x, denoised.clone());
            let noise = self.noise_sampler.sample(sigma_from, sigma_to);
            x = x + noise * (self.s_noise * sigma_up);
        }

        StepOutput {
            x,
            sigma: sigma_from,
            sigma_hat: sigma_from,
            denoised,
        }
    }
}

/// Sample with Sonar Naive over `sigmas`, starting from `x`
///
/// `guidance_latent` is the reference; it is normalized once per channel.
pub fn sample_sonar_naive<B: Backend, D: Denoiser<B>>(
    denoiser: &mut D,
    x: Tensor<B, 4>,
    sigmas: &[f32],
    config: SonarNaiveConfig,
    guidance_latent: Option<Tensor<B, 4>>,
    noise_sampler: Option<BoxedNoiseSampler<B>>,
    callback: Option<StepCallback<'_, B>>,
) -> Result<Tensor<B, 4>, SamplerError> {
    let noise_sampler = ancestral_noise_sampler(config.noise_type, config.seed, &x, sigmas, noise_sampler)?;
    let guidance = Guidance::new(config.guidance_type, guidance_latent, config.guidance_factor)
        .to_device(&x.device());
    let mut sampler = SonarNaive::new(sigmas.to_vec(), noise_sampler, guidance, &config);
    run_sampler(&mut sampler, denoiser, x, callback)
}
