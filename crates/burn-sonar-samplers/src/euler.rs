//! Sonar Euler sampler
//!
//! Deterministic Euler with momentum-smoothed derivatives and optional
//! stochastic churn.

use burn::prelude::*;
use burn::tensor::Distribution;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SamplerError;
use crate::momentum::{SonarConfig, SonarState};
use crate::sampling::{Denoiser, SonarStep, StepCallback, StepOutput, denoise_at, run_sampler};
use crate::scheduler::to_d;

/// Sonar Euler configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SonarEulerConfig {
    pub sonar: SonarConfig,
    /// Churn amount spread over the schedule (0 = deterministic)
    pub s_churn: f32,
    /// Churn is only applied for `s_tmin <= sigma <= s_tmax`
    pub s_tmin: f32,
    pub s_tmax: f32,
    /// Noise scale multiplier for churn
    pub s_noise: f32,
}

impl Default for SonarEulerConfig {
    fn default() -> Self {
        Self {
            sonar: SonarConfig::default(),
            s_churn: 0.0,
            s_tmin: 0.0,
            s_tmax: f32::INFINITY,
            s_noise: 1.0,
        }
    }
}

/// Sonar Euler sampler bound to one sigma schedule
pub struct SonarEuler<B: Backend> {
    state: SonarState<B>,
    sigmas: Vec<f32>,
    s_churn: f32,
    s_tmin: f32,
    s_tmax: f32,
    s_noise: f32,
}

impl<B: Backend> SonarEuler<B> {
    pub fn new(sigmas: Vec<f32>, config: SonarEulerConfig) -> Self {
        debug!(steps = sigmas.len().saturating_sub(1), ?config, "created sonar euler sampler");
        Self {
            state: SonarState::new(config.sonar),
            sigmas,
            s_churn: config.s_churn,
            s_tmin: config.s_tmin,
            s_tmax: config.s_tmax,
            s_noise: config.s_noise,
        }
    }

    /// Churn factor for `sigma`
    fn gamma(&self, sigma: f32) -> f32 {
        if self.s_tmin <= sigma && sigma <= self.s_tmax {
            let steps = self.sigmas.len().saturating_sub(1).max(1) as f32;
            (self.s_churn / steps).min(std::f32::consts::SQRT_2 - 1.0)
        } else {
            0.0
        }
    }
}

impl<B: Backend> SonarStep<B> for SonarEuler<B> {
    fn sigmas(&self) -> &[f32] {
        &self.sigmas
    }

    fn step<D: Denoiser<B>>(&mut self, step_index: usize, x: Tensor<B, 4>, denoiser: &mut D) -> StepOutput<B> {
        self.state.init_history(&x);

        let sigma = self.sigmas[step_index];
        let gamma = self.gamma(sigma);
        let sigma_hat = sigma * (gamma + 1.0);

        let x = if gamma > 0.0 {
            let noise = Tensor::random(x.dims(), Distribution::Normal(0.0, 1.0), &x.device());
            x + noise * (self.s_noise * (sigma_hat.powi(2) - sigma.powi(2)).sqrt())
        } else {
            x
        };

        let denoised = denoise_at(denoiser, x.clone(), sigma_hat);
        // derivative uses the unperturbed sigma
        let derivative = to_d(x.clone(), sigma, denoised.clone());
        let dt = self.sigmas[step_index + 1] - sigma_hat;

        StepOutput {
            x: self.state.momentum_step(x, derivative, dt),
            sigma,
            sigma_hat,
            denoised,
        }
    }
}

/// Sample with Sonar Euler over `sigmas`, starting from `x`
pub fn sample_sonar_euler<B: Backend, D: Denoiser<B>>(
    denoiser: &mut D,
    x: Tensor<B, 4>,
    sigmas: &[f32],
    config: SonarEulerConfig,
    callback: Option<StepCallback<'_, B>>,
) -> Result<Tensor<B, 4>, SamplerError> {
    let mut sampler = SonarEuler::new(sigmas.to_vec(), config);
    run_sampler(&mut sampler, denoiser, x, callback)
}
