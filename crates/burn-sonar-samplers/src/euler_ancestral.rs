//! Sonar Euler Ancestral sampler
//!
//! Splits each step into a deterministic part toward `sigma_down`, taken with
//! momentum, and fresh noise scaled by `sigma_up`. The noise comes from any
//! [`NoiseSampler`], so structured noise specs plug in directly.

use burn::prelude::*;
use burn_sonar_core::ConfigError;
use burn_sonar_noise::{BindOptions, BoxedNoiseSampler, NoiseSampler, NoiseType, get_noise_sampler};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SamplerError;
use crate::momentum::{SonarConfig, SonarState};
use crate::sampling::{Denoiser, SonarStep, StepCallback, StepOutput, denoise_at, run_sampler};
use crate::scheduler::{get_ancestral_step, sigma_bounds, to_d};

/// Sonar Euler Ancestral configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SonarEulerAncestralConfig {
    pub sonar: SonarConfig,
    /// Base noise used when no noise sampler is supplied
    pub noise_type: NoiseType,
    /// Eta for noise injection (0 = ODE, 1 = full ancestral)
    pub eta: f32,
    /// Noise scale multiplier
    pub s_noise: f32,
    pub seed: Option<u64>,
}

impl Default for SonarEulerAncestralConfig {
    fn default() -> Self {
        Self {
            sonar: SonarConfig::default(),
            noise_type: NoiseType::Gaussian,
            eta: 1.0,
            s_noise: 1.0,
            seed: None,
        }
    }
}

/// Pick the noise sampler for an ancestral run
///
/// An explicit sampler is only allowed with the default noise type. Without
/// one, `noise_type` is bound to `x` over the schedule's sigma range.
pub(crate) fn ancestral_noise_sampler<B: Backend>(
    noise_type: NoiseType,
    seed: Option<u64>,
    x: &Tensor<B, 4>,
    sigmas: &[f32],
    noise_sampler: Option<BoxedNoiseSampler<B>>,
) -> Result<BoxedNoiseSampler<B>, ConfigError> {
    match noise_sampler {
        Some(_) if noise_type != NoiseType::Gaussian => {
            Err(ConfigError::ConflictingNoiseSampler(noise_type.name().to_string()))
        }
        Some(sampler) => Ok(sampler),
        None => {
            let mut options = BindOptions {
                seed,
                cpu: true,
                normalized: false,
                ..Default::default()
            };
            if let Some((sigma_min, sigma_max)) = sigma_bounds(sigmas) {
                options = options.with_sigma_bounds(sigma_min, sigma_max);
            }
            Ok(Box::new(get_noise_sampler(noise_type, x, &options, 1.0)?))
        }
    }
}

/// Sonar Euler Ancestral sampler bound to one sigma schedule
pub struct SonarEulerAncestral<B: Backend> {
    state: SonarState<B>,
    sigmas: Vec<f32>,
    noise_sampler: BoxedNoiseSampler<B>,
    eta: f32,
    s_noise: f32,
}

impl<B: Backend> SonarEulerAncestral<B> {
    pub fn new(
        sigmas: Vec<f32>,
        noise_sampler: BoxedNoiseSampler<B>,
        config: &SonarEulerAncestralConfig,
    ) -> Self {
        debug!(
            steps = sigmas.len().saturating_sub(1),
            eta = config.eta,
            s_noise = config.s_noise,
            "created sonar euler ancestral sampler"
        );
        Self {
            state: SonarState::new(config.sonar),
            sigmas,
            noise_sampler,
            eta: config.eta,
            s_noise: config.s_noise,
        }
    }
}

impl<B: Backend> SonarStep<B> for SonarEulerAncestral<B> {
    fn sigmas(&self) -> &[f32] {
        &self.sigmas
    }

    fn step<D: Denoiser<B>>(&mut self, step_index: usize, x: Tensor<B, 4>, denoiser: &mut D) -> StepOutput<B> {
        self.state.init_history(&x);

        let sigma_from = self.sigmas[step_index];
        let sigma_to = self.sigmas[step_index + 1];
        let (sigma_down, sigma_up) = get_ancestral_step(sigma_from, sigma_to, self.eta);

        let denoised = denoise_at(denoiser, x.clone(), sigma_from);
        let derivative = to_d(x.clone(), sigma_from, denoised.clone());
        let dt = sigma_down - sigma_from;

        let mut x = self.state.momentum_step(x, derivative, dt);
        if sigma_to > 0.0 {
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

/// Sample with Sonar Euler Ancestral over `sigmas`, starting from `x`
///
/// `noise_sampler` replaces the configured noise type; supplying both a
/// non-default type and a sampler is rejected before any step runs.
pub fn sample_sonar_euler_ancestral<B: Backend, D: Denoiser<B>>(
    denoiser: &mut D,
    x: Tensor<B, 4>,
    sigmas: &[f32],
    config: SonarEulerAncestralConfig,
    noise_sampler: Option<BoxedNoiseSampler<B>>,
    callback: Option<StepCallback<'_, B>>,
) -> Result<Tensor<B, 4>, SamplerError> {
    let noise_sampler = ancestral_noise_sampler(config.noise_type, config.seed, &x, sigmas, noise_sampler)?;
    let mut sampler = SonarEulerAncestral::new(sigmas.to_vec(), noise_sampler, &config);
    run_sampler(&mut sampler, denoiser, x, callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn constant_noise(value: f32) -> BoxedNoiseSampler<TestBackend> {
        Box::new(move |_: f32, _: f32| {
            Tensor::<TestBackend, 4>::full([1, 1, 2, 2], value, &Default::default())
        })
    }

    #[test]
    fn test_conflicting_noise_sampler() {
        let x = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &Default::default());
        let result = ancestral_noise_sampler(NoiseType::Pink, None, &x, &[1.0, 0.0], Some(constant_noise(0.0)));
        assert!(matches!(result, Err(ConfigError::ConflictingNoiseSampler(ref t)) if t == "pink"));
    }

    #[test]
    fn test_brownian_gets_schedule_bounds() {
        let x = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &Default::default());
        let mut sampler =
            ancestral_noise_sampler(NoiseType::Brownian, Some(3), &x, &[2.0, 1.0, 0.0], None).unwrap();
        assert_eq!(sampler.sample(2.0, 1.0).dims(), [1, 1, 2, 2]);

        let result = ancestral_noise_sampler(NoiseType::Brownian, Some(3), &x, &[0.0], None);
        assert!(matches!(result, Err(ConfigError::MissingSigmaBounds { .. })));
    }

    #[test]
    fn test_step_adds_scaled_noise() {
        let config = SonarEulerAncestralConfig {
            sonar: SonarConfig::default().with_momentum(1.0),
            s_noise: 2.0,
            ..Default::default()
        };
        let mut sampler = SonarEulerAncestral::new(vec![1.0, 0.5, 0.0], constant_noise(1.0), &config);
        let mut denoiser = |x: Tensor<TestBackend, 4>, _sigma: Tensor<TestBackend, 1>| x.zeros_like();
        let x = Tensor::<TestBackend, 4>::ones([1, 1, 2, 2], &Default::default());

        let (down, up) = get_ancestral_step(1.0, 0.5, 1.0);
        let expected = 1.0 + (down - 1.0) + 2.0 * up;
        let output = sampler.step(0, x, &mut denoiser);
        let values: Vec<f32> = output.x.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| (v - expected).abs() < 1e-5));

        // no noise on the final step
        let x = Tensor::<TestBackend, 4>::ones([1, 1, 2, 2], &Default::default());
        let output = sampler.step(1, x, &mut denoiser);
        let values: Vec<f32> = output.x.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| v.abs() < 1e-6));
    }
}
