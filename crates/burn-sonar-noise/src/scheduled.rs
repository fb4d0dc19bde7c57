//! Sigma-window gating of a noise spec

use burn::prelude::*;
use burn_sonar_core::{ConfigError, scale_noise};
use tracing::debug;

use crate::item::NoiseSpec;
use crate::sampler::{BindOptions, BoxedNoiseSampler, NoiseSampler, NoiseSamplerFactory};

/// Use `base` while `end_sigma <= sigma <= start_sigma`, `fallback` otherwise
///
/// Without a fallback, steps outside the window get zeros.
#[derive(Debug, Clone)]
pub struct ScheduledNoise<B: Backend> {
    pub factor: f32,
    pub base: NoiseSpec<B>,
    pub fallback: Option<NoiseSpec<B>>,
    pub start_sigma: f32,
    pub end_sigma: f32,
    pub normalize: Option<bool>,
}

impl<B: Backend> ScheduledNoise<B> {
    pub fn new(factor: f32, base: impl Into<NoiseSpec<B>>, start_sigma: f32, end_sigma: f32) -> Self {
        Self {
            factor,
            base: base.into(),
            fallback: None,
            start_sigma,
            end_sigma,
            normalize: None,
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<NoiseSpec<B>>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = Some(normalize);
        self
    }

    pub fn contains(&self, sigma: f32) -> bool {
        in_window(sigma, self.start_sigma, self.end_sigma)
    }
}

/// Inclusive on both ends
fn in_window(sigma: f32, start_sigma: f32, end_sigma: f32) -> bool {
    sigma <= start_sigma && sigma >= end_sigma
}

impl<B: Backend> NoiseSamplerFactory<B> for ScheduledNoise<B> {
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
        let child_options = options.with_normalized(false);
        let base = self.base.make_noise_sampler(x, &child_options)?;
        let fallback: BoxedNoiseSampler<B> = match &self.fallback {
            Some(spec) => spec.make_noise_sampler(x, &child_options)?,
            None => {
                let dims = x.dims();
                let device = x.device();
                Box::new(move |_: f32, _: f32| Tensor::<B, 4>::zeros(dims, &device))
            }
        };
        debug!(
            start_sigma = self.start_sigma,
            end_sigma = self.end_sigma,
            has_fallback = self.fallback.is_some(),
            "bound scheduled noise"
        );
        Ok(Box::new(ScheduledNoiseSampler {
            base,
            fallback,
            start_sigma: self.start_sigma,
            end_sigma: self.end_sigma,
            factor: self.factor,
            normalize: options.normalize_or_default(self.normalize),
        }))
    }
}

struct ScheduledNoiseSampler<B: Backend> {
    base: BoxedNoiseSampler<B>,
    fallback: BoxedNoiseSampler<B>,
    start_sigma: f32,
    end_sigma: f32,
    factor: f32,
    normalize: bool,
}

impl<B: Backend> NoiseSampler<B> for ScheduledNoiseSampler<B> {
    fn sample(&mut self, sigma: f32, sigma_next: f32) -> Tensor<B, 4> {
        let noise = if in_window(sigma, self.start_sigma, self.end_sigma) {
            self.base.sample(sigma, sigma_next)
        } else {
            self.fallback.sample(sigma, sigma_next)
        };
        scale_noise(noise, self.factor, self.normalize)
    }
}
