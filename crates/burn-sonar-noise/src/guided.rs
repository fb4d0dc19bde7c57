//! Noise pulled toward a reference latent

use burn::prelude::*;
use burn_sonar_core::{ConfigError, GuidanceType, guidance_euler, guidance_linear, scale_noise};
use tracing::debug;

use crate::item::NoiseSpec;
use crate::sampler::{BindOptions, BoxedNoiseSampler, NoiseSampler, NoiseSamplerFactory};

/// Apply reference guidance to each draw of `base`
///
/// Euler guidance takes its statistics from the latent the spec was bound to.
#[derive(Debug, Clone)]
pub struct GuidedNoise<B: Backend> {
    pub factor: f32,
    pub guidance_factor: f32,
    pub ref_latent: Tensor<B, 4>,
    pub base: NoiseSpec<B>,
    pub method: GuidanceType,
    pub normalize: Option<bool>,
    pub normalize_ref: bool,
}

impl<B: Backend> GuidedNoise<B> {
    pub fn new(
        factor: f32,
        guidance_factor: f32,
        ref_latent: Tensor<B, 4>,
        base: impl Into<NoiseSpec<B>>,
        method: GuidanceType,
    ) -> Self {
        Self {
            factor,
            guidance_factor,
            ref_latent,
            base: base.into(),
            method,
            normalize: None,
            normalize_ref: true,
        }
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = Some(normalize);
        self
    }

    pub fn with_normalize_ref(mut self, normalize_ref: bool) -> Self {
        self.normalize_ref = normalize_ref;
        self
    }
}

impl<B: Backend> NoiseSamplerFactory<B> for GuidedNoise<B> {
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
            .make_noise_sampler(x, &options.with_normalized(false))?;
        let ref_latent = scale_noise(
            self.ref_latent.clone().to_device(&x.device()),
            1.0,
            self.normalize_ref,
        );
        debug!(
            method = self.method.name(),
            guidance_factor = self.guidance_factor,
            "bound guided noise"
        );
        Ok(Box::new(GuidedNoiseSampler {
            base,
            ref_latent,
            latent: x.clone(),
            method: self.method,
            guidance_factor: self.guidance_factor,
            factor: self.factor,
            normalize: options.normalize_or_default(self.normalize),
        }))
    }
}

struct GuidedNoiseSampler<B: Backend> {
    base: BoxedNoiseSampler<B>,
    ref_latent: Tensor<B, 4>,
    latent: Tensor<B, 4>,
    method: GuidanceType,
    guidance_factor: f32,
    factor: f32,
    normalize: bool,
}

impl<B: Backend> NoiseSampler<B> for GuidedNoiseSampler<B> {
    fn sample(&mut self, sigma: f32, sigma_next: f32) -> Tensor<B, 4> {
        let noise = scale_noise(self.base.sample(sigma, sigma_next), 1.0, self.normalize);
        let guided = match self.method {
            GuidanceType::Linear => guidance_linear(noise, self.ref_latent.clone(), self.guidance_factor),
            GuidanceType::Euler => guidance_euler(
                sigma,
                sigma_next,
                noise,
                self.latent.clone(),
                self.ref_latent.clone(),
                self.guidance_factor,
            ),
        };
        scale_noise(guided, self.factor, self.normalize)
    }
}
