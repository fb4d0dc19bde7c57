//! Spatial mask blend of two noise specs

use burn::prelude::*;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use burn_sonar_core::tensor::repeat_to_batch_size;
use burn_sonar_core::{ConfigError, scale_noise};
use tracing::debug;

use crate::item::NoiseSpec;
use crate::sampler::{BindOptions, BoxedNoiseSampler, NoiseSampler, NoiseSamplerFactory};

/// Blend `dst` and `src` noise through a spatial mask
///
/// Where the mask is 1 the output is `src`, where it is 0 it is `dst`.
/// The mask is `[n, height, width]` and is resized bilinearly to the latent's
/// resolution, then repeated or truncated to its batch size.
#[derive(Debug, Clone)]
pub struct CompositeNoise<B: Backend> {
    pub factor: f32,
    pub dst: NoiseSpec<B>,
    pub src: NoiseSpec<B>,
    pub normalize_src: Option<bool>,
    pub normalize_dst: Option<bool>,
    pub mask: Tensor<B, 3>,
}

impl<B: Backend> CompositeNoise<B> {
    pub fn new(
        factor: f32,
        dst: impl Into<NoiseSpec<B>>,
        src: impl Into<NoiseSpec<B>>,
        mask: Tensor<B, 3>,
    ) -> Self {
        Self {
            factor,
            dst: dst.into(),
            src: src.into(),
            normalize_src: None,
            normalize_dst: None,
            mask,
        }
    }

    pub fn with_normalize_src(mut self, normalize: bool) -> Self {
        self.normalize_src = Some(normalize);
        self
    }

    pub fn with_normalize_dst(mut self, normalize: bool) -> Self {
        self.normalize_dst = Some(normalize);
        self
    }

    /// Mask shaped `[batch, 1, height, width]` for `x`
    fn fit_mask(&self, x: &Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, _, height, width] = x.dims();
        let [n, mh, mw] = self.mask.dims();
        let mask = self.mask.clone().to_device(&x.device()).reshape([n, 1, mh, mw]);
        let mask = if [mh, mw] == [height, width] {
            mask
        } else {
            interpolate(
                mask,
                [height, width],
                InterpolateOptions::new(InterpolateMode::Bilinear),
            )
        };
        repeat_to_batch_size(mask, batch)
    }
}

impl<B: Backend> NoiseSamplerFactory<B> for CompositeNoise<B> {
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
        let dst = self.dst.make_noise_sampler(x, &child_options)?;
        let src = self.src.make_noise_sampler(x, &child_options)?;
        let mask = self.fit_mask(x);
        let inverse_mask = mask.clone().neg() + 1.0;
        debug!(mask = ?mask.dims(), factor = self.factor, "bound composite noise");
        Ok(Box::new(CompositeNoiseSampler {
            dst,
            src,
            mask,
            inverse_mask,
            factor: self.factor,
            normalize_dst: options.normalize_or_default(self.normalize_dst),
            normalize_src: options.normalize_or_default(self.normalize_src),
        }))
    }
}

struct CompositeNoiseSampler<B: Backend> {
    dst: BoxedNoiseSampler<B>,
    src: BoxedNoiseSampler<B>,
    mask: Tensor<B, 4>,
    inverse_mask: Tensor<B, 4>,
    factor: f32,
    normalize_dst: bool,
    normalize_src: bool,
}

impl<B: Backend> NoiseSampler<B> for CompositeNoiseSampler<B> {
    fn sample(&mut self, sigma: f32, sigma_next: f32) -> Tensor<B, 4> {
        let dst = scale_noise(self.dst.sample(sigma, sigma_next), self.factor, self.normalize_dst);
        let src = scale_noise(self.src.sample(sigma, sigma_next), self.factor, self.normalize_src);
        dst * self.inverse_mask.clone() + src * self.mask.clone()
    }
}
