//! Noise sampler contract and base binding
//!
//! A [`NoiseSamplerFactory`] is a pure description. Binding it against a
//! latent produces a stateful [`NoiseSampler`] that is called once per solver
//! step with the current and next sigma.

use burn::prelude::*;
use burn_sonar_core::{ConfigError, scale_noise};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::brownian::BrownianTree;
use crate::generators::{GenerateFn, simple_generator};
use crate::noise_type::NoiseType;
use crate::rng::{NoiseRng, resolve_seed};

/// Stateful per-run noise source
pub trait NoiseSampler<B: Backend> {
    /// Noise for the step `sigma -> sigma_next`, shaped like the bound latent
    fn sample(&mut self, sigma: f32, sigma_next: f32) -> Tensor<B, 4>;
}

impl<B: Backend, F> NoiseSampler<B> for F
where
    F: FnMut(f32, f32) -> Tensor<B, 4>,
{
    fn sample(&mut self, sigma: f32, sigma_next: f32) -> Tensor<B, 4> {
        self(sigma, sigma_next)
    }
}

pub type BoxedNoiseSampler<B> = Box<dyn NoiseSampler<B>>;

/// Options shared by every binding in a noise spec tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindOptions {
    /// Smallest positive sigma of the schedule
    pub sigma_min: Option<f32>,
    /// Largest sigma of the schedule
    pub sigma_max: Option<f32>,
    /// Seed for every RNG created during binding; drawn fresh when `None`
    pub seed: Option<u64>,
    /// Draw tensors from the seeded host stream instead of the device RNG
    pub cpu: bool,
    /// Normalize the output to unit deviation before applying the factor
    pub normalized: bool,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            sigma_min: None,
            sigma_max: None,
            seed: None,
            cpu: true,
            normalized: true,
        }
    }
}

impl BindOptions {
    pub fn with_sigma_bounds(mut self, sigma_min: f32, sigma_max: f32) -> Self {
        self.sigma_min = Some(sigma_min);
        self.sigma_max = Some(sigma_max);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_cpu(mut self, cpu: bool) -> Self {
        self.cpu = cpu;
        self
    }

    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    /// Resolve an optional per-node normalize flag against these options
    pub fn normalize_or_default(&self, normalize: Option<bool>) -> bool {
        normalize.unwrap_or(self.normalized)
    }
}

/// A noise description that can be bound to a latent
pub trait NoiseSamplerFactory<B: Backend> {
    /// Scalar weight applied after generation
    fn factor(&self) -> f32;

    fn set_factor(&mut self, factor: f32);

    /// Bind against `x`'s shape and device
    fn make_noise_sampler(
        &self,
        x: &Tensor<B, 4>,
        options: &BindOptions,
    ) -> Result<BoxedNoiseSampler<B>, ConfigError>;
}

enum NoiseSource<B: Backend> {
    Simple { generate: GenerateFn<B>, rng: NoiseRng },
    Brownian(BrownianTree),
}

/// A base generator bound to a shape, with factor scaling
pub struct BaseNoiseSampler<B: Backend> {
    source: NoiseSource<B>,
    dims: [usize; 4],
    device: B::Device,
    factor: f32,
    normalized: bool,
}

impl<B: Backend> NoiseSampler<B> for BaseNoiseSampler<B> {
    fn sample(&mut self, sigma: f32, sigma_next: f32) -> Tensor<B, 4> {
        if self.dims.contains(&0) {
            return Tensor::zeros(self.dims, &self.device);
        }
        let noise = match &mut self.source {
            NoiseSource::Simple { generate, rng } => generate(rng, self.dims, &self.device),
            NoiseSource::Brownian(tree) => tree.sample(sigma, sigma_next, &self.device),
        };
        scale_noise(noise, self.factor, self.normalized)
    }
}

/// Bind the base generator for `noise_type` to `x`
///
/// Brownian noise needs both sigma bounds in `options`.
pub fn get_noise_sampler<B: Backend>(
    noise_type: NoiseType,
    x: &Tensor<B, 4>,
    options: &BindOptions,
    factor: f32,
) -> Result<BaseNoiseSampler<B>, ConfigError> {
    let dims = x.dims();
    let source = match simple_generator::<B>(noise_type) {
        Some(generate) => NoiseSource::Simple {
            generate,
            rng: NoiseRng::new(options.seed, options.cpu),
        },
        None => {
            let (Some(sigma_min), Some(sigma_max)) = (options.sigma_min, options.sigma_max) else {
                return Err(ConfigError::MissingSigmaBounds {
                    noise_type: noise_type.name(),
                });
            };
            NoiseSource::Brownian(BrownianTree::new(
                sigma_min,
                sigma_max,
                resolve_seed(options.seed),
                dims,
            ))
        }
    };
    debug!(
        noise_type = noise_type.name(),
        ?dims,
        factor,
        normalized = options.normalized,
        "bound base noise sampler"
    );
    Ok(BaseNoiseSampler {
        source,
        dims,
        device: x.device(),
        factor,
        normalized: options.normalized,
    })
}
