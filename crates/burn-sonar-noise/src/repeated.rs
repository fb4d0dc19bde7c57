//! Cached noise replayed with random flips and rolls

use burn::prelude::*;
use burn_sonar_core::tensor::roll_dim;
use burn_sonar_core::{ConfigError, scale_noise};
use tracing::{debug, trace};

use crate::item::NoiseSpec;
use crate::rng::{NoiseRng, resolve_seed};
use crate::sampler::{BindOptions, BoxedNoiseSampler, NoiseSampler, NoiseSamplerFactory};

/// ChaCha stream for replay selection, apart from the base generator's stream 0
const PERMUTATION_STREAM: u64 = 1;

/// Draw up to `repeat_length` tensors from `base`, then replay them
///
/// Once the cache is full each step picks a random entry. With `permute` the
/// entry is flipped or rolled along a random dimension; a flip is skipped for
/// roughly one draw in ten.
#[derive(Debug, Clone)]
pub struct RepeatedNoise<B: Backend> {
    pub factor: f32,
    pub base: NoiseSpec<B>,
    pub repeat_length: usize,
    pub normalize: Option<bool>,
    pub permute: bool,
}

impl<B: Backend> RepeatedNoise<B> {
    pub fn new(factor: f32, base: impl Into<NoiseSpec<B>>, repeat_length: usize) -> Self {
        Self {
            factor,
            base: base.into(),
            repeat_length,
            normalize: None,
            permute: true,
        }
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = Some(normalize);
        self
    }

    pub fn with_permute(mut self, permute: bool) -> Self {
        self.permute = permute;
        self
    }

    /// Bind to `x`, keeping the concrete sampler type
    pub fn bind(&self, x: &Tensor<B, 4>, options: &BindOptions) -> Result<RepeatedNoiseSampler<B>, ConfigError> {
        if self.repeat_length == 0 {
            return Err(ConfigError::InvalidRepeatLength);
        }
        let base = self
            .base
            .make_noise_sampler(x, &options.with_normalized(false))?;
        let seed = resolve_seed(options.seed);
        debug!(
            repeat_length = self.repeat_length,
            permute = self.permute,
            seed,
            "bound repeated noise"
        );
        Ok(RepeatedNoiseSampler {
            base,
            cache: Vec::with_capacity(self.repeat_length),
            rng: NoiseRng::host_stream(seed, PERMUTATION_STREAM),
            repeat_length: self.repeat_length,
            permute: self.permute,
            factor: self.factor,
            normalize: options.normalize_or_default(self.normalize),
        })
    }
}

impl<B: Backend> NoiseSamplerFactory<B> for RepeatedNoise<B> {
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
        Ok(Box::new(self.bind(x, options)?))
    }
}

/// Bound repeated noise; the cache and RNG live for one sampling run
pub struct RepeatedNoiseSampler<B: Backend> {
    base: BoxedNoiseSampler<B>,
    cache: Vec<Tensor<B, 4>>,
    rng: NoiseRng,
    repeat_length: usize,
    permute: bool,
    factor: f32,
    normalize: bool,
}

impl<B: Backend> RepeatedNoiseSampler<B> {
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn permuted(noise: Tensor<B, 4>, rands: [u32; 4]) -> Tensor<B, 4> {
        let ndims = 4u32;
        if rands[1] % 2 == 0 {
            if rands[2] <= u32::MAX / 10 {
                return noise;
            }
            // residue 0 selects the last dimension
            let dim = match rands[2] % (ndims + 1) {
                0 => ndims - 1,
                n => n - 1,
            };
            noise.flip([dim as _])
        } else {
            let dim = (rands[2] % ndims) as usize;
            let size = noise.dims()[dim];
            if size == 0 {
                return noise;
            }
            roll_dim(noise, rands[3] as usize % size, dim)
        }
    }
}

impl<B: Backend> NoiseSampler<B> for RepeatedNoiseSampler<B> {
    fn sample(&mut self, sigma: f32, sigma_next: f32) -> Tensor<B, 4> {
        let rands = [
            self.rng.next_u32(),
            self.rng.next_u32(),
            self.rng.next_u32(),
            self.rng.next_u32(),
        ];
        let noise = if self.cache.len() < self.repeat_length {
            let noise = self.base.sample(sigma, sigma_next);
            self.cache.push(noise.clone());
            noise
        } else {
            let idx = rands[0] as usize % self.repeat_length;
            trace!(idx, "replaying cached noise");
            let noise = self.cache[idx].clone();
            if self.permute {
                Self::permuted(noise, rands)
            } else {
                noise
            }
        };
        scale_noise(noise, self.factor, self.normalize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use burn_sonar_core::tensor::{from_host, to_host};

    type TestBackend = NdArray<f32>;

    const FLIP: u32 = 0;
    const ROLL: u32 = 1;
    /// First draw above the flip-skip threshold; divisible by 5
    const NO_SKIP: u32 = u32::MAX / 10 + 1;

    fn ramp() -> Tensor<TestBackend, 4> {
        from_host((0..24).map(|i| i as f32).collect(), [1, 2, 3, 4], &Default::default())
    }

    fn permuted(rands: [u32; 4]) -> Vec<f32> {
        to_host(RepeatedNoiseSampler::<TestBackend>::permuted(ramp(), rands))
    }

    #[test]
    fn test_low_draw_skips_flip() {
        let unchanged = to_host(ramp());
        assert_eq!(permuted([0, FLIP, 0, 0]), unchanged);
        assert_eq!(permuted([0, FLIP, u32::MAX / 10, 0]), unchanged);
        assert_ne!(permuted([0, FLIP, NO_SKIP, 0]), unchanged);
    }

    #[test]
    fn test_flip_dimension_from_residue() {
        assert_eq!(NO_SKIP % 5, 0);
        // residue 0 wraps to the last dimension, residue n flips n - 1
        for (offset, dim) in [(0, 3), (1, 0), (2, 1), (3, 2), (4, 3)] {
            let expected = to_host(ramp().flip([dim]));
            assert_eq!(permuted([0, FLIP, NO_SKIP + offset, 0]), expected, "residue {offset}");
        }
    }

    #[test]
    fn test_flip_last_dim_reverses_rows() {
        let out = permuted([0, FLIP, NO_SKIP, 0]);
        assert_eq!(&out[..4], &[3.0, 2.0, 1.0, 0.0]);
        assert_eq!(&out[20..], &[23.0, 22.0, 21.0, 20.0]);
    }

    #[test]
    fn test_roll_dimension_and_shift() {
        // dim 6 % 4 = 2 (size 3), shift 7 % 3 = 1
        let out = permuted([0, ROLL, 6, 7]);
        let input = to_host(ramp());
        for c in 0..2 {
            for h in 0..3 {
                for w in 0..4 {
                    let src = c * 12 + ((h + 2) % 3) * 4 + w;
                    assert_eq!(out[c * 12 + h * 4 + w], input[src]);
                }
            }
        }
        assert_eq!(out, to_host(roll_dim(ramp(), 1, 2)));

        // dim 5 % 4 = 1 (size 2), shift 3 % 2 = 1 swaps the channels
        let out = permuted([0, ROLL, 5, 3]);
        assert_eq!(&out[..12], &input[12..]);
        assert_eq!(&out[12..], &input[..12]);

        // a shift that is a multiple of the size is the identity
        assert_eq!(permuted([0, ROLL, 3, 8]), input);
    }
}
