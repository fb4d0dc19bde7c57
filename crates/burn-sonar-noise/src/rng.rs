//! Per-sampler random streams
//!
//! Every bound generator owns one [`NoiseRng`]. On the host it is a seeded
//! ChaCha stream, so a fixed seed reproduces the same noise on any backend.
//! With `cpu = false` tensor draws go to the backend's device RNG instead;
//! scalar draws and host-only generators still use the ChaCha stream.

use burn::prelude::*;
use burn::tensor::Distribution;
use burn_sonar_core::tensor::from_host;
use rand::distributions::Standard;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

/// Draw a fresh seed when none is supplied
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(rand::random)
}

#[derive(Debug, Clone)]
pub struct NoiseRng {
    rng: ChaCha8Rng,
    on_device: bool,
}

impl NoiseRng {
    pub fn new(seed: Option<u64>, cpu: bool) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(resolve_seed(seed)),
            on_device: !cpu,
        }
    }

    /// Seeded host stream regardless of placement
    pub fn host(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            on_device: false,
        }
    }

    /// Seeded host stream on ChaCha stream `stream`
    ///
    /// [`NoiseRng::new`] and [`NoiseRng::host`] draw from stream 0, so a
    /// nonzero `stream` never replays their bits for the same seed.
    pub fn host_stream(seed: u64, stream: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        Self {
            rng,
            on_device: false,
        }
    }

    /// Standard normal tensor
    pub fn normal<B: Backend>(&mut self, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
        if self.on_device {
            Tensor::random(dims, Distribution::Normal(0.0, 1.0), device)
        } else {
            let n = dims.iter().product();
            from_host(self.normal_host(n), dims, device)
        }
    }

    /// Uniform tensor on `[0, 1)`
    pub fn uniform<B: Backend>(&mut self, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
        if self.on_device {
            Tensor::random(dims, Distribution::Default, device)
        } else {
            let n = dims.iter().product();
            from_host(self.uniform_host(n), dims, device)
        }
    }

    pub fn normal_host(&mut self, n: usize) -> Vec<f32> {
        (0..n).map(|_| self.rng.sample::<f32, _>(StandardNormal)).collect()
    }

    pub fn uniform_host(&mut self, n: usize) -> Vec<f32> {
        (0..n).map(|_| self.rng.sample::<f32, _>(Standard)).collect()
    }

    pub fn next_f32(&mut self) -> f32 {
        self.rng.sample(Standard)
    }

    /// Uniform draw on `[0, u32::MAX)`
    pub fn next_u32(&mut self) -> u32 {
        self.rng.gen_range(0..u32::MAX)
    }
}
