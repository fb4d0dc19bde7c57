//! Virtual Brownian tree
//!
//! `W(t)` over `[t_min, t_max]` is never stored. Each query walks down a
//! binary tree of Brownian bridges from the root, drawing every midpoint from
//! a seed derived from its path, so the same `t` always yields the same value
//! and increments between any two times are consistent.

use burn::prelude::*;
use burn_sonar_core::tensor::from_host;

use crate::rng::NoiseRng;

/// Bisection depth; intervals below `(t_max - t_min) / 2^MAX_DEPTH` are
/// linearly interpolated
const MAX_DEPTH: usize = 24;

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn child_seed(seed: u64, right: bool) -> u64 {
    splitmix64(seed ^ if right { 0xA5A5_A5A5_A5A5_A5A5 } else { 0x5A5A_5A5A_5A5A_5A5A })
}

#[derive(Debug, Clone)]
pub struct BrownianTree {
    t_min: f32,
    t_max: f32,
    seed: u64,
    dims: [usize; 4],
    /// `W(t_max)`; `W(t_min)` is zero
    w_max: Vec<f32>,
    tolerance: f32,
}

impl BrownianTree {
    /// Build a tree over `[t_min, t_max]` (order of the bounds does not matter)
    pub fn new(t_min: f32, t_max: f32, seed: u64, dims: [usize; 4]) -> Self {
        let (t_min, t_max) = if t_min <= t_max { (t_min, t_max) } else { (t_max, t_min) };
        let n = dims.iter().product();
        let scale = (t_max - t_min).sqrt();
        let w_max = NoiseRng::host(splitmix64(seed))
            .normal_host(n)
            .into_iter()
            .map(|v| v * scale)
            .collect();
        Self {
            t_min,
            t_max,
            seed,
            dims,
            w_max,
            tolerance: (t_max - t_min) / (1u64 << MAX_DEPTH) as f32,
        }
    }

    /// `W(t)`, with `t` clamped into the tree's range
    pub fn value_at(&self, t: f32) -> Vec<f32> {
        let t = t.clamp(self.t_min, self.t_max);
        let n = self.w_max.len();
        let (mut a, mut b) = (self.t_min, self.t_max);
        let mut wa = vec![0.0f32; n];
        let mut wb = self.w_max.clone();
        let mut node = self.seed;

        for _ in 0..MAX_DEPTH {
            if t - a <= self.tolerance {
                return wa;
            }
            if b - t <= self.tolerance {
                return wb;
            }
            // Bridge midpoint: mean of the ends, variance (b - a) / 4
            let mid = 0.5 * (a + b);
            let std = (0.25 * (b - a)).sqrt();
            let eps = NoiseRng::host(node).normal_host(n);
            let wm: Vec<f32> = wa
                .iter()
                .zip(&wb)
                .zip(&eps)
                .map(|((x, y), e)| 0.5 * (x + y) + std * e)
                .collect();
            if t < mid {
                b = mid;
                wb = wm;
                node = child_seed(node, false);
            } else {
                a = mid;
                wa = wm;
                node = child_seed(node, true);
            }
        }

        let span = b - a;
        let frac = if span > 0.0 { (t - a) / span } else { 0.0 };
        wa.iter().zip(&wb).map(|(x, y)| x + (y - x) * frac).collect()
    }

    /// Normalized increment between two noise levels
    ///
    /// Returns `sign * (W(t1) - W(t0)) / sqrt(t1 - t0)` for the sorted pair,
    /// where `sign` is negative when `sigma_next < sigma`. Equal levels give
    /// zeros.
    pub fn sample<B: Backend>(&self, sigma: f32, sigma_next: f32, device: &B::Device) -> Tensor<B, 4> {
        let (t0, t1, sign) = if sigma < sigma_next {
            (sigma, sigma_next, 1.0)
        } else {
            (sigma_next, sigma, -1.0)
        };
        let dt = (t1 - t0).abs();
        if dt == 0.0 {
            return Tensor::zeros(self.dims, device);
        }
        let w0 = self.value_at(t0);
        let w1 = self.value_at(t1);
        let scale = sign / dt.sqrt();
        let values = w1.iter().zip(&w0).map(|(b, a)| (b - a) * scale).collect();
        from_host(values, self.dims, device)
    }
}
