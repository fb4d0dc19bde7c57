//! Base noise generators
//!
//! Each generator returns a `[batch, channel, height, width]` tensor with
//! roughly zero mean and unit variance. Generators whose raw construction
//! does not land there are normalized per batch sample before returning.
//! Factor scaling and optional normalization happen later, in
//! [`crate::sampler::BaseNoiseSampler`].

use std::f32::consts::{PI, TAU};

use burn::prelude::*;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use burn_sonar_core::fft::{fft_dims, radial_frequencies, real_part, to_complex};
use burn_sonar_core::tensor::{NORMALIZE_DIMS, SPATIAL_DIMS, from_host, normalize, quantile};

use crate::noise_type::{NoiseType, UpscaleMode};
use crate::rng::NoiseRng;

/// Sigma-independent generator
pub type GenerateFn<B> = fn(&mut NoiseRng, [usize; 4], &<B as Backend>::Device) -> Tensor<B, 4>;

/// Generator for `noise_type`, or `None` for types that need per-run state
/// (the Brownian tree)
pub fn simple_generator<B: Backend>(noise_type: NoiseType) -> Option<GenerateFn<B>> {
    let generate: GenerateFn<B> = match noise_type {
        NoiseType::Brownian => return None,
        NoiseType::Gaussian => gaussian,
        NoiseType::Uniform => uniform,
        NoiseType::StudentT => studentt,
        NoiseType::Perlin => perlin,
        NoiseType::Pink => pink,
        NoiseType::Laplacian => laplacian,
        NoiseType::Power => power,
        NoiseType::Pyramid => pyramid_default,
        NoiseType::PyramidBislerp => pyramid_bislerp,
        NoiseType::PyramidArea => pyramid_area,
        NoiseType::PyramidOld => pyramid_old_default,
        NoiseType::PyramidOldBislerp => pyramid_old_bislerp,
        NoiseType::PyramidOldArea => pyramid_old_area,
        NoiseType::HighresPyramid => highres_pyramid_default,
        NoiseType::HighresPyramidBislerp => highres_pyramid_bislerp,
        NoiseType::HighresPyramidArea => highres_pyramid_area,
        NoiseType::Green => green,
        NoiseType::RainbowMild => rainbow_mild,
        NoiseType::RainbowIntense => rainbow_intense,
    };
    Some(generate)
}

pub fn gaussian<B: Backend>(rng: &mut NoiseRng, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
    rng.normal(dims, device)
}

/// Uniform on `[-sqrt(3), sqrt(3))`
pub fn uniform<B: Backend>(rng: &mut NoiseRng, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
    (rng.uniform::<B>(dims, device) - 0.5) * (2.0 * 3f32.sqrt())
}

/// Heavy-tailed noise
///
/// Cauchy draws (scale 0.2) clamped at each sample's 75th percentile of
/// magnitude, then compressed with a signed square root.
pub fn studentt<B: Backend>(rng: &mut NoiseRng, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
    let n: usize = dims.iter().product();
    let per_sample = dims[1] * dims[2] * dims[3];
    let mut values: Vec<f32> = rng
        .uniform_host(n)
        .into_iter()
        .map(|u| (PI * (u - 0.5)).tan() * 0.2)
        .collect();
    if per_sample > 0 {
        for sample in values.chunks_mut(per_sample) {
            let mut magnitudes: Vec<f32> = sample.iter().map(|v| v.abs()).collect();
            let limit = quantile(&mut magnitudes, 0.75);
            for v in sample.iter_mut() {
                let clamped = v.clamp(-limit, limit);
                *v = clamped.abs().sqrt().copysign(clamped);
            }
        }
    }
    normalize(from_host(values, dims, device), &NORMALIZE_DIMS)
}

/// Laplace noise with unit variance (scale `1/sqrt(2)`)
pub fn laplacian<B: Backend>(rng: &mut NoiseRng, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
    let n = dims.iter().product();
    let scale = std::f32::consts::FRAC_1_SQRT_2;
    let values = rng
        .uniform_host(n)
        .into_iter()
        .map(|u| {
            let centered = u - 0.5;
            let tail = (1.0 - 2.0 * centered.abs()).max(f32::MIN_POSITIVE);
            -centered.signum() * tail.ln() * scale
        })
        .collect();
    from_host(values, dims, device)
}

fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

/// One plane of 2D Perlin gradient noise with `res` cells per axis
fn perlin_plane(rng: &mut NoiseRng, height: usize, width: usize, res: usize) -> Vec<f32> {
    let res_y = res.clamp(1, height.max(1));
    let res_x = res.clamp(1, width.max(1));
    let gradients: Vec<(f32, f32)> = rng
        .uniform_host((res_y + 1) * (res_x + 1))
        .into_iter()
        .map(|a| ((a * TAU).cos(), (a * TAU).sin()))
        .collect();
    let dot = |gy: usize, gx: usize, dy: f32, dx: f32| {
        let (grad_y, grad_x) = gradients[gy * (res_x + 1) + gx];
        grad_y * dy + grad_x * dx
    };

    let mut out = Vec::with_capacity(height * width);
    for y in 0..height {
        let py = y as f32 * res_y as f32 / height as f32;
        let iy = (py.floor() as usize).min(res_y - 1);
        let fy = py - iy as f32;
        for x in 0..width {
            let px = x as f32 * res_x as f32 / width as f32;
            let ix = (px.floor() as usize).min(res_x - 1);
            let fx = px - ix as f32;

            let n00 = dot(iy, ix, fy, fx);
            let n01 = dot(iy, ix + 1, fy, fx - 1.0);
            let n10 = dot(iy + 1, ix, fy - 1.0, fx);
            let n11 = dot(iy + 1, ix + 1, fy - 1.0, fx - 1.0);
            let u = fade(fx);
            let v = fade(fy);
            let top = n00 + u * (n01 - n00);
            let bottom = n10 + u * (n11 - n10);
            out.push(std::f32::consts::SQRT_2 * (top + v * (bottom - top)));
        }
    }
    out
}

/// Two octaves of Perlin noise over half-strength Gaussian noise
pub fn perlin<B: Backend>(rng: &mut NoiseRng, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
    let [batch, channels, height, width] = dims;
    let mut values = Vec::with_capacity(batch * channels * height * width);
    for _ in 0..batch * channels {
        let coarse = perlin_plane(rng, height, width, 4);
        let fine = perlin_plane(rng, height, width, 8);
        values.extend(coarse.iter().zip(&fine).map(|(c, f)| c + 0.5 * f));
    }
    let base = rng.normal::<B>(dims, device) * 0.5;
    normalize(base + from_host(values, dims, device), &NORMALIZE_DIMS)
}

/// White noise reshaped by a radial amplitude response over the spatial spectrum
fn spectral_noise<B: Backend>(
    rng: &mut NoiseRng,
    dims: [usize; 4],
    device: &B::Device,
    amplitude: impl Fn(f32) -> f32,
) -> Tensor<B, 4> {
    let n: usize = dims.iter().product();
    let plane = dims[2] * dims[3];
    let mut data = to_complex(&rng.normal_host(n));
    fft_dims(&mut data, dims, &SPATIAL_DIMS, false);
    let gains: Vec<f32> = radial_frequencies(dims[2], dims[3])
        .into_iter()
        .map(amplitude)
        .collect();
    for (i, value) in data.iter_mut().enumerate() {
        *value *= gains[i % plane];
    }
    fft_dims(&mut data, dims, &SPATIAL_DIMS, true);
    normalize(from_host(real_part(&data), dims, device), &NORMALIZE_DIMS)
}

/// 1/f power spectrum
pub fn pink<B: Backend>(rng: &mut NoiseRng, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
    spectral_noise(rng, dims, device, |f| if f > 0.0 { f.sqrt().recip() } else { 0.0 })
}

/// 1/f² power spectrum
pub fn power<B: Backend>(rng: &mut NoiseRng, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
    spectral_noise(rng, dims, device, |f| if f > 0.0 { f.recip() } else { 0.0 })
}

/// Band-pass spectrum centred on mid frequencies
pub fn green<B: Backend>(rng: &mut NoiseRng, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
    const CENTER: f32 = 0.25;
    const WIDTH: f32 = 0.1;
    spectral_noise(rng, dims, device, |f| {
        (-(f - CENTER).powi(2) / (2.0 * WIDTH * WIDTH)).exp()
    })
}

pub fn rainbow_mild<B: Backend>(rng: &mut NoiseRng, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
    (green::<B>(rng, dims, device) * 0.55 + perlin::<B>(rng, dims, device) * 0.7) * 1.15
}

pub fn rainbow_intense<B: Backend>(rng: &mut NoiseRng, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
    (green::<B>(rng, dims, device) * 0.75 + perlin::<B>(rng, dims, device) * 0.5) * 1.15
}

fn resize<B: Backend>(x: Tensor<B, 4>, size: [usize; 2], mode: InterpolateMode) -> Tensor<B, 4> {
    let [_, _, h, w] = x.dims();
    if [h, w] == size {
        return x;
    }
    interpolate(x, size, InterpolateOptions::new(mode))
}

/// Gaussian noise plus halving-resolution levels upscaled and discounted
fn pyramid_levels<B: Backend>(
    rng: &mut NoiseRng,
    dims: [usize; 4],
    device: &B::Device,
    mode: UpscaleMode,
    discount: f32,
) -> Tensor<B, 4> {
    let [batch, channels, height, width] = dims;
    let mut noise = rng.normal::<B>(dims, device);
    for level in 1..6 {
        let ratio = 1usize << level;
        let (h, w) = (height / ratio, width / ratio);
        if h == 0 || w == 0 {
            break;
        }
        let coarse = rng.normal::<B>([batch, channels, h, w], device);
        noise = noise + resize(coarse, [height, width], mode.into()) * discount.powi(level);
    }
    noise
}

fn pyramid<B: Backend>(rng: &mut NoiseRng, dims: [usize; 4], device: &B::Device, mode: UpscaleMode) -> Tensor<B, 4> {
    normalize(pyramid_levels(rng, dims, device, mode, 0.8), &NORMALIZE_DIMS)
}

/// Multi-resolution noise with a random 2-4x shrink per level
fn pyramid_old<B: Backend>(
    rng: &mut NoiseRng,
    dims: [usize; 4],
    device: &B::Device,
    mode: UpscaleMode,
) -> Tensor<B, 4> {
    const DISCOUNT: f32 = 0.9;
    let [batch, channels, height, width] = dims;
    let mut noise = rng.normal::<B>(dims, device);
    for level in 1..10 {
        let ratio = (rng.next_f32() * 2.0 + 2.0).powi(level);
        let h = ((height as f32 / ratio) as usize).max(1);
        let w = ((width as f32 / ratio) as usize).max(1);
        let coarse = rng.normal::<B>([batch, channels, h, w], device);
        noise = noise + resize(coarse, [height, width], mode.into()) * DISCOUNT.powi(level);
        if h == 1 || w == 1 {
            break;
        }
    }
    normalize(noise, &NORMALIZE_DIMS)
}

/// Pyramid noise built at twice the resolution and downsampled
fn highres_pyramid<B: Backend>(
    rng: &mut NoiseRng,
    dims: [usize; 4],
    device: &B::Device,
    mode: UpscaleMode,
) -> Tensor<B, 4> {
    let [batch, channels, height, width] = dims;
    let large = pyramid_levels(rng, [batch, channels, height * 2, width * 2], device, mode, 0.7);
    normalize(
        resize(large, [height, width], InterpolateMode::Bilinear),
        &NORMALIZE_DIMS,
    )
}

macro_rules! upscale_variant {
    ($name:ident, $base:ident, $mode:expr) => {
        fn $name<B: Backend>(rng: &mut NoiseRng, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
            $base(rng, dims, device, $mode)
        }
    };
}

upscale_variant!(pyramid_default, pyramid, UpscaleMode::Default);
upscale_variant!(pyramid_bislerp, pyramid, UpscaleMode::Bislerp);
upscale_variant!(pyramid_area, pyramid, UpscaleMode::Area);
upscale_variant!(pyramid_old_default, pyramid_old, UpscaleMode::Default);
upscale_variant!(pyramid_old_bislerp, pyramid_old, UpscaleMode::Bislerp);
upscale_variant!(pyramid_old_area, pyramid_old, UpscaleMode::Area);
upscale_variant!(highres_pyramid_default, highres_pyramid, UpscaleMode::Default);
upscale_variant!(highres_pyramid_bislerp, highres_pyramid, UpscaleMode::Bislerp);
upscale_variant!(highres_pyramid_area, highres_pyramid, UpscaleMode::Area);
