//! Host-side FFT over selected axes of a 4D buffer
//!
//! Burn has no FFT op, so spectral noise shaping round-trips through host
//! memory. Inverse transforms are scaled by `1/n` per axis so that
//! `ifft(fft(x)) == x`.

use rustfft::FftPlanner;

pub use rustfft::num_complex::Complex32;

/// Lift real values into complex form
pub fn to_complex(values: &[f32]) -> Vec<Complex32> {
    values.iter().map(|&re| Complex32::new(re, 0.0)).collect()
}

/// Real parts of a complex buffer
pub fn real_part(values: &[Complex32]) -> Vec<f32> {
    values.iter().map(|c| c.re).collect()
}

/// Transform `data` (row-major, shape `shape`) in place along each axis of `dims`
pub fn fft_dims(data: &mut [Complex32], shape: [usize; 4], dims: &[usize], inverse: bool) {
    let mut planner = FftPlanner::<f32>::new();
    for &dim in dims {
        let n = shape[dim];
        if n <= 1 {
            continue;
        }
        let fft = if inverse {
            planner.plan_fft_inverse(n)
        } else {
            planner.plan_fft_forward(n)
        };
        let stride: usize = shape[dim + 1..].iter().product();
        let outer: usize = shape[..dim].iter().product();
        let scale = if inverse { 1.0 / n as f32 } else { 1.0 };
        let mut lane = vec![Complex32::new(0.0, 0.0); n];

        for o in 0..outer {
            for i in 0..stride {
                let base = o * n * stride + i;
                for (k, slot) in lane.iter_mut().enumerate() {
                    *slot = data[base + k * stride];
                }
                fft.process(&mut lane);
                for (k, value) in lane.iter().enumerate() {
                    data[base + k * stride] = *value * scale;
                }
            }
        }
    }
}

/// Normalized frequency magnitude `sqrt(fy^2 + fx^2)` for each spatial bin
///
/// Frequencies follow FFT ordering: bin `k` maps to `k/n` for `k <= n/2`
/// and `(k - n)/n` above.
pub fn radial_frequencies(height: usize, width: usize) -> Vec<f32> {
    let freq = |k: usize, n: usize| -> f32 {
        if k <= n / 2 {
            k as f32 / n as f32
        } else {
            (k as f32 - n as f32) / n as f32
        }
    };
    let mut out = Vec::with_capacity(height * width);
    for y in 0..height {
        let fy = freq(y, height);
        for x in 0..width {
            let fx = freq(x, width);
            out.push((fy * fy + fx * fx).sqrt());
        }
    }
    out
}
