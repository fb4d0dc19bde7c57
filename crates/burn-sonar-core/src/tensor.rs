//! Tensor statistics and noise normalization
//!
//! Latents are `[batch, channel, height, width]`. Statistics use the unbiased
//! (n - 1) estimator.

use burn::prelude::*;

/// Channel and spatial dimensions; normalization is per batch sample
pub const NORMALIZE_DIMS: [usize; 3] = [1, 2, 3];

/// Spatial dimensions only
pub const SPATIAL_DIMS: [usize; 2] = [2, 3];

/// Mean over several dimensions, keeping them as size 1
pub fn mean_dims<B: Backend, const D: usize>(x: Tensor<B, D>, dims: &[usize]) -> Tensor<B, D> {
    dims.iter().fold(x, |acc, &dim| acc.mean_dim(dim))
}

/// Unbiased standard deviation over several dimensions, keeping them as size 1
pub fn std_dims<B: Backend, const D: usize>(x: Tensor<B, D>, dims: &[usize]) -> Tensor<B, D> {
    let shape = x.dims();
    let count: usize = dims.iter().map(|&dim| shape[dim]).product();
    let centered = x.clone() - mean_dims(x, dims);
    let sum_sq = dims
        .iter()
        .fold(centered.clone() * centered, |acc, &dim| acc.sum_dim(dim));
    (sum_sq / count.saturating_sub(1).max(1) as f32).sqrt()
}

/// Center and rescale `x` to unit standard deviation over `dims`
///
/// A slice with zero deviation (e.g. an all-zero fallback) is only centered.
pub fn normalize<B: Backend>(x: Tensor<B, 4>, dims: &[usize]) -> Tensor<B, 4> {
    let mean = mean_dims(x.clone(), dims);
    let std = std_dims(x.clone(), dims);
    let std = std.clone().mask_fill(std.equal_elem(0.0), 1.0);
    (x - mean) / std
}

/// Apply a noise factor, optionally normalizing first
///
/// With `normalized` the noise is brought to unit deviation per batch sample
/// before being multiplied by `factor`; otherwise it is only multiplied.
pub fn scale_noise<B: Backend>(noise: Tensor<B, 4>, factor: f32, normalized: bool) -> Tensor<B, 4> {
    if normalized && noise.shape().num_elements() > 0 {
        let noise = normalize(noise, &NORMALIZE_DIMS);
        if factor != 1.0 {
            noise * factor
        } else {
            noise
        }
    } else if factor != 1.0 {
        noise * factor
    } else {
        noise
    }
}

/// Frobenius norm of the whole tensor, shaped `[1, 1, 1, 1]` for broadcasting
pub fn frobenius_norm<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    (x.clone() * x).sum().sqrt().unsqueeze()
}

/// Roll `x` along `dim` so element `i` moves to `i + shift` (wrapping)
pub fn roll_dim<B: Backend>(x: Tensor<B, 4>, shift: usize, dim: usize) -> Tensor<B, 4> {
    let size = x.dims()[dim];
    if size == 0 {
        return x;
    }
    let shift = shift % size;
    if shift == 0 {
        return x;
    }
    let tail = x.clone().narrow(dim, size - shift, shift);
    let head = x.narrow(dim, 0, size - shift);
    Tensor::cat(vec![tail, head], dim)
}

/// Resize the batch dimension to `batch_size`, repeating or truncating
pub fn repeat_to_batch_size<B: Backend>(x: Tensor<B, 4>, batch_size: usize) -> Tensor<B, 4> {
    let current = x.dims()[0];
    if current == batch_size || current == 0 {
        return x;
    }
    let x = if current < batch_size {
        let times = batch_size.div_ceil(current);
        Tensor::cat(vec![x; times], 0)
    } else {
        x
    };
    x.narrow(0, 0, batch_size)
}

/// Copy a tensor to host memory as `f32`
pub fn to_host<B: Backend, const D: usize>(x: Tensor<B, D>) -> Vec<f32> {
    x.into_data().iter::<f32>().collect()
}

/// Upload host values as a 4D tensor
pub fn from_host<B: Backend>(values: Vec<f32>, dims: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
    Tensor::from_data(TensorData::new(values, dims), device)
}

/// Linear-interpolated quantile, `q` in `[0, 1]`
///
/// Sorts `values` in place. Returns NaN for an empty slice.
pub fn quantile(values: &mut [f32], q: f32) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f32;
    if lo == hi || frac == 0.0 {
        values[lo]
    } else {
        values[lo] + (values[hi] - values[lo]) * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn ramp(dims: [usize; 4]) -> Tensor<TestBackend, 4> {
        let n: usize = dims.iter().product();
        let values: Vec<f32> = (0..n).map(|i| (i as f32 * 0.37).sin() * 3.0 + 1.5).collect();
        from_host(values, dims, &Default::default())
    }

    #[test]
    fn test_normalize_unit_std() {
        let x = ramp([2, 3, 4, 4]);
        let y = normalize(x, &NORMALIZE_DIMS);
        let std: Vec<f32> = std_dims(y.clone(), &NORMALIZE_DIMS).to_data().to_vec().unwrap();
        let mean: Vec<f32> = mean_dims(y, &NORMALIZE_DIMS).to_data().to_vec().unwrap();
        assert_eq!(std.len(), 2);
        for (s, m) in std.iter().zip(&mean) {
            assert!((s - 1.0).abs() < 1e-4, "std {s}");
            assert!(m.abs() < 1e-4, "mean {m}");
        }
    }

    #[test]
    fn test_normalize_zero_tensor_stays_zero() {
        let x = Tensor::<TestBackend, 4>::zeros([1, 2, 3, 3], &Default::default());
        let y: Vec<f32> = scale_noise(x, 2.0, true).to_data().to_vec().unwrap();
        assert!(y.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_scale_noise_unnormalized_multiplies() {
        let x = ramp([1, 1, 2, 2]);
        let expected: Vec<f32> = (x.clone() * 0.5).to_data().to_vec().unwrap();
        let actual: Vec<f32> = scale_noise(x, 0.5, false).to_data().to_vec().unwrap();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_roll_dim() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::from_floats([[[[0.0, 1.0, 2.0, 3.0]]]], &device);
        let rolled: Vec<f32> = roll_dim(x.clone(), 1, 3).to_data().to_vec().unwrap();
        assert_eq!(rolled, vec![3.0, 0.0, 1.0, 2.0]);
        let same: Vec<f32> = roll_dim(x, 4, 3).to_data().to_vec().unwrap();
        assert_eq!(same, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_repeat_to_batch_size() {
        let x = ramp([2, 1, 2, 2]);
        assert_eq!(repeat_to_batch_size(x.clone(), 5).dims(), [5, 1, 2, 2]);
        assert_eq!(repeat_to_batch_size(x, 1).dims(), [1, 1, 2, 2]);
    }

    #[test]
    fn test_quantile() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(quantile(&mut v, 0.5), 3.0);
        assert_eq!(quantile(&mut v, 1.0), 5.0);
        assert!((quantile(&mut v, 0.1) - 1.4).abs() < 1e-6);
    }

    #[test]
    fn test_frobenius_norm() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::from_floats([[[[3.0, 4.0]]]], &device);
        let norm: Vec<f32> = frobenius_norm(x).to_data().to_vec().unwrap();
        assert!((norm[0] - 5.0).abs() < 1e-6);
    }
}
