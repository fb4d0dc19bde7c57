//! Sigma schedule utilities shared by the step functions

use burn::prelude::*;

/// Convert a denoised estimate into the ODE derivative `(x - denoised) / sigma`
pub fn to_d<B: Backend>(x: Tensor<B, 4>, sigma: f32, denoised: Tensor<B, 4>) -> Tensor<B, 4> {
    (x - denoised) / sigma
}

/// Split the step `sigma_from -> sigma_to` into `(sigma_down, sigma_up)`
///
/// `sigma_down` is the deterministic target and `sigma_up` the amount of
/// fresh noise to inject. `eta = 0` gives a plain ODE step.
pub fn get_ancestral_step(sigma_from: f32, sigma_to: f32, eta: f32) -> (f32, f32) {
    if eta == 0.0 {
        return (sigma_to, 0.0);
    }
    let sigma_up = (eta
        * (sigma_to.powi(2) * (sigma_from.powi(2) - sigma_to.powi(2)) / sigma_from.powi(2)).sqrt())
    .min(sigma_to);
    let sigma_down = (sigma_to.powi(2) - sigma_up.powi(2)).sqrt();
    (sigma_down, sigma_up)
}

/// Smallest positive sigma and largest sigma of a schedule
///
/// Returns `None` when the schedule has no positive sigma.
pub fn sigma_bounds(sigmas: &[f32]) -> Option<(f32, f32)> {
    let sigma_min = sigmas
        .iter()
        .copied()
        .filter(|s| *s > 0.0)
        .min_by(|a, b| a.total_cmp(b))?;
    let sigma_max = sigmas.iter().copied().max_by(|a, b| a.total_cmp(b))?;
    Some((sigma_min, sigma_max))
}
