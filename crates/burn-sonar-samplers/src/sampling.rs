//! The outer sampling loop
//!
//! Every sonar sampler implements [`SonarStep`]; [`run_sampler`] drives it
//! across a sigma schedule, reporting each step to an optional callback.
//! An error returned by the callback stops the loop and is passed through.

use burn::prelude::*;
use burn_sonar_core::ConfigError;
use tracing::trace;

use crate::error::{BoxError, SamplerError};

/// The model being sampled: returns the denoised estimate of `x` at `sigma`
///
/// `sigma` holds one value per batch sample.
pub trait Denoiser<B: Backend> {
    fn denoise(&mut self, x: Tensor<B, 4>, sigma: Tensor<B, 1>) -> Tensor<B, 4>;
}

impl<B: Backend, F> Denoiser<B> for F
where
    F: FnMut(Tensor<B, 4>, Tensor<B, 1>) -> Tensor<B, 4>,
{
    fn denoise(&mut self, x: Tensor<B, 4>, sigma: Tensor<B, 1>) -> Tensor<B, 4> {
        self(x, sigma)
    }
}

/// Call `denoiser` with `sigma` broadcast over the batch
pub(crate) fn denoise_at<B: Backend, D: Denoiser<B>>(
    denoiser: &mut D,
    x: Tensor<B, 4>,
    sigma: f32,
) -> Tensor<B, 4> {
    let [batch, _, _, _] = x.dims();
    let sigmas = Tensor::full([batch], sigma, &x.device());
    denoiser.denoise(x, sigmas)
}

/// Result of one solver step
#[derive(Debug, Clone)]
pub struct StepOutput<B: Backend> {
    pub x: Tensor<B, 4>,
    pub sigma: f32,
    /// Sigma the denoiser was evaluated at
    pub sigma_hat: f32,
    pub denoised: Tensor<B, 4>,
}

/// What the progress callback sees after each step
#[derive(Debug, Clone)]
pub struct StepProgress<B: Backend> {
    pub x: Tensor<B, 4>,
    pub i: usize,
    pub sigma: f32,
    pub sigma_hat: f32,
    pub denoised: Tensor<B, 4>,
}

/// Progress callback; returning an error aborts sampling
pub type StepCallback<'a, B> = &'a mut dyn FnMut(&StepProgress<B>) -> Result<(), BoxError>;

/// A sampler that advances a sample by one step of its sigma schedule
pub trait SonarStep<B: Backend> {
    fn sigmas(&self) -> &[f32];

    fn step<D: Denoiser<B>>(&mut self, step_index: usize, x: Tensor<B, 4>, denoiser: &mut D) -> StepOutput<B>;
}

/// Run `sampler` over its whole schedule starting from `x`
pub fn run_sampler<B, S, D>(
    sampler: &mut S,
    denoiser: &mut D,
    mut x: Tensor<B, 4>,
    mut callback: Option<StepCallback<'_, B>>,
) -> Result<Tensor<B, 4>, SamplerError>
where
    B: Backend,
    S: SonarStep<B>,
    D: Denoiser<B>,
{
    let num_sigmas = sampler.sigmas().len();
    if num_sigmas == 0 {
        return Err(ConfigError::EmptySchedule.into());
    }

    for i in 0..num_sigmas - 1 {
        let output = sampler.step(i, x, denoiser);
        trace!(
            step = i,
            sigma = output.sigma,
            sigma_hat = output.sigma_hat,
            "sonar step"
        );
        x = output.x;
        if let Some(callback) = callback.as_mut() {
            let progress = StepProgress {
                x: x.clone(),
                i,
                sigma: sampler.sigmas()[i],
                sigma_hat: output.sigma_hat,
                denoised: output.denoised,
            };
            callback(&progress).map_err(|source| SamplerError::Callback { step: i, source })?;
        }
    }
    Ok(x)
}
