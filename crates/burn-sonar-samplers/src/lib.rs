//! Sonar samplers for diffusion models
//!
//! Euler-family samplers whose derivative is smoothed with momentum:
//!
//! - [`SonarEuler`] - deterministic Euler with optional churn
//! - [`SonarEulerAncestral`] - ancestral Euler with pluggable structured noise
//! - [`SonarNaive`] - ancestral Euler that also pulls toward a reference latent
//!
//! Each has a `sample_*` entry point that runs a whole sigma schedule.
//! [`register_samplers`] adds the registrable ones to a host's sampler table.

pub mod error;
pub mod euler;
pub mod euler_ancestral;
pub mod momentum;
pub mod naive;
pub mod registry;
pub mod sampling;
pub mod scheduler;

pub use error::{BoxError, RegistryError, SamplerError};
pub use euler::{SonarEuler, SonarEulerConfig, sample_sonar_euler};
pub use euler_ancestral::{
    SonarEulerAncestral, SonarEulerAncestralConfig, sample_sonar_euler_ancestral,
};
pub use momentum::{HistoryType, SonarConfig, SonarState};
pub use naive::{SonarNaive, SonarNaiveConfig, sample_sonar_naive};
pub use registry::{SamplerKind, SamplerRegistry, register_samplers};
pub use sampling::{Denoiser, SonarStep, StepCallback, StepOutput, StepProgress, run_sampler};
pub use scheduler::{get_ancestral_step, sigma_bounds, to_d};
