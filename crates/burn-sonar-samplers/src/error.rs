use burn_sonar_core::ConfigError;
use thiserror::Error;

/// Error type carried out of a progress callback
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sampling aborted by callback at step {step}")]
    Callback {
        step: usize,
        #[source]
        source: BoxError,
    },
}

/// A registration refused by the host's sampler table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Sampler {name} rejected: {reason}")]
    Rejected { name: String, reason: String },
}
