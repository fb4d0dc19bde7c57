//! Error taxonomy shared by the noise and sampler crates
//!
//! Every error is raised while a noise tree or sampler config is being constructed or bound,
//! before any tensor work starts. Nothing is retried.

use thiserror::Error;

/// A configuration that cannot be bound into a working sampler
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown noise type: {0}")]
    UnknownNoiseType(String),

    #[error("Unknown guidance type: {0}")]
    UnknownGuidanceType(String),

    #[error("Unknown modulation type: {0}")]
    UnknownModulationType(String),

    #[error("Unknown modulation dims: {0}")]
    UnknownModulationDims(String),

    #[error("Unknown history type: {0}")]
    UnknownHistoryType(String),

    #[error("Noise type {noise_type} requires sigma_min and sigma_max")]
    MissingSigmaBounds { noise_type: &'static str },

    #[error("Noise chain has no items")]
    EmptyChain,

    #[error("Explicit noise sampler supplied together with non-default noise type {0}")]
    ConflictingNoiseSampler(String),

    #[error("Repeat length must be at least 1")]
    InvalidRepeatLength,

    #[error("Sigma schedule is empty")]
    EmptySchedule,
}

/// A declarative description missing a required field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}
