//! Registration of the sonar samplers into a host-owned table
//!
//! The library keeps no global state. A host calls [`register_samplers`]
//! once at startup with its own table, then dispatches by name through
//! [`SamplerKind::sample`].

use std::collections::HashMap;

use burn::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RegistryError, SamplerError};
use crate::euler::{SonarEulerConfig, sample_sonar_euler};
use crate::euler_ancestral::{SonarEulerAncestralConfig, sample_sonar_euler_ancestral};
use crate::sampling::{Denoiser, StepCallback};

/// Samplers offered to a host's sampler table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    SonarEuler,
    SonarEulerAncestral,
}

impl SamplerKind {
    pub const ALL: [SamplerKind; 2] = [SamplerKind::SonarEuler, SamplerKind::SonarEulerAncestral];

    pub fn name(&self) -> &'static str {
        match self {
            SamplerKind::SonarEuler => "sonar_euler",
            SamplerKind::SonarEulerAncestral => "sonar_euler_ancestral",
        }
    }

    /// Run this sampler with default settings
    pub fn sample<B: Backend, D: Denoiser<B>>(
        &self,
        denoiser: &mut D,
        x: Tensor<B, 4>,
        sigmas: &[f32],
        callback: Option<StepCallback<'_, B>>,
    ) -> Result<Tensor<B, 4>, SamplerError> {
        match self {
            SamplerKind::SonarEuler => {
                sample_sonar_euler(denoiser, x, sigmas, SonarEulerConfig::default(), callback)
            }
            SamplerKind::SonarEulerAncestral => sample_sonar_euler_ancestral(
                denoiser,
                x,
                sigmas,
                SonarEulerAncestralConfig::default(),
                None,
                callback,
            ),
        }
    }
}

/// A sampler table owned by the host
pub trait SamplerRegistry {
    fn contains(&self, name: &str) -> bool;

    fn register(&mut self, name: &str, kind: SamplerKind) -> Result<(), RegistryError>;
}

impl SamplerRegistry for HashMap<String, SamplerKind> {
    fn contains(&self, name: &str) -> bool {
        self.contains_key(name)
    }

    fn register(&mut self, name: &str, kind: SamplerKind) -> Result<(), RegistryError> {
        self.insert(name.to_string(), kind);
        Ok(())
    }
}

/// Add the sonar samplers to `registry`, returning how many were added
///
/// Names already present are left alone. A rejected registration is logged
/// and skipped.
pub fn register_samplers(registry: &mut impl SamplerRegistry) -> usize {
    let mut added = 0;
    for kind in SamplerKind::ALL {
        let name = kind.name();
        if registry.contains(name) {
            debug!(name, "sampler already registered");
            continue;
        }
        match registry.register(name, kind) {
            Ok(()) => added += 1,
            Err(err) => warn!(name, error = %err, "failed to register sampler"),
        }
    }
    added
}
