//! Momentum integrator shared by the sonar step functions
//!
//! Each step blends the current derivative with an exponential moving
//! average of previous (blended) derivatives before taking the Euler step.
//! With `momentum = 1` the update is exactly `x + d * dt`.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use burn::tensor::Distribution;
use burn_sonar_core::ConfigError;
use serde::{Deserialize, Serialize};

/// Initial value of the derivative history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryType {
    /// Start from zero; the first blended derivative becomes the history
    #[default]
    Zero,
    /// Start from standard normal noise shaped like the sample
    Rand,
    /// Start from the initial sample itself
    Sample,
}

impl HistoryType {
    pub fn name(&self) -> &'static str {
        match self {
            HistoryType::Zero => "zero",
            HistoryType::Rand => "rand",
            HistoryType::Sample => "sample",
        }
    }
}

impl fmt::Display for HistoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HistoryType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zero" => Ok(HistoryType::Zero),
            "rand" => Ok(HistoryType::Rand),
            "sample" => Ok(HistoryType::Sample),
            _ => Err(ConfigError::UnknownHistoryType(s.to_string())),
        }
    }
}

/// Momentum settings shared by every sonar sampler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SonarConfig {
    /// Weight of the current derivative; 1.0 disables momentum
    pub momentum: f32,
    /// Weight kept by the history on each update
    pub momentum_hist: f32,
    pub momentum_init: HistoryType,
    /// Sign and strength of the history's pull
    pub direction: f32,
}

impl Default for SonarConfig {
    fn default() -> Self {
        Self {
            momentum: 0.95,
            momentum_hist: 0.75,
            momentum_init: HistoryType::Zero,
            direction: 1.0,
        }
    }
}

impl SonarConfig {
    pub fn with_momentum(mut self, momentum: f32) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_momentum_hist(mut self, momentum_hist: f32) -> Self {
        self.momentum_hist = momentum_hist;
        self
    }

    pub fn with_momentum_init(mut self, momentum_init: HistoryType) -> Self {
        self.momentum_init = momentum_init;
        self
    }

    pub fn with_direction(mut self, direction: f32) -> Self {
        self.direction = direction;
        self
    }
}

#[derive(Debug, Clone)]
enum History<B: Backend> {
    Zero,
    Tensor(Tensor<B, 4>),
}

/// Per-run momentum state
#[derive(Debug, Clone)]
pub struct SonarState<B: Backend> {
    config: SonarConfig,
    history: Option<History<B>>,
}

impl<B: Backend> SonarState<B> {
    pub fn new(config: SonarConfig) -> Self {
        Self {
            config,
            history: None,
        }
    }

    pub fn config(&self) -> &SonarConfig {
        &self.config
    }

    /// The history tensor, `None` while it is still zero or uninitialized
    pub fn history(&self) -> Option<&Tensor<B, 4>> {
        match &self.history {
            Some(History::Tensor(t)) => Some(t),
            _ => None,
        }
    }

    /// Initialize the history from `x` on the first call; later calls do nothing
    pub fn init_history(&mut self, x: &Tensor<B, 4>) {
        if self.history.is_some() {
            return;
        }
        self.history = Some(match self.config.momentum_init {
            HistoryType::Zero => History::Zero,
            HistoryType::Sample => History::Tensor(x.clone()),
            HistoryType::Rand => History::Tensor(Tensor::random(
                x.dims(),
                Distribution::Normal(0.0, 1.0),
                &x.device(),
            )),
        });
    }

    /// Euler step with the derivative blended against the history
    pub fn momentum_step(&mut self, x: Tensor<B, 4>, d: Tensor<B, 4>, dt: f32) -> Tensor<B, 4> {
        let SonarConfig {
            momentum,
            momentum_hist,
            direction,
            ..
        } = self.config;
        if momentum == 1.0 {
            return x + d * dt;
        }

        let p = (1.0 - momentum) * direction;
        let momentum_d = match &self.history {
            Some(History::Tensor(h)) => d * (1.0 - p) + h.clone() * p,
            _ => d * (1.0 - p),
        };
        let x = x + momentum_d.clone() * dt;

        let q = 1.0 - momentum_hist;
        let history = match self.history.take() {
            Some(History::Tensor(h)) => h * (1.0 - q) + momentum_d * q,
            _ => momentum_d,
        };
        self.history = Some(History::Tensor(history));
        x
    }
}
