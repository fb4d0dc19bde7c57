//! Structured noise for diffusion sampling
//!
//! A noise specification is a tree of [`NoiseSpec`] nodes: weighted base
//! generators ([`NoiseItem`]), weighted sums ([`NoiseChain`]) and combinators
//! that blend, gate, guide, replay or modulate other specs. Binding a spec to
//! a latent with [`NoiseSamplerFactory::make_noise_sampler`] yields a stateful
//! [`NoiseSampler`] that a solver calls once per step.
//!
//! ```ignore
//! let mut chain = NoiseChain::default();
//! chain
//!     .add(NoiseItem::new(0.8, NoiseType::Gaussian))
//!     .add(NoiseItem::new(0.2, NoiseType::Pink));
//! let spec = NoiseSpec::from(chain.rescaled(1.0));
//! let options = BindOptions::default().with_seed(42);
//! let mut sampler = spec.make_noise_sampler(&latent, &options)?;
//! let noise = sampler.sample(14.6, 10.2);
//! ```

pub mod brownian;
pub mod composite;
pub mod generators;
pub mod guided;
pub mod item;
pub mod modulated;
pub mod noise_type;
pub mod repeated;
pub mod rng;
pub mod sampler;
pub mod scheduled;

pub use brownian::BrownianTree;
pub use composite::CompositeNoise;
pub use guided::GuidedNoise;
pub use item::{NoiseChain, NoiseItem, NoiseItemDesc, NoiseSpec};
pub use modulated::{ModulatedNoise, ModulationDims, ModulationType};
pub use noise_type::{NoiseType, UpscaleMode};
pub use repeated::{RepeatedNoise, RepeatedNoiseSampler};
pub use rng::NoiseRng;
pub use sampler::{
    BaseNoiseSampler, BindOptions, BoxedNoiseSampler, NoiseSampler, NoiseSamplerFactory,
    get_noise_sampler,
};
pub use scheduled::ScheduledNoise;
