//! Noise specification trees
//!
//! [`NoiseItem`] is a weighted base generator, [`NoiseChain`] a weighted sum
//! of specs, and [`NoiseSpec`] the closed set of everything that can appear
//! in a tree. Specs are plain values: cloning a tree copies it, and the only
//! in-place edit is the factor.

use burn::prelude::*;
use burn_sonar_core::{ConfigError, ValidationError, scale_noise};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::composite::CompositeNoise;
use crate::guided::GuidedNoise;
use crate::modulated::ModulatedNoise;
use crate::noise_type::NoiseType;
use crate::repeated::RepeatedNoise;
use crate::sampler::{
    BindOptions, BoxedNoiseSampler, NoiseSampler, NoiseSamplerFactory, get_noise_sampler,
};
use crate::scheduled::ScheduledNoise;

/// Declarative form of a [`NoiseItem`], e.g. parsed from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseItemDesc {
    #[serde(default = "default_factor")]
    pub factor: f32,
    #[serde(default)]
    pub noise_type: Option<NoiseType>,
}

fn default_factor() -> f32 {
    1.0
}

/// A single base generator with a weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NoiseItemDesc", into = "NoiseItemDesc")]
pub struct NoiseItem {
    factor: f32,
    noise_type: NoiseType,
}

impl NoiseItem {
    pub fn new(factor: f32, noise_type: NoiseType) -> Self {
        Self { factor, noise_type }
    }

    pub fn noise_type(&self) -> NoiseType {
        self.noise_type
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn set_factor(&mut self, factor: f32) -> &mut Self {
        self.factor = factor;
        self
    }
}

impl TryFrom<NoiseItemDesc> for NoiseItem {
    type Error = ValidationError;

    fn try_from(desc: NoiseItemDesc) -> Result<Self, Self::Error> {
        let noise_type = desc
            .noise_type
            .ok_or(ValidationError::MissingField("noise_type"))?;
        Ok(Self::new(desc.factor, noise_type))
    }
}

impl From<NoiseItem> for NoiseItemDesc {
    fn from(item: NoiseItem) -> Self {
        Self {
            factor: item.factor,
            noise_type: Some(item.noise_type),
        }
    }
}

impl<B: Backend> NoiseSamplerFactory<B> for NoiseItem {
    fn factor(&self) -> f32 {
        self.factor
    }

    fn set_factor(&mut self, factor: f32) {
        self.factor = factor;
    }

    fn make_noise_sampler(
        &self,
        x: &Tensor<B, 4>,
        options: &BindOptions,
    ) -> Result<BoxedNoiseSampler<B>, ConfigError> {
        let sampler = get_noise_sampler(self.noise_type, x, options, self.factor)?;
        Ok(Box::new(sampler))
    }
}

/// Ordered weighted sum of noise specs
#[derive(Debug, Clone)]
pub struct NoiseChain<B: Backend> {
    items: Vec<NoiseSpec<B>>,
}

impl<B: Backend> Default for NoiseChain<B> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<B: Backend> NoiseChain<B> {
    pub fn new(items: Vec<NoiseSpec<B>>) -> Self {
        Self { items }
    }

    pub fn add(&mut self, item: impl Into<NoiseSpec<B>>) -> &mut Self {
        self.items.push(item.into());
        self
    }

    pub fn items(&self) -> &[NoiseSpec<B>] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of the children's absolute factors
    pub fn factor(&self) -> f32 {
        self.items.iter().map(|item| item.factor().abs()).sum()
    }

    /// Clone with child factors divided so the chain factor becomes `scale`
    ///
    /// Relative weights are preserved. A zero or non-finite divisor (zero
    /// chain factor, or `scale == 0`) leaves factors as-is.
    pub fn rescaled(&self, scale: f32) -> Self {
        let divisor = self.factor() / scale;
        let divisor = if divisor.is_finite() && divisor != 0.0 {
            divisor
        } else {
            1.0
        };
        let mut result = self.clone();
        if divisor != 1.0 {
            for item in &mut result.items {
                let factor = item.factor();
                item.set_factor(factor / divisor);
            }
        }
        result
    }
}

impl<B: Backend> NoiseSamplerFactory<B> for NoiseChain<B> {
    fn factor(&self) -> f32 {
        NoiseChain::factor(self)
    }

    /// Rescale the children so the chain factor becomes `factor`
    fn set_factor(&mut self, factor: f32) {
        *self = self.rescaled(factor);
    }

    fn make_noise_sampler(
        &self,
        x: &Tensor<B, 4>,
        options: &BindOptions,
    ) -> Result<BoxedNoiseSampler<B>, ConfigError> {
        let child_options = options.with_normalized(false);
        let (first, rest) = self.items.split_first().ok_or(ConfigError::EmptyChain)?;
        let first = first.make_noise_sampler(x, &child_options)?;
        let rest = rest
            .iter()
            .map(|item| item.make_noise_sampler(x, &child_options))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(items = rest.len() + 1, factor = self.factor(), "bound noise chain");
        Ok(Box::new(ChainNoiseSampler {
            first,
            rest,
            factor: self.factor(),
            normalized: options.normalized,
        }))
    }
}

struct ChainNoiseSampler<B: Backend> {
    first: BoxedNoiseSampler<B>,
    rest: Vec<BoxedNoiseSampler<B>>,
    factor: f32,
    normalized: bool,
}

impl<B: Backend> NoiseSampler<B> for ChainNoiseSampler<B> {
    fn sample(&mut self, sigma: f32, sigma_next: f32) -> Tensor<B, 4> {
        let sum = self
            .rest
            .iter_mut()
            .fold(self.first.sample(sigma, sigma_next), |acc, sampler| {
                acc + sampler.sample(sigma, sigma_next)
            });
        scale_noise(sum, self.factor, self.normalized)
    }
}

/// Any node of a noise specification tree
#[derive(Debug, Clone)]
pub enum NoiseSpec<B: Backend> {
    Item(NoiseItem),
    Chain(NoiseChain<B>),
    Composite(Box<CompositeNoise<B>>),
    Guided(Box<GuidedNoise<B>>),
    Scheduled(Box<ScheduledNoise<B>>),
    Repeated(Box<RepeatedNoise<B>>),
    Modulated(Box<ModulatedNoise<B>>),
}

impl<B: Backend> NoiseSpec<B> {
    fn as_factory(&self) -> &dyn NoiseSamplerFactory<B> {
        match self {
            NoiseSpec::Item(item) => item,
            NoiseSpec::Chain(chain) => chain,
            NoiseSpec::Composite(spec) => spec.as_ref(),
            NoiseSpec::Guided(spec) => spec.as_ref(),
            NoiseSpec::Scheduled(spec) => spec.as_ref(),
            NoiseSpec::Repeated(spec) => spec.as_ref(),
            NoiseSpec::Modulated(spec) => spec.as_ref(),
        }
    }

    fn as_factory_mut(&mut self) -> &mut dyn NoiseSamplerFactory<B> {
        match self {
            NoiseSpec::Item(item) => item,
            NoiseSpec::Chain(chain) => chain,
            NoiseSpec::Composite(spec) => spec.as_mut(),
            NoiseSpec::Guided(spec) => spec.as_mut(),
            NoiseSpec::Scheduled(spec) => spec.as_mut(),
            NoiseSpec::Repeated(spec) => spec.as_mut(),
            NoiseSpec::Modulated(spec) => spec.as_mut(),
        }
    }

    pub fn factor(&self) -> f32 {
        self.as_factory().factor()
    }

    pub fn set_factor(&mut self, factor: f32) -> &mut Self {
        self.as_factory_mut().set_factor(factor);
        self
    }
}

impl<B: Backend> NoiseSamplerFactory<B> for NoiseSpec<B> {
    fn factor(&self) -> f32 {
        NoiseSpec::factor(self)
    }

    fn set_factor(&mut self, factor: f32) {
        self.as_factory_mut().set_factor(factor);
    }

    fn make_noise_sampler(
        &self,
        x: &Tensor<B, 4>,
        options: &BindOptions,
    ) -> Result<BoxedNoiseSampler<B>, ConfigError> {
        self.as_factory().make_noise_sampler(x, options)
    }
}

impl<B: Backend> From<NoiseItem> for NoiseSpec<B> {
    fn from(item: NoiseItem) -> Self {
        NoiseSpec::Item(item)
    }
}

impl<B: Backend> From<NoiseChain<B>> for NoiseSpec<B> {
    fn from(chain: NoiseChain<B>) -> Self {
        NoiseSpec::Chain(chain)
    }
}

impl<B: Backend> From<CompositeNoise<B>> for NoiseSpec<B> {
    fn from(spec: CompositeNoise<B>) -> Self {
        NoiseSpec::Composite(Box::new(spec))
    }
}

impl<B: Backend> From<GuidedNoise<B>> for NoiseSpec<B> {
    fn from(spec: GuidedNoise<B>) -> Self {
        NoiseSpec::Guided(Box::new(spec))
    }
}

impl<B: Backend> From<ScheduledNoise<B>> for NoiseSpec<B> {
    fn from(spec: ScheduledNoise<B>) -> Self {
        NoiseSpec::Scheduled(Box::new(spec))
    }
}

impl<B: Backend> From<RepeatedNoise<B>> for NoiseSpec<B> {
    fn from(spec: RepeatedNoise<B>) -> Self {
        NoiseSpec::Repeated(Box::new(spec))
    }
}

impl<B: Backend> From<ModulatedNoise<B>> for NoiseSpec<B> {
    fn from(spec: ModulatedNoise<B>) -> Self {
        NoiseSpec::Modulated(Box::new(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn item(factor: f32, noise_type: NoiseType) -> NoiseSpec<TestBackend> {
        NoiseItem::new(factor, noise_type).into()
    }

    #[test]
    fn test_item_desc_requires_noise_type() {
        let err = NoiseItem::try_from(NoiseItemDesc {
            factor: 1.0,
            noise_type: None,
        })
        .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("noise_type"));

        let parsed: NoiseItem = serde_json::from_str(r#"{"factor": 0.5, "noise_type": "pink"}"#).unwrap();
        assert_eq!(parsed, NoiseItem::new(0.5, NoiseType::Pink));
        assert!(serde_json::from_str::<NoiseItem>(r#"{"factor": 0.5}"#).is_err());
    }

    #[test]
    fn test_chain_factor_sums_magnitudes() {
        let chain = NoiseChain::new(vec![
            item(0.5, NoiseType::Gaussian),
            item(-0.25, NoiseType::Pink),
            item(1.0, NoiseType::Uniform),
        ]);
        assert!((chain.factor() - 1.75).abs() < 1e-6);
    }

    #[test]
    fn test_rescaled_zero_factor_is_noop() {
        let chain = NoiseChain::new(vec![item(0.0, NoiseType::Gaussian)]);
        let rescaled = chain.rescaled(1.0);
        assert_eq!(rescaled.items()[0].factor(), 0.0);
    }

    #[test]
    fn test_rescaled_to_zero_keeps_factors_finite() {
        let zeros = NoiseChain::new(vec![item(0.0, NoiseType::Gaussian), item(0.0, NoiseType::Pink)]);
        let factors: Vec<f32> = zeros.rescaled(0.0).items().iter().map(|i| i.factor()).collect();
        assert_eq!(factors, vec![0.0, 0.0]);

        let mut spec: NoiseSpec<TestBackend> =
            NoiseChain::new(vec![item(0.5, NoiseType::Gaussian), item(1.5, NoiseType::Pink)]).into();
        spec.set_factor(0.0);
        assert!((spec.factor() - 2.0).abs() < 1e-6);
        let NoiseSpec::Chain(chain) = &spec else {
            panic!("expected chain");
        };
        assert!(chain.items().iter().all(|i| i.factor().is_finite()));
    }

    #[test]
    fn test_nested_chain_set_factor() {
        let inner = NoiseChain::new(vec![item(1.0, NoiseType::Gaussian), item(3.0, NoiseType::Pink)]);
        let mut outer = NoiseChain::new(vec![inner.into(), item(1.0, NoiseType::Uniform)]);
        assert!((outer.factor() - 5.0).abs() < 1e-6);
        let rescaled = outer.rescaled(1.0);
        assert!((rescaled.factor() - 1.0).abs() < 1e-6);
        let NoiseSpec::Chain(inner) = &rescaled.items()[0] else {
            panic!("expected nested chain");
        };
        let ratio = inner.items()[1].factor() / inner.items()[0].factor();
        assert!((ratio - 3.0).abs() < 1e-5);

        outer.add(NoiseItem::new(5.0, NoiseType::Laplacian));
        assert_eq!(outer.len(), 3);
    }

    #[test]
    fn test_empty_chain_fails_to_bind() {
        let chain = NoiseChain::<TestBackend>::default();
        let x = Tensor::<TestBackend, 4>::zeros([1, 1, 4, 4], &Default::default());
        let result = chain.make_noise_sampler(&x, &BindOptions::default());
        assert!(matches!(result, Err(ConfigError::EmptyChain)));
    }

    #[test]
    fn test_chain_child_failure_propagates() {
        let chain = NoiseChain::new(vec![item(1.0, NoiseType::Gaussian), item(1.0, NoiseType::Brownian)]);
        let x = Tensor::<TestBackend, 4>::zeros([1, 1, 4, 4], &Default::default());
        let result = chain.make_noise_sampler(&x, &BindOptions::default());
        assert!(matches!(result, Err(ConfigError::MissingSigmaBounds { .. })));
    }
}
