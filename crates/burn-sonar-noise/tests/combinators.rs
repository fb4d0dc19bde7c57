//! Combinator behaviour checked against independently bound base samplers.

use burn::prelude::*;
use burn_ndarray::NdArray;
use burn_sonar_core::tensor::{NORMALIZE_DIMS, std_dims, to_host};
use burn::tensor::Distribution;
use burn_sonar_core::{ConfigError, GuidanceType, guidance_euler, scale_noise};
use burn_sonar_noise::{
    BindOptions, CompositeNoise, GuidedNoise, ModulatedNoise, ModulationType, NoiseChain, NoiseItem,
    NoiseSampler, NoiseSamplerFactory, NoiseSpec, NoiseType, RepeatedNoise, ScheduledNoise,
};

type TestBackend = NdArray<f32>;

const EPSILON: f32 = 1e-4;

fn latent() -> Tensor<TestBackend, 4> {
    Tensor::zeros([2, 3, 8, 8], &Default::default())
}

fn options() -> BindOptions {
    BindOptions::default().with_seed(1234)
}

fn assert_close(expected: &[f32], actual: &[f32], name: &str) {
    assert_eq!(expected.len(), actual.len(), "{name}: length mismatch");
    for (i, (e, a)) in expected.iter().zip(actual).enumerate() {
        assert!(
            (e - a).abs() < EPSILON,
            "{}[{}]: expected {}, got {}",
            name,
            i,
            e,
            a
        );
    }
}

/// Raw draws of `spec` bound on its own, scaled like a combinator child
fn reference_draws(
    spec: &NoiseSpec<TestBackend>,
    factor: f32,
    normalize: bool,
    steps: &[(f32, f32)],
) -> Vec<Vec<f32>> {
    let mut sampler = spec
        .make_noise_sampler(&latent(), &options().with_normalized(false))
        .unwrap();
    steps
        .iter()
        .map(|&(s, sn)| to_host(scale_noise(sampler.sample(s, sn), factor, normalize)))
        .collect()
}

// ============================================================================
// Composite
// ============================================================================

#[test]
fn test_composite_full_mask_selects_src() {
    let dst = NoiseItem::new(1.0, NoiseType::Uniform);
    let src = NoiseItem::new(1.0, NoiseType::Gaussian);
    let mask = Tensor::<TestBackend, 3>::ones([1, 4, 4], &Default::default());
    let composite = CompositeNoise::new(0.5, dst, src, mask);

    let mut sampler = composite.make_noise_sampler(&latent(), &options()).unwrap();
    let expected = reference_draws(&src.into(), 0.5, true, &[(1.0, 0.5)]);
    assert_close(&expected[0], &to_host(sampler.sample(1.0, 0.5)), "composite_ones");
}

#[test]
fn test_composite_empty_mask_selects_dst() {
    let dst = NoiseItem::new(1.0, NoiseType::Laplacian);
    let src = NoiseItem::new(1.0, NoiseType::Gaussian);
    let mask = Tensor::<TestBackend, 3>::zeros([1, 8, 8], &Default::default());
    let composite = CompositeNoise::new(2.0, dst, src, mask).with_normalize_dst(false);

    let mut sampler = composite.make_noise_sampler(&latent(), &options()).unwrap();
    let expected = reference_draws(&dst.into(), 2.0, false, &[(1.0, 0.5)]);
    assert_close(&expected[0], &to_host(sampler.sample(1.0, 0.5)), "composite_zeros");
}

// ============================================================================
// Scheduled
// ============================================================================

#[test]
fn test_scheduled_window() {
    let base = NoiseItem::new(1.0, NoiseType::Gaussian);
    let scheduled = ScheduledNoise::new(1.0, base, 5.0, 1.0);
    assert!(scheduled.contains(5.0));
    assert!(scheduled.contains(1.0));
    assert!(!scheduled.contains(0.5));

    let mut sampler = scheduled.make_noise_sampler(&latent(), &options()).unwrap();
    let expected = reference_draws(&base.into(), 1.0, true, &[(3.0, 2.0)]);

    let outside = to_host(sampler.sample(8.0, 5.0));
    assert!(outside.iter().all(|v| *v == 0.0));
    // the fallback consumes no draws from the base stream
    assert_close(&expected[0], &to_host(sampler.sample(3.0, 2.0)), "scheduled_inside");
    let below = to_host(sampler.sample(0.5, 0.0));
    assert!(below.iter().all(|v| *v == 0.0));
}

#[test]
fn test_scheduled_fallback() {
    let base = NoiseItem::new(1.0, NoiseType::Gaussian);
    let fallback = NoiseItem::new(1.0, NoiseType::Uniform);
    let scheduled = ScheduledNoise::new(1.5, base, 2.0, 1.0).with_fallback(fallback);

    let mut sampler = scheduled.make_noise_sampler(&latent(), &options()).unwrap();
    let expected = reference_draws(&fallback.into(), 1.5, true, &[(10.0, 9.0)]);
    assert_close(&expected[0], &to_host(sampler.sample(10.0, 9.0)), "scheduled_fallback");
}

// ============================================================================
// Repeated
// ============================================================================

#[test]
fn test_repeated_cache_is_bounded() {
    let base = NoiseItem::new(1.0, NoiseType::Gaussian);
    let repeated = RepeatedNoise::new(1.0, base, 3)
        .with_permute(false)
        .with_normalize(false);

    let mut sampler = repeated.bind(&latent(), &options()).unwrap();
    let cached = reference_draws(&base.into(), 1.0, false, &[(1.0, 0.9); 3]);
    for (i, expected) in cached.iter().enumerate() {
        assert_close(expected, &to_host(sampler.sample(1.0, 0.9)), "fill");
        assert_eq!(sampler.cached(), i + 1);
    }
    for _ in 0..10 {
        let out = to_host(sampler.sample(0.5, 0.4));
        assert!(cached.iter().any(|c| c == &out), "replay must match a cached draw");
        assert_eq!(sampler.cached(), 3);
    }
}

#[test]
fn test_repeated_permutation_keeps_values() {
    let base = NoiseItem::new(1.0, NoiseType::Uniform);
    let repeated = RepeatedNoise::new(1.0, base, 2).with_normalize(false);

    let mut sampler = repeated.bind(&latent(), &options()).unwrap();
    let sorted = |mut v: Vec<f32>| {
        v.sort_by(|a, b| a.total_cmp(b));
        v
    };
    let cached: Vec<Vec<f32>> = (0..2)
        .map(|_| sorted(to_host(sampler.sample(1.0, 0.5))))
        .collect();
    for _ in 0..20 {
        let out = sorted(to_host(sampler.sample(1.0, 0.5)));
        assert!(cached.iter().any(|c| c == &out));
    }
}

#[test]
fn test_repeated_zero_length_rejected() {
    let repeated = RepeatedNoise::<TestBackend>::new(1.0, NoiseItem::new(1.0, NoiseType::Gaussian), 0);
    assert!(matches!(
        repeated.make_noise_sampler(&latent(), &options()),
        Err(ConfigError::InvalidRepeatLength)
    ));
}

// ============================================================================
// Guided and modulated
// ============================================================================

#[test]
fn test_guided_zero_factor_is_base_noise() {
    let base = NoiseItem::new(1.0, NoiseType::Gaussian);
    let ref_latent = Tensor::<TestBackend, 4>::random(
        [2, 3, 8, 8],
        burn::tensor::Distribution::Normal(0.0, 1.0),
        &Default::default(),
    );
    let guided = GuidedNoise::new(1.0, 0.0, ref_latent, base, GuidanceType::Linear);

    let mut sampler = guided.make_noise_sampler(&latent(), &options()).unwrap();
    let expected = reference_draws(&base.into(), 1.0, true, &[(1.0, 0.5)]);
    assert_close(&expected[0], &to_host(sampler.sample(1.0, 0.5)), "guided_zero");
}

#[test]
fn test_guided_euler_steps_toward_shifted_reference() {
    let device = Default::default();
    let dims = [2, 3, 8, 8];
    let x = Tensor::<TestBackend, 4>::random(dims, Distribution::Normal(0.5, 2.0), &device);
    let ref_latent = Tensor::<TestBackend, 4>::random(dims, Distribution::Normal(-1.0, 3.0), &device);
    let base = NoiseItem::new(1.0, NoiseType::Gaussian);
    let guided = GuidedNoise::new(1.5, 0.6, ref_latent.clone(), base, GuidanceType::Euler);

    let steps = [(2.0, 1.0), (1.0, 0.25)];
    let mut sampler = guided.make_noise_sampler(&x, &options()).unwrap();
    let draws = reference_draws(&base.into(), 1.0, true, &steps);
    let ref_latent = scale_noise(ref_latent, 1.0, true);
    for (draw, &(s, sn)) in draws.into_iter().zip(&steps) {
        let noise = Tensor::from_data(TensorData::new(draw.clone(), dims), &device);
        let stepped = guidance_euler(s, sn, noise, x.clone(), ref_latent.clone(), 0.6);
        let expected = to_host(scale_noise(stepped, 1.5, true));
        let actual = to_host(sampler.sample(s, sn));
        assert_close(&expected, &actual, "guided_euler");
        assert!(expected.iter().zip(&draw).any(|(e, d)| (e - d * 1.5).abs() > 1e-2));
    }
}

#[test]
fn test_modulated_none_passes_through() {
    let base = NoiseItem::new(1.0, NoiseType::Gaussian);
    let modulated = ModulatedNoise::new(0.7, base, ModulationType::None);

    let mut sampler = modulated
        .make_noise_sampler(&latent(), &options().with_normalized(false))
        .unwrap();
    // the base is bound normalized even though the caller asked for raw noise
    let expected = reference_draws(&base.into(), 0.7, true, &[(1.0, 0.5)]);
    assert_close(&expected[0], &to_host(sampler.sample(1.0, 0.5)), "modulated_none");
}

#[test]
fn test_modulated_intensity_is_normalized() {
    let base = NoiseItem::new(1.0, NoiseType::Gaussian);
    let modulated = ModulatedNoise::new(1.0, base, ModulationType::Intensity).with_strength(0.5);
    let x = Tensor::<TestBackend, 4>::random(
        [2, 3, 8, 8],
        burn::tensor::Distribution::Normal(0.0, 1.0),
        &Default::default(),
    );

    let mut sampler = modulated.make_noise_sampler(&x, &options()).unwrap();
    let std = to_host(std_dims(sampler.sample(1.0, 0.5), &NORMALIZE_DIMS));
    assert!(std.iter().all(|s| (s - 1.0).abs() < 1e-3));
}

// ============================================================================
// Normalization through nested trees
// ============================================================================

#[test]
fn test_nested_tree_output_has_unit_std() {
    let mut chain = NoiseChain::default();
    chain
        .add(NoiseItem::new(0.6, NoiseType::Gaussian))
        .add(NoiseItem::new(0.3, NoiseType::Pink))
        .add(ScheduledNoise::new(0.4, NoiseItem::new(1.0, NoiseType::Perlin), 10.0, 0.0));
    let spec = NoiseSpec::from(chain.rescaled(1.0));

    let mut sampler = spec.make_noise_sampler(&latent(), &options()).unwrap();
    for (s, sn) in [(10.0, 5.0), (5.0, 1.0)] {
        let std = to_host(std_dims(sampler.sample(s, sn), &NORMALIZE_DIMS));
        assert!(std.iter().all(|v| (v - 1.0).abs() < 1e-3), "{std:?}");
    }
}

#[test]
fn test_seeded_binding_is_reproducible() {
    let spec: NoiseSpec<TestBackend> = NoiseItem::new(1.0, NoiseType::StudentT).into();
    let mut a = spec.make_noise_sampler(&latent(), &options()).unwrap();
    let mut b = spec.make_noise_sampler(&latent(), &options()).unwrap();
    assert_eq!(to_host(a.sample(1.0, 0.5)), to_host(b.sample(1.0, 0.5)));
}
