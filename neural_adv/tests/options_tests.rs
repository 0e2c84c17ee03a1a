//! Command-line parsing and option derivation properties.

use clap::Parser;
use proptest::prelude::*;

use neural_adv::cli::Cli;
use neural_adv::config::{normalize, validate, Adjustment, RunOptions};
use neural_adv::{NeuralAdvError, Options, TargetSpec};

fn base() -> Options {
    Options::new(RunOptions::new("data/lego".to_string()))
}

#[test]
fn test_cli_defaults_normalize_and_validate() {
    let options = Cli::try_parse_from(["nerf-adv", "data/lego"]).unwrap().into_options();
    let normalized = normalize(options);
    assert!(normalized.options.training.cuda_ray);
    assert_eq!(
        normalized.options.texture.refine_steps,
        vec![2000, 4000, 6000, 8000, 10_000, 14_000]
    );
    validate(&normalized.options).unwrap();
}

#[test]
fn test_sdf_preset_in_stage1_keeps_progressive_level_off() {
    let options = Cli::try_parse_from(["nerf-adv", "data/lego", "-O", "--sdf", "--stage", "1"])
        .unwrap()
        .into_options();
    let normalized = normalize(options);
    let out = &normalized.options;

    assert!(!out.run.progressive_level);
    assert!(out.experimental.contract);
    assert!(!out.training.mark_untrained);
    assert!(normalized.adjustments.contains(&Adjustment::ContractDisablesMarkUntrained));
}

#[test]
fn test_sparse_depth_conflict_is_a_warning() {
    let mut options = base();
    options.dataset.enable_sparse_depth = true;
    options.dataset.random_image_batch = true;
    let normalized = normalize(options);
    assert!(!normalized.options.dataset.random_image_batch);
    assert!(normalized.adjustments.iter().any(Adjustment::is_warning));

    // Depth supervision still needs the colmap layout
    let err = validate(&normalized.options).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_target_label_from_cli() {
    let options = Cli::try_parse_from(["nerf-adv", "data", "--target_label", "Random"])
        .unwrap()
        .into_options();
    assert_eq!(options.attack.target_label.parse::<TargetSpec>().unwrap(), TargetSpec::Random);

    let err = "12a".parse::<TargetSpec>().unwrap_err();
    assert!(matches!(err, NeuralAdvError::InvalidTargetLabel { .. }));
}

proptest! {
    #[test]
    fn normalize_is_idempotent(
        preset in any::<bool>(),
        sdf in any::<bool>(),
        stage in 0u32..2,
        bound in 0.5f32..4.0,
        iters in 1usize..50_000,
    ) {
        let mut options = base();
        options.run.preset_o = preset;
        options.run.sdf = sdf;
        options.run.stage = stage;
        options.dataset.bound = bound;
        options.training.iters = iters;

        let once = normalize(options).options;
        let twice = normalize(once.clone()).options;
        prop_assert_eq!(serde_json::to_value(&once).unwrap(), serde_json::to_value(&twice).unwrap());
    }

    #[test]
    fn refine_steps_follow_ratio_order(
        ratios in proptest::collection::vec(0.0f64..=1.0, 0..8),
        iters in 1usize..100_000,
    ) {
        let mut options = base();
        options.texture.refine_steps_ratio = ratios.clone();
        options.training.iters = iters;
        let steps = normalize(options).options.texture.refine_steps;

        prop_assert_eq!(steps.len(), ratios.len());
        for (step, ratio) in steps.iter().zip(&ratios) {
            prop_assert!(*step <= iters);
            prop_assert!((*step as f64 - ratio * iters as f64).abs() <= 0.5 + 1e-9);
        }
    }

    #[test]
    fn contract_never_leaves_mark_untrained_on(
        preset in any::<bool>(),
        contract in any::<bool>(),
        sdf in any::<bool>(),
        bound in 0.5f32..4.0,
    ) {
        let mut options = base();
        options.run.preset_o = preset;
        options.run.sdf = sdf;
        options.dataset.bound = bound;
        options.experimental.contract = contract;
        let out = normalize(options).options;
        prop_assert!(!(out.experimental.contract && out.training.mark_untrained));
        prop_assert!(out.training.cuda_ray);
    }
}
