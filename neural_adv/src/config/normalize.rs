//! Derivation of dependent options.
//!
//! [`normalize`] is a pure function: it takes the parsed options by value and returns
//! the adjusted set together with a record of every rule that fired. Rules run in a
//! fixed order; later rules see the effect of earlier ones.

use std::fmt;

use adv_core::refine_steps;

use super::options::Options;

/// One rule applied by [`normalize`].
#[derive(Debug, Clone, PartialEq)]
pub enum Adjustment {
    /// Occupancy-accelerated marching is forced on.
    CudaRayForced,
    /// `-O` expanded into its flag set.
    RecommendedPreset,
    /// SDF mode lowered `density_thresh` and disabled mesh refinement decimation.
    SdfDefaults {
        /// Whether `progressive_level` was switched on (stage 0 only).
        progressive_level: bool,
        /// Whether `contract` was switched on (`bound > 1`).
        contract: bool,
    },
    /// Contraction disables untrained-cell marking.
    ContractDisablesMarkUntrained,
    /// `wo_smooth` zeroed the smoothness weights.
    SmoothnessDisabled,
    /// Sparse depth needs whole images, so random image batches were disabled.
    SparseDepthDisablesRandomBatch,
    /// Refinement steps derived from their ratios.
    RefineSteps(Vec<usize>),
}

impl Adjustment {
    /// Adjustments the user should be warned about.
    pub fn is_warning(&self) -> bool {
        matches!(self, Adjustment::SparseDepthDisablesRandomBatch)
    }
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adjustment::CudaRayForced => write!(f, "cuda_ray enabled"),
            Adjustment::RecommendedPreset => write!(
                f,
                "-O: fp16, preload, mark_untrained, random_image_batch, \
                 mesh_visibility_culling, adaptive_num_rays and refine enabled"
            ),
            Adjustment::SdfDefaults {
                progressive_level,
                contract,
            } => write!(
                f,
                "sdf: density_thresh=0.001, refine_decimate_ratio=0, refine_size=0, \
                 enable_offset_nerf_grad, progressive_level={}, contract={}",
                progressive_level, contract
            ),
            Adjustment::ContractDisablesMarkUntrained => {
                write!(f, "contract: mark_untrained disabled")
            }
            Adjustment::SmoothnessDisabled => {
                write!(f, "wo_smooth: lambda_offsets, lambda_lap, lambda_normal set to 0")
            }
            Adjustment::SparseDepthDisablesRandomBatch => write!(
                f,
                "enable_sparse_depth requires whole-image batches, random_image_batch disabled"
            ),
            Adjustment::RefineSteps(steps) => write!(f, "refine_steps = {:?}", steps),
        }
    }
}

/// Normalized options and the rules that produced them.
#[derive(Debug, Clone)]
pub struct Normalized {
    /// The adjusted options.
    pub options: Options,
    /// Applied rules, in order.
    pub adjustments: Vec<Adjustment>,
}

impl Normalized {
    /// Log every adjustment: warnings at `warn`, the rest at `info`.
    pub fn log(&self) {
        for adjustment in &self.adjustments {
            if adjustment.is_warning() {
                log::warn!("{}", adjustment);
            } else {
                log::info!("{}", adjustment);
            }
        }
    }
}

/// Apply the option derivation rules in order.
pub fn normalize(mut options: Options) -> Normalized {
    let mut adjustments = Vec::new();

    options.training.cuda_ray = true;
    adjustments.push(Adjustment::CudaRayForced);

    if options.run.preset_o {
        options.run.fp16 = true;
        options.dataset.preload = true;
        options.training.mark_untrained = true;
        options.dataset.random_image_batch = true;
        options.mesh.mesh_visibility_culling = true;
        options.training.adaptive_num_rays = true;
        options.texture.refine = true;
        adjustments.push(Adjustment::RecommendedPreset);
    }

    if options.run.sdf {
        options.training.density_thresh = 0.001;
        let progressive_level = options.run.stage == 0;
        if progressive_level {
            options.run.progressive_level = true;
        }
        let contract = options.dataset.bound > 1.0;
        if contract {
            options.experimental.contract = true;
        }
        options.training.enable_offset_nerf_grad = true;
        options.texture.refine_decimate_ratio = 0.0;
        options.texture.refine_size = 0.0;
        adjustments.push(Adjustment::SdfDefaults {
            progressive_level,
            contract,
        });
    }

    if options.experimental.contract {
        options.training.mark_untrained = false;
        adjustments.push(Adjustment::ContractDisablesMarkUntrained);
    }

    if options.stage1.wo_smooth {
        options.stage1.lambda_offsets = 0.0;
        options.stage1.lambda_lap = 0.0;
        options.stage1.lambda_normal = 0.0;
        adjustments.push(Adjustment::SmoothnessDisabled);
    }

    if options.dataset.enable_sparse_depth {
        options.dataset.random_image_batch = false;
        adjustments.push(Adjustment::SparseDepthDisablesRandomBatch);
    }

    let steps = refine_steps(&options.texture.refine_steps_ratio, options.training.iters);
    options.texture.refine_steps = steps.clone();
    adjustments.push(Adjustment::RefineSteps(steps));

    Normalized {
        options,
        adjustments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::options::{ExperimentalOptions, RunOptions};

    fn base() -> Options {
        Options::new(RunOptions::new("data".to_string()))
    }

    #[test]
    fn test_cuda_ray_always_on() {
        let normalized = normalize(base());
        assert!(normalized.options.training.cuda_ray);
        assert_eq!(normalized.adjustments[0], Adjustment::CudaRayForced);
    }

    #[test]
    fn test_preset_o() {
        let mut options = base();
        options.run.preset_o = true;
        let out = normalize(options).options;
        assert!(out.run.fp16);
        assert!(out.dataset.preload);
        assert!(out.training.mark_untrained);
        assert!(out.dataset.random_image_batch);
        assert!(out.mesh.mesh_visibility_culling);
        assert!(out.training.adaptive_num_rays);
        assert!(out.texture.refine);
    }

    #[test]
    fn test_sdf_with_large_bound_contracts() {
        let mut options = base();
        options.run.preset_o = true;
        options.run.sdf = true;
        let out = normalize(options).options;

        assert_eq!(out.training.density_thresh, 0.001);
        assert!(out.run.progressive_level);
        assert!(out.experimental.contract);
        assert!(!out.training.mark_untrained);
        assert!(out.training.enable_offset_nerf_grad);
        assert_eq!(out.texture.refine_decimate_ratio, 0.0);
        assert_eq!(out.texture.refine_size, 0.0);
    }

    #[test]
    fn test_sdf_stage1_small_bound() {
        let mut options = base();
        options.run.sdf = true;
        options.run.stage = 1;
        options.dataset.bound = 1.0;
        let normalized = normalize(options);

        assert!(!normalized.options.run.progressive_level);
        assert!(!normalized.options.experimental.contract);
        assert!(normalized.adjustments.contains(&Adjustment::SdfDefaults {
            progressive_level: false,
            contract: false,
        }));
    }

    #[test]
    fn test_explicit_contract_disables_mark_untrained() {
        let mut options = base().with_experimental(ExperimentalOptions::new().with_contract(true));
        options.training.mark_untrained = true;
        assert!(!normalize(options).options.training.mark_untrained);
    }

    #[test]
    fn test_wo_smooth() {
        let mut options = base();
        options.stage1.wo_smooth = true;
        let out = normalize(options).options;
        assert_eq!(out.stage1.lambda_offsets, 0.0);
        assert_eq!(out.stage1.lambda_lap, 0.0);
        assert_eq!(out.stage1.lambda_normal, 0.0);
        assert_eq!(out.stage1.lambda_cd, 3000.0);
    }

    #[test]
    fn test_sparse_depth_warning() {
        let mut options = base();
        options.run.preset_o = true;
        options.dataset.enable_sparse_depth = true;
        let normalized = normalize(options);

        assert!(!normalized.options.dataset.random_image_batch);
        let warnings: Vec<_> = normalized
            .adjustments
            .iter()
            .filter(|a| a.is_warning())
            .collect();
        assert_eq!(warnings, vec![&Adjustment::SparseDepthDisablesRandomBatch]);
    }

    #[test]
    fn test_sparse_depth_warns_without_random_batches() {
        let mut options = base();
        options.dataset.enable_sparse_depth = true;
        options.dataset.random_image_batch = false;
        let normalized = normalize(options);

        assert!(!normalized.options.dataset.random_image_batch);
        assert!(normalized
            .adjustments
            .contains(&Adjustment::SparseDepthDisablesRandomBatch));
    }

    #[test]
    fn test_refine_steps_default_ratios() {
        let out = normalize(base()).options;
        assert_eq!(out.texture.refine_steps, vec![2000, 4000, 6000, 8000, 10000, 14000]);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut options = base();
        options.run.preset_o = true;
        options.run.sdf = true;
        let once = normalize(options).options;
        let twice = normalize(once.clone()).options;
        assert_eq!(once.to_string(), twice.to_string());
    }
}
