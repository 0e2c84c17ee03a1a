//! Iteration budget arithmetic.
//!
//! The driver is configured in iterations, but the trainer runs in epochs (one pass over the
//! training loader). These helpers convert between the two and define the per-iteration
//! learning-rate multiplier.

use crate::error::AdvCoreError;

/// Number of iterations spent ramping the learning rate up from 1% to 100%.
pub const LR_WARMUP_ITERS: usize = 500;

/// Epoch budget and the save/evaluation cadence derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    /// Number of epochs needed to cover the iteration budget, `ceil(iters / epoch_len)`.
    pub max_epoch: usize,
    /// Save a checkpoint every this many epochs.
    pub save_interval: usize,
    /// Run validation every this many epochs.
    pub eval_interval: usize,
}

impl Cadence {
    /// Derive the cadence.
    ///
    /// # Arguments
    /// * `iters` - Total training iterations
    /// * `epoch_len` - Batches per epoch (the training loader length)
    /// * `n_ckpt` - Desired number of checkpoints over the run
    /// * `n_eval` - Desired number of validation passes over the run
    ///
    /// Intervals use floor division and never drop below one epoch; a request for zero
    /// checkpoints or evaluations is treated as one.
    pub fn new(
        iters: usize,
        epoch_len: usize,
        n_ckpt: usize,
        n_eval: usize,
    ) -> Result<Self, AdvCoreError> {
        if iters == 0 {
            return Err(AdvCoreError::ZeroIterations);
        }
        if epoch_len == 0 {
            return Err(AdvCoreError::EmptyEpoch);
        }

        let max_epoch = iters.div_ceil(epoch_len);
        Ok(Self {
            max_epoch,
            save_interval: (max_epoch / n_ckpt.max(1)).max(1),
            eval_interval: (max_epoch / n_eval.max(1)).max(1),
        })
    }

    /// True if a checkpoint is due after `epoch` (1-based).
    #[inline]
    pub fn should_save(&self, epoch: usize) -> bool {
        epoch % self.save_interval == 0
    }

    /// True if validation is due after `epoch` (1-based).
    #[inline]
    pub fn should_eval(&self, epoch: usize) -> bool {
        epoch % self.eval_interval == 0
    }
}

/// Convert fractional refine ratios to absolute iteration numbers, preserving order.
///
/// Rounds half to even, so `0.5 * 5` becomes `2` and `0.7 * 5` becomes `4`.
#[cfg(any(feature = "std", feature = "alloc"))]
pub fn refine_steps(ratios: &[f64], iters: usize) -> crate::alloc_prelude::Vec<usize> {
    ratios
        .iter()
        .map(|&r| libm::rint(r * iters as f64).max(0.0) as usize)
        .collect()
}

/// Learning-rate multiplier at `iteration`.
///
/// Linear warmup from 0.01 to 1.0 over the first [`LR_WARMUP_ITERS`] iterations, then
/// exponential decay reaching 0.1 at `iters`. Budgets too short for a decay phase keep the
/// multiplier at 1.0 after warmup.
pub fn lr_factor(iteration: usize, iters: usize) -> f64 {
    let warmup = LR_WARMUP_ITERS as f64;
    if iteration <= LR_WARMUP_ITERS {
        return 0.01 + 0.99 * (iteration as f64 / warmup);
    }
    if iters <= LR_WARMUP_ITERS {
        return 1.0;
    }
    let progress = (iteration - LR_WARMUP_ITERS) as f64 / (iters - LR_WARMUP_ITERS) as f64;
    libm::pow(0.1, progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_defaults() {
        // 100 training images, default 20k iters, 50 checkpoints, 5 evaluations
        let c = Cadence::new(20_000, 100, 50, 5).unwrap();
        assert_eq!(c.max_epoch, 200);
        assert_eq!(c.save_interval, 4);
        assert_eq!(c.eval_interval, 40);
    }

    #[test]
    fn test_cadence_ceil_and_min_one() {
        let c = Cadence::new(10, 3, 50, 50).unwrap();
        assert_eq!(c.max_epoch, 4);
        assert_eq!(c.save_interval, 1);
        assert_eq!(c.eval_interval, 1);
    }

    #[test]
    fn test_cadence_zero_counts_treated_as_one() {
        let c = Cadence::new(100, 10, 0, 0).unwrap();
        assert_eq!(c.save_interval, 10);
        assert_eq!(c.eval_interval, 10);
        assert!(c.should_save(10));
        assert!(!c.should_eval(5));
    }

    #[test]
    fn test_cadence_rejects_degenerate_inputs() {
        assert_eq!(Cadence::new(0, 10, 1, 1), Err(AdvCoreError::ZeroIterations));
        assert_eq!(Cadence::new(10, 0, 1, 1), Err(AdvCoreError::EmptyEpoch));
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_refine_steps_default_ratios() {
        let steps = refine_steps(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.7], 20_000);
        assert_eq!(steps, crate::alloc_prelude::vec![2000, 4000, 6000, 8000, 10_000, 14_000]);
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_refine_steps_round_half_even_and_order() {
        assert_eq!(refine_steps(&[0.5, 0.1], 5), crate::alloc_prelude::vec![2, 0]);
        assert_eq!(refine_steps(&[0.3, 0.7], 5), crate::alloc_prelude::vec![2, 4]);
    }

    #[test]
    fn test_lr_factor_warmup_and_decay() {
        assert!((lr_factor(0, 20_000) - 0.01).abs() < 1e-12);
        assert!((lr_factor(250, 20_000) - 0.505).abs() < 1e-12);
        assert!((lr_factor(500, 20_000) - 1.0).abs() < 1e-12);
        assert!((lr_factor(20_000, 20_000) - 0.1).abs() < 1e-9);

        let mid = lr_factor(10_250, 20_000);
        assert!((mid - libm::pow(0.1, 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_lr_factor_short_budget() {
        assert!((lr_factor(300, 300) - 0.604).abs() < 1e-12);
        assert_eq!(lr_factor(800, 300), 1.0);
    }
}
