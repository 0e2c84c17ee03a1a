//! Optimizer and learning-rate schedule construction, plus training progress state.
//!
//! Both go through small factory traits so a trainer never hard-codes either choice.

use adv_core::lr_factor;
use burn::config::Config;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, Optimizer};
use burn::tensor::backend::AutodiffBackend;

use crate::config::Options;
use crate::nn::NerfNetwork;

/// Builds the optimizer for the radiance field.
pub trait OptimizerFactory<B: AutodiffBackend> {
    /// Optimizer type produced.
    type Optimizer: Optimizer<NerfNetwork<B>, B>;

    /// Build a fresh optimizer.
    fn build(&self) -> Self::Optimizer;
}

/// Adam settings for the radiance field.
#[derive(Config, Debug)]
pub struct AdamFactory {
    /// First moment decay.
    #[config(default = 0.9)]
    pub beta_1: f32,
    /// Second moment decay.
    #[config(default = 0.99)]
    pub beta_2: f32,
    /// Numerical floor of the second moment.
    #[config(default = 1e-15)]
    pub epsilon: f32,
}

impl AdamFactory {
    /// Factory for a normalized option set.
    pub fn from_options(_options: &Options) -> Self {
        Self::new()
    }
}

impl<B: AutodiffBackend> OptimizerFactory<B> for AdamFactory {
    type Optimizer = OptimizerAdaptor<Adam, NerfNetwork<B>, B>;

    fn build(&self) -> Self::Optimizer {
        AdamConfig::new()
            .with_beta_1(self.beta_1)
            .with_beta_2(self.beta_2)
            .with_epsilon(self.epsilon)
            .init()
    }
}

/// Learning rate as a function of the global step.
pub trait LrSchedule {
    /// Learning rate at `iteration` (0-based).
    fn lr(&self, iteration: usize) -> f64;
}

/// Builds the learning-rate schedule.
pub trait SchedulerFactory {
    /// Schedule type produced.
    type Schedule: LrSchedule;

    /// Build the schedule for `options`.
    fn build(&self, options: &Options) -> Self::Schedule;
}

/// Linear warmup from 1% over the first 500 steps, then exponential decay to 10%.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarmupExponentialDecay {
    /// Peak learning rate.
    pub base_lr: f64,
    /// Total training steps.
    pub iters: usize,
}

impl LrSchedule for WarmupExponentialDecay {
    fn lr(&self, iteration: usize) -> f64 {
        self.base_lr * lr_factor(iteration, self.iters)
    }
}

/// Factory for [`WarmupExponentialDecay`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WarmupDecayFactory;

impl SchedulerFactory for WarmupDecayFactory {
    type Schedule = WarmupExponentialDecay;

    fn build(&self, options: &Options) -> Self::Schedule {
        WarmupExponentialDecay {
            base_lr: options.training.lr,
            iters: options.training.iters,
        }
    }
}

/// Training progress.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingState {
    /// Completed epochs.
    pub epoch: usize,
    /// Completed optimizer steps.
    pub global_step: usize,
    /// Best validation PSNR so far.
    pub best_psnr: f32,
    /// Running average of recent losses.
    pub avg_loss: f32,
    /// Loss of the most recent step.
    pub last_loss: f32,
    loss_ema_factor: f32,
}

impl Default for TrainingState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingState {
    /// Fresh state.
    pub fn new() -> Self {
        Self {
            epoch: 0,
            global_step: 0,
            best_psnr: f32::NEG_INFINITY,
            avg_loss: 0.0,
            last_loss: 0.0,
            loss_ema_factor: 0.99,
        }
    }

    /// State resumed at `epoch` / `global_step`.
    pub fn resumed(epoch: usize, global_step: usize, best_psnr: f32) -> Self {
        Self {
            epoch,
            global_step,
            best_psnr,
            ..Self::new()
        }
    }

    /// Record one optimizer step.
    pub fn on_step(&mut self, loss: f32) {
        self.global_step += 1;
        self.last_loss = loss;
        if self.global_step == 1 {
            self.avg_loss = loss;
        } else {
            self.avg_loss = self.loss_ema_factor * self.avg_loss + (1.0 - self.loss_ema_factor) * loss;
        }
    }

    /// Record a finished epoch.
    pub fn on_epoch(&mut self) {
        self.epoch += 1;
    }

    /// Record a validation PSNR; true if it is a new best.
    pub fn on_validation(&mut self, psnr: f32) -> bool {
        if psnr > self.best_psnr {
            self.best_psnr = psnr;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunOptions;
    use crate::nn::NerfNetworkConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::GradientsParams;
    use burn::prelude::*;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_schedule_endpoints() {
        let mut options = Options::new(RunOptions::new("data".to_string()));
        options.training.lr = 1e-2;
        options.training.iters = 1500;
        let schedule = WarmupDecayFactory.build(&options);

        assert!((schedule.lr(0) - 1e-4).abs() < 1e-10);
        assert!((schedule.lr(500) - 1e-2).abs() < 1e-10);
        assert!((schedule.lr(1500) - 1e-3).abs() < 1e-9);
    }

    #[test]
    fn test_adam_step_moves_parameters() {
        let device = Default::default();
        let model = NerfNetworkConfig::new(1.0).init::<TestBackend>(&device);
        let mut optim = OptimizerFactory::<TestBackend>::build(&AdamFactory::new());

        let x = Tensor::<TestBackend, 2>::from_floats([[0.1, 0.2, 0.3]], &device);
        let before = model.density(x.clone(), usize::MAX).1.into_data().to_vec::<f32>().unwrap();
        let loss = model.density(x.clone(), usize::MAX).1.sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let model = optim.step(1e-2, model, grads);
        let after = model.density(x, usize::MAX).1.into_data().to_vec::<f32>().unwrap();

        // Minimizing the raw head lowers it
        assert!(after[0] < before[0]);
    }

    #[test]
    fn test_training_state() {
        let mut state = TrainingState::new();
        state.on_step(1.0);
        assert_eq!(state.global_step, 1);
        assert!((state.avg_loss - 1.0).abs() < 1e-6);
        state.on_step(0.0);
        assert!((state.avg_loss - 0.99).abs() < 1e-6);

        assert!(state.on_validation(20.0));
        assert!(!state.on_validation(19.0));
        state.on_epoch();
        assert_eq!(state.epoch, 1);
    }
}
