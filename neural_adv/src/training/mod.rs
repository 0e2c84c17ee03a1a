//! Training infrastructure for the attack.
//!
//! This module provides:
//! - `AttackTrainer`: the reference `Trainer` for both stages
//! - Optimizer and learning-rate schedule factories
//! - Parameter averaging for evaluation
//! - Evaluation meters and step metrics
//! - Checkpoint save/load for training resumption

mod checkpoint;
mod ema;
mod metrics;
mod optimizer;
mod trainer;

pub use checkpoint::{
    checkpoint_exists, find_latest_checkpoint, load_checkpoint, load_network, save_checkpoint,
    save_network, CheckpointManager, CheckpointMetadata, CheckpointPolicy, Restored,
    CHECKPOINT_VERSION, MAX_PERIODIC_CHECKPOINTS,
};
pub use ema::{ParamEma, EMA_DECAY};
pub use metrics::{
    psnr, ssim, AttackSuccessMeter, EvalSample, Meter, MetricsTracker, PsnrMeter, SsimMeter,
    TrainMetrics,
};
pub use optimizer::{
    AdamFactory, LrSchedule, OptimizerFactory, SchedulerFactory, TrainingState,
    WarmupDecayFactory, WarmupExponentialDecay,
};
pub use trainer::{AttackTrainer, EvalReport, Trainer, TrainerInputs, TrainerSettings};
