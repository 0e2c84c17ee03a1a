//! # neural_adv
//!
//! Adversarial training of neural radiance fields with Burn.
//!
//! The crate optimizes a radiance field so that its renderings are reconstructed
//! faithfully while a frozen surrogate classifier or detector assigns them an
//! attacker-chosen class. It builds on adv_core (math, ray marching, meshes) and
//! adv_io (labels, datasets, images, OBJ export).
//!
//! ## Features
//!
//! - **Options**: grouped burn `Config` structs, parsed with clap and normalized by a pure function
//! - **Target selection**: `random` or a fixed ImageNet index, with its label
//! - **Surrogate**: resize, optional normalization and a frozen backbone
//! - **Radiance field**: positional-encoding MLP with optional SDF density and specular head
//! - **Renderer**: occupancy-accelerated CPU marching, differentiable tensor compositing
//! - **Training**: two stages, Adam with warmup/decay, parameter averaging, checkpoints
//! - **Export**: cleaned meshes (stage 0) and textured meshes (stage 1)
//!
//! ## Quick Start
//!
//! ```ignore
//! use neural_adv::config::{Options, RunOptions};
//!
//! let options = Options::new(RunOptions::new("data/lego".to_string()))
//!     .with_training(neural_adv::config::TrainingOptions::new().with_iters(2000));
//! neural_adv::pipeline::run(options)?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! adv_core (pure math)
//!     │
//!     ├──────────────────┐
//!     ▼                  ▼
//! adv_io            neural_adv
//! (files)        (training, CLI)
//!     │                  ▲
//!     └──────────────────┘
//! ```
//!
//! ## Feature Flags
//!
//! - `ndarray` (default): CPU backend
//! - `wgpu`: GPU backend via WebGPU

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod data;
pub mod device;
pub mod error;
pub mod export;
pub mod loss;
pub mod nn;
pub mod pipeline;
pub mod render;
pub mod surrogate;
pub mod target;
pub mod training;

// Re-export key types for convenience
pub use config::{normalize, validate, Options};
pub use error::{NeuralAdvError, Result};
pub use surrogate::{build_surrogate, SurrogateKind, SurrogatePipeline};
pub use target::{resolve_target, TargetClass, TargetSpec};
pub use training::{AttackTrainer, Trainer};

// Re-export from adv_core and adv_io for convenience
pub use adv_core::{Cadence, Point3};
pub use adv_io::LabelTable;
