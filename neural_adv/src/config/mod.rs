//! Configuration for the attack driver.

mod normalize;
mod options;
mod validate;

pub use normalize::{normalize, Adjustment, Normalized};
pub use options::{
    AttackOptions, Background, ColorSpace, DataFormat, DatasetOptions, ExperimentalOptions,
    GuiOptions, MeshOptions, Options, RunOptions, Stage0Weights, Stage1Weights, TextureOptions,
    TrainSplit, TrainingOptions,
};
pub use validate::{validate, validate_dataset_len};
