//! Datasets, providers and ray loaders.

mod dataset;
mod loader;
mod provider;

pub use dataset::{DatasetSplit, SceneDataset};
pub use loader::{RayBatch, RayLoader};
pub use provider::{
    provider_for_task, BackgroundProvider, BlenderProvider, DatasetProvider, OrbitSettings,
    CIRCLE_VIEWS,
};
