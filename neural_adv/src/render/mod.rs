//! Ray sampling and volume rendering.

mod rays;
mod volume;

pub use rays::{PackedSamples, RaySampler, SampleTensors};
pub use volume::{exclusive_prefix_matrix, to_vec, RenderOutput, RenderedView, VolumeRenderer};
