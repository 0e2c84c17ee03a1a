//! Neural network modules for the radiance field.
//!
//! - [`FourierEncoder`]: sinusoidal position and direction encodings
//! - [`Mlp`]: ReLU perceptron building block
//! - [`NerfNetwork`]: density and color field

pub mod encoder;
pub mod mlp;
pub mod network;

pub use encoder::{FourierEncoder, FourierEncoderConfig};
pub use mlp::{lerp_param, Mlp, MlpConfig};
pub use network::{contract_points, FieldOutput, NerfNetwork, NerfNetworkConfig, Shading};
