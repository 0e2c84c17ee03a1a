//! Backend and device selection.
//!
//! The device is chosen once at start and passed explicitly to every constructor.

use burn::backend::Autodiff;

#[cfg(not(feature = "wgpu"))]
use burn::backend::NdArray;

#[cfg(feature = "wgpu")]
use burn::backend::Wgpu;

/// Inference backend.
#[cfg(not(feature = "wgpu"))]
pub type InnerBackend = NdArray<f32>;

/// Inference backend.
#[cfg(feature = "wgpu")]
pub type InnerBackend = Wgpu;

/// Training backend.
pub type DefaultBackend = Autodiff<InnerBackend>;

/// Device type of [`DefaultBackend`].
pub type DefaultDevice = <DefaultBackend as burn::tensor::backend::Backend>::Device;

/// Pick the device for this run.
pub fn select_device() -> DefaultDevice {
    let device = DefaultDevice::default();
    log::info!("Using device {:?}", device);
    device
}
