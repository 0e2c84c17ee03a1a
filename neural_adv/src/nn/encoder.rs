//! Fourier positional and directional encoders.

use burn::config::Config;
use burn::module::Module;
use burn::prelude::*;

/// Configuration for [`FourierEncoder`].
#[derive(Config, Debug)]
pub struct FourierEncoderConfig {
    /// Number of frequency bands.
    pub num_bands: usize,
    /// Highest frequency exponent; bands span `2^0 .. 2^max_freq_log2`.
    #[config(default = 5.0)]
    pub max_freq_log2: f32,
    /// Input dimension.
    #[config(default = 3)]
    pub input_dim: usize,
    /// Prepend the raw input to the features.
    #[config(default = true)]
    pub include_input: bool,
}

impl FourierEncoderConfig {
    /// Initialize the encoder.
    pub fn init<B: Backend>(&self, device: &B::Device) -> FourierEncoder<B> {
        let frequencies: Vec<f32> = (0..self.num_bands)
            .map(|i| {
                let t = i as f32 / (self.num_bands - 1).max(1) as f32;
                (t * self.max_freq_log2).exp2() * std::f32::consts::PI
            })
            .collect();

        FourierEncoder {
            frequencies: Tensor::from_floats(frequencies.as_slice(), device),
            input_dim: self.input_dim,
            include_input: self.include_input,
        }
    }
}

/// Sinusoidal encoding `[x, sin(f x), cos(f x)]` over a fixed set of frequencies.
#[derive(Module, Debug)]
pub struct FourierEncoder<B: Backend> {
    frequencies: Tensor<B, 1>,
    input_dim: usize,
    include_input: bool,
}

impl<B: Backend> FourierEncoder<B> {
    /// Number of frequency bands.
    pub fn num_bands(&self) -> usize {
        self.frequencies.dims()[0]
    }

    /// Output feature dimension.
    pub fn output_dim(&self) -> usize {
        let fourier_dim = self.input_dim * self.num_bands() * 2;
        if self.include_input {
            self.input_dim + fourier_dim
        } else {
            fourier_dim
        }
    }

    /// Encode `[batch, input_dim]` with every band active.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward_progressive(x, self.num_bands())
    }

    /// Encode with only the lowest `active_bands` bands; the rest are zeroed.
    pub fn forward_progressive(&self, x: Tensor<B, 2>, active_bands: usize) -> Tensor<B, 2> {
        let [batch, dim] = x.dims();
        let num_bands = self.num_bands();

        let freqs = self.frequencies.clone().reshape([1, 1, num_bands]);
        let scaled = x.clone().reshape([batch, dim, 1]) * freqs;

        let mut sin = scaled.clone().sin();
        let mut cos = scaled.cos();
        if active_bands < num_bands {
            let mask: Vec<f32> = (0..num_bands)
                .map(|i| if i < active_bands { 1.0 } else { 0.0 })
                .collect();
            let mask = Tensor::<B, 1>::from_floats(mask.as_slice(), &x.device())
                .reshape([1, 1, num_bands]);
            sin = sin * mask.clone();
            cos = cos * mask;
        }

        let fourier = Tensor::cat(vec![sin, cos], 2).reshape([batch, dim * num_bands * 2]);

        if self.include_input {
            Tensor::cat(vec![x, fourier], 1)
        } else {
            fourier
        }
    }
}
