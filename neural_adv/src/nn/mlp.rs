//! MLP building block.

use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

/// Configuration for an MLP.
#[derive(Config, Debug)]
pub struct MlpConfig {
    /// Input dimension.
    pub input_dim: usize,
    /// Output dimension.
    pub output_dim: usize,
    /// Hidden layer dimensions.
    #[config(default = "vec![]")]
    pub hidden_dims: Vec<usize>,
    /// Use biases in the linear layers.
    #[config(default = true)]
    pub bias: bool,
}

impl MlpConfig {
    /// Initialize the MLP.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let mut layers = Vec::new();
        let mut in_dim = self.input_dim;

        for &out_dim in &self.hidden_dims {
            layers.push(
                LinearConfig::new(in_dim, out_dim)
                    .with_bias(self.bias)
                    .init(device),
            );
            in_dim = out_dim;
        }

        let output = LinearConfig::new(in_dim, self.output_dim)
            .with_bias(self.bias)
            .init(device);

        Mlp {
            layers,
            output,
            activation: Relu::new(),
        }
    }
}

/// ReLU multi-layer perceptron with a linear output layer.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> Mlp<B> {
    /// Forward pass, `[batch, input_dim]` to `[batch, output_dim]`.
    pub fn forward(&self, mut x: Tensor<B, 2>) -> Tensor<B, 2> {
        for layer in &self.layers {
            x = self.activation.forward(layer.forward(x));
        }
        self.output.forward(x)
    }

    /// Output dimension.
    pub fn output_dim(&self) -> usize {
        self.output.weight.dims()[1]
    }

    #[cfg(test)]
    pub(crate) fn output_layer(&self) -> &Linear<B> {
        &self.output
    }

    /// Move the weights a fraction `t` of the way towards `target`.
    pub fn lerp(self, target: &Self, t: f32) -> Self {
        let layers = self
            .layers
            .into_iter()
            .zip(&target.layers)
            .map(|(layer, other)| lerp_linear(layer, other, t))
            .collect();
        Self {
            layers,
            output: lerp_linear(self.output, &target.output, t),
            activation: self.activation,
        }
    }
}

/// `param + t * (target - param)`, keeping the parameter id.
pub fn lerp_param<B: Backend, const D: usize>(
    param: Param<Tensor<B, D>>,
    target: &Param<Tensor<B, D>>,
    t: f32,
) -> Param<Tensor<B, D>> {
    let target = target.val();
    param.map(|value| value.clone() + (target - value) * t)
}

fn lerp_linear<B: Backend>(mut linear: Linear<B>, target: &Linear<B>, t: f32) -> Linear<B> {
    linear.weight = lerp_param(linear.weight, &target.weight, t);
    linear.bias = match (linear.bias, &target.bias) {
        (Some(bias), Some(other)) => Some(lerp_param(bias, other, t)),
        (bias, _) => bias,
    };
    linear
}
