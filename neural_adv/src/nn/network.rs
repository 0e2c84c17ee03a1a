//! Radiance field network.
//!
//! A positional-encoding MLP maps a point to a density (or signed distance) and a
//! geometry feature; two small heads decode the feature and the view direction into a
//! diffuse color and a view-dependent specular term.

use adv_core::Point3;
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Embedding, EmbeddingConfig};
use burn::prelude::*;

use crate::config::Options;
use crate::error::NeuralAdvError;

use super::encoder::{FourierEncoder, FourierEncoderConfig};
use super::mlp::{lerp_param, Mlp, MlpConfig};

/// Upper clamp before `exp` in the density activation.
const MAX_LOG_DENSITY: f32 = 15.0;

/// Configuration for [`NerfNetwork`].
#[derive(Config, Debug)]
pub struct NerfNetworkConfig {
    /// Scene half-extent.
    pub bound: f32,
    /// Contract the scene into `[-2, 2]^3` before encoding.
    #[config(default = false)]
    pub contract: bool,
    /// Interpret the density head as a signed distance.
    #[config(default = false)]
    pub sdf: bool,
    /// Positional encoding bands.
    #[config(default = 8)]
    pub num_bands: usize,
    /// Direction encoding bands.
    #[config(default = 4)]
    pub dir_bands: usize,
    /// Geometry feature width.
    #[config(default = 15)]
    pub geo_feat_dim: usize,
    /// Hidden width of the density network.
    #[config(default = 64)]
    pub hidden_dim: usize,
    /// Hidden layers of the density network.
    #[config(default = 2)]
    pub num_layers: usize,
    /// Hidden width of the color heads.
    #[config(default = 64)]
    pub color_hidden_dim: usize,
    /// Per-image appearance embedding size; 0 disables it.
    #[config(default = 0)]
    pub ind_dim: usize,
    /// Rows of the appearance embedding table.
    #[config(default = 500)]
    pub ind_num: usize,
}

impl NerfNetworkConfig {
    /// Configuration matching a normalized option set.
    pub fn from_options(options: &Options) -> Self {
        Self::new(options.dataset.bound)
            .with_contract(options.experimental.contract)
            .with_sdf(options.run.sdf)
            .with_ind_dim(options.experimental.ind_dim)
            .with_ind_num(options.experimental.ind_num)
    }

    /// Initialize the network.
    pub fn init<B: Backend>(&self, device: &B::Device) -> NerfNetwork<B> {
        let encoder = FourierEncoderConfig::new(self.num_bands).init(device);
        let dir_encoder = FourierEncoderConfig::new(self.dir_bands)
            .with_max_freq_log2((self.dir_bands.max(1) - 1) as f32)
            .init(device);

        let sigma_net = MlpConfig::new(encoder.output_dim(), 1 + self.geo_feat_dim)
            .with_hidden_dims(vec![self.hidden_dim; self.num_layers])
            .init(device);

        let color_in = self.geo_feat_dim + self.ind_dim;
        let color_net = MlpConfig::new(color_in, 3)
            .with_hidden_dims(vec![self.color_hidden_dim])
            .init(device);
        let specular_net = MlpConfig::new(self.geo_feat_dim + dir_encoder.output_dim(), 3)
            .with_hidden_dims(vec![self.color_hidden_dim / 2])
            .init(device);

        let embedding = (self.ind_dim > 0)
            .then(|| EmbeddingConfig::new(self.ind_num, self.ind_dim).init(device));

        // ln(beta) = ln(0.1) gives a sharp but trainable sdf-to-density falloff
        let ln_beta = self
            .sdf
            .then(|| Param::from_tensor(Tensor::from_floats([0.1f32.ln()], device)));

        NerfNetwork {
            encoder,
            dir_encoder,
            sigma_net,
            color_net,
            specular_net,
            embedding,
            ln_beta,
            bound: self.bound,
            contract: self.contract,
        }
    }
}

/// Options for one field query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shading {
    /// Positional bands in use (progressive training), `usize::MAX` for all.
    pub active_bands: usize,
    /// Add the specular head.
    pub specular: bool,
    /// Training image index for the appearance embedding.
    pub image_index: Option<usize>,
    /// Let gradients reach the density network; off while fine-tuning appearance.
    pub geometry_grad: bool,
}

impl Default for Shading {
    fn default() -> Self {
        Self {
            active_bands: usize::MAX,
            specular: true,
            image_index: None,
            geometry_grad: true,
        }
    }
}

/// Per-sample field values.
#[derive(Debug, Clone)]
pub struct FieldOutput<B: Backend> {
    /// Volume density `[N, 1]`, non-negative.
    pub sigma: Tensor<B, 2>,
    /// Raw density head: log-density, or signed distance in SDF mode `[N, 1]`.
    pub raw: Tensor<B, 2>,
    /// Final color `[N, 3]` in `[0, 1]`.
    pub rgb: Tensor<B, 2>,
    /// Specular contribution `[N, 3]` (zeros when disabled).
    pub specular: Tensor<B, 2>,
}

/// Positional-encoding radiance field.
#[derive(Module, Debug)]
pub struct NerfNetwork<B: Backend> {
    encoder: FourierEncoder<B>,
    dir_encoder: FourierEncoder<B>,
    sigma_net: Mlp<B>,
    color_net: Mlp<B>,
    specular_net: Mlp<B>,
    embedding: Option<Embedding<B>>,
    ln_beta: Option<Param<Tensor<B, 1>>>,
    bound: f32,
    contract: bool,
}

impl<B: Backend> NerfNetwork<B> {
    /// Scene half-extent.
    pub fn bound(&self) -> f32 {
        self.bound
    }

    /// True in SDF mode.
    pub fn is_sdf(&self) -> bool {
        self.ln_beta.is_some()
    }

    /// True when the scene is contracted.
    pub fn is_contracted(&self) -> bool {
        self.contract
    }

    /// Number of positional bands.
    pub fn num_bands(&self) -> usize {
        self.encoder.num_bands()
    }

    /// Map world points `[N, 3]` to the encoder domain `[-1, 1]^3`.
    pub fn normalize_points(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        if self.contract {
            contract_points(x) / 2.0
        } else {
            x / self.bound
        }
    }

    /// Raw density head and geometry features.
    fn geometry(&self, x: Tensor<B, 2>, active_bands: usize) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [n, _] = x.dims();
        let encoded = self
            .encoder
            .forward_progressive(self.normalize_points(x), active_bands);
        let h = self.sigma_net.forward(encoded);
        let width = h.dims()[1];
        let raw = h.clone().slice([0..n, 0..1]);
        let geo = h.slice([0..n, 1..width]);
        (raw, geo)
    }

    /// Activate the raw head into a density.
    fn activate(&self, raw: Tensor<B, 2>) -> Tensor<B, 2> {
        match &self.ln_beta {
            // Logistic density: (1/beta) * sigmoid(-sdf / beta)
            Some(ln_beta) => {
                let inv_beta = ln_beta.val().neg().exp().reshape([1, 1]);
                let scaled = raw.neg() * inv_beta.clone();
                burn::tensor::activation::sigmoid(scaled) * inv_beta
            }
            None => raw.clamp_max(MAX_LOG_DENSITY).exp(),
        }
    }

    /// Density `[N, 1]` and raw head at `x`.
    pub fn density(&self, x: Tensor<B, 2>, active_bands: usize) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let (raw, _) = self.geometry(x, active_bands);
        (self.activate(raw.clone()), raw)
    }

    /// Full query at points `x` seen along directions `d` (both `[N, 3]`).
    pub fn forward(&self, x: Tensor<B, 2>, d: Tensor<B, 2>, shading: Shading) -> FieldOutput<B> {
        let [n, _] = x.dims();
        let device = x.device();
        let (raw, geo) = self.geometry(x, shading.active_bands);
        let mut sigma = self.activate(raw.clone());
        let (raw, geo) = if shading.geometry_grad {
            (raw, geo)
        } else {
            sigma = sigma.detach();
            (raw.detach(), geo.detach())
        };

        let color_in = match (&self.embedding, shading.image_index) {
            (Some(embedding), index) => {
                let index = index.unwrap_or(0) as i64;
                let ids = Tensor::<B, 2, Int>::full([n, 1], index, &device);
                let code = embedding.forward(ids);
                let dim = code.dims()[2];
                Tensor::cat(vec![geo.clone(), code.reshape([n, dim])], 1)
            }
            (None, _) => geo.clone(),
        };
        let diffuse = burn::tensor::activation::sigmoid(self.color_net.forward(color_in));

        let specular = if shading.specular {
            let dirs = self.dir_encoder.forward(d);
            burn::tensor::activation::sigmoid(self.specular_net.forward(Tensor::cat(vec![geo, dirs], 1)))
        } else {
            Tensor::zeros([n, 3], &device)
        };

        let rgb = (diffuse + specular.clone()).clamp(0.0, 1.0);
        FieldOutput {
            sigma,
            raw,
            rgb,
            specular,
        }
    }

    /// Densities at CPU points, evaluated in chunks of `chunk` points.
    pub fn density_at(
        &self,
        points: &[Point3],
        chunk: usize,
        device: &B::Device,
    ) -> crate::error::Result<Vec<f32>> {
        self.query_chunks(points, chunk, device, |x| self.density(x, usize::MAX).0)
    }

    /// Raw head values (signed distance in SDF mode) at CPU points.
    pub fn raw_at(
        &self,
        points: &[Point3],
        chunk: usize,
        device: &B::Device,
    ) -> crate::error::Result<Vec<f32>> {
        self.query_chunks(points, chunk, device, |x| self.density(x, usize::MAX).1)
    }

    /// Move every trainable parameter a fraction `t` of the way towards `target`.
    pub fn lerp(self, target: &Self, t: f32) -> Self {
        let embedding = match (self.embedding, &target.embedding) {
            (Some(mut e), Some(other)) => {
                e.weight = lerp_param(e.weight, &other.weight, t);
                Some(e)
            }
            (e, _) => e,
        };
        let ln_beta = match (self.ln_beta, &target.ln_beta) {
            (Some(p), Some(other)) => Some(lerp_param(p, other, t)),
            (p, _) => p,
        };
        Self {
            encoder: self.encoder,
            dir_encoder: self.dir_encoder,
            sigma_net: self.sigma_net.lerp(&target.sigma_net, t),
            color_net: self.color_net.lerp(&target.color_net, t),
            specular_net: self.specular_net.lerp(&target.specular_net, t),
            embedding,
            ln_beta,
            bound: self.bound,
            contract: self.contract,
        }
    }

    fn query_chunks<F>(
        &self,
        points: &[Point3],
        chunk: usize,
        device: &B::Device,
        f: F,
    ) -> crate::error::Result<Vec<f32>>
    where
        F: Fn(Tensor<B, 2>) -> Tensor<B, 2>,
    {
        let mut out = Vec::with_capacity(points.len());
        for part in points.chunks(chunk.max(1)) {
            let flat: Vec<f32> = part.iter().flat_map(|p| p.as_array()).collect();
            let x = Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([part.len(), 3]);
            let values = f(x)
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| NeuralAdvError::training(format!("{:?}", e)))?;
            out.extend(values);
        }
        Ok(out)
    }
}

/// L-inf contraction of `[N, 3]` points: identity inside the unit cube, `(2 - 1/m) x / m`
/// outside, where `m` is the largest absolute coordinate.
pub fn contract_points<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let m = x.clone().abs().max_dim(1).clamp_min(1.0);
    let scale = (m.clone().recip().neg() + 2.0) / m;
    x * scale
}
