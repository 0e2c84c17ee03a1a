//! Differentiable volume rendering.
//!
//! Given packed samples, the field is queried once for every slot and composited with
//!
//! ```text
//! alpha_i = 1 - exp(-sigma_i * delta_i)
//! T_i     = exp(-sum_{j<i} sigma_j * delta_j)
//! w_i     = T_i * alpha_i
//! C       = sum_i w_i c_i + (1 - sum_i w_i) * background
//! ```
//!
//! The exclusive prefix sum is a product with a strictly upper-triangular matrix, which
//! keeps the whole composite differentiable on every backend.

use adv_core::{DensityGrid, PinholeCamera, Ray};
use adv_io::FloatImage;
use burn::prelude::*;

use crate::error::{NeuralAdvError, Result};
use crate::nn::{NerfNetwork, Shading};

use super::rays::{RaySampler, SampleTensors};

/// Composited rays and the per-sample values the regularizers need.
#[derive(Debug, Clone)]
pub struct RenderOutput<B: Backend> {
    /// Final color over the background `[R, 3]`.
    pub image: Tensor<B, 2>,
    /// Accumulated opacity `[R, 1]`.
    pub opacity: Tensor<B, 2>,
    /// Expected depth `[R, 1]`.
    pub depth: Tensor<B, 2>,
    /// Compositing weights `[R, S]`.
    pub weights: Tensor<B, 2>,
    /// Density per slot `[R*S, 1]`.
    pub sigma: Tensor<B, 2>,
    /// Raw density head per slot `[R*S, 1]`.
    pub raw: Tensor<B, 2>,
    /// Specular color per slot `[R*S, 3]`.
    pub specular: Tensor<B, 2>,
    /// Sample positions `[R*S, 3]`.
    pub positions: Tensor<B, 2>,
    /// Validity mask `[R, S]`.
    pub mask: Tensor<B, 2>,
    /// Number of real (unpadded) samples.
    pub num_samples: usize,
}

/// Strictly upper-triangular ones, `[n, n]`: entry `(j, i)` is 1 when `j < i`.
pub fn exclusive_prefix_matrix<B: Backend>(n: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut values = vec![0.0f32; n * n];
    for j in 0..n {
        for i in (j + 1)..n {
            values[j * n + i] = 1.0;
        }
    }
    Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape([n, n])
}

/// Composite field samples along rays.
#[derive(Debug, Clone, Copy)]
pub struct VolumeRenderer {
    sampler: RaySampler,
    max_ray_batch: usize,
}

impl VolumeRenderer {
    /// Create a renderer rendering at most `max_ray_batch` rays per chunk in [`Self::render_image`].
    pub fn new(sampler: RaySampler, max_ray_batch: usize) -> Self {
        Self {
            sampler,
            max_ray_batch: max_ray_batch.max(1),
        }
    }

    /// The ray sampler.
    pub fn sampler(&self) -> &RaySampler {
        &self.sampler
    }

    /// Render `rays` over per-ray `background` colors `[R, 3]`.
    pub fn render<B: Backend>(
        &self,
        model: &NerfNetwork<B>,
        rays: &[Ray],
        grid: Option<&DensityGrid>,
        jitters: Option<&[f32]>,
        shading: Shading,
        background: Tensor<B, 2>,
    ) -> RenderOutput<B> {
        let device = background.device();
        let packed = self.sampler.sample(rays, grid, jitters);
        let (r, s) = (packed.num_rays, packed.samples_per_ray);
        let SampleTensors {
            positions,
            dirs,
            deltas,
            depths,
            mask,
        } = packed.to_tensors::<B>(&device);

        let field = model.forward(positions.clone(), dirs, shading);

        let tau = field.sigma.clone().reshape([r, s]) * deltas * mask.clone();
        let alpha = tau.clone().neg().exp().neg() + 1.0;
        let transmittance = tau
            .matmul(exclusive_prefix_matrix::<B>(s, &device))
            .neg()
            .exp();
        let weights = transmittance * alpha;

        let opacity = weights.clone().sum_dim(1);
        let color = (weights.clone().reshape([r, s, 1]) * field.rgb.reshape([r, s, 3]))
            .sum_dim(1)
            .reshape([r, 3]);
        let depth = (weights.clone() * depths).sum_dim(1);
        let image = color + (opacity.clone().neg() + 1.0) * background;

        RenderOutput {
            image,
            opacity,
            depth,
            weights,
            sigma: field.sigma,
            raw: field.raw,
            specular: field.specular,
            positions,
            mask,
            num_samples: packed.total_samples,
        }
    }

    /// Render a full camera view without gradients, chunked by `max_ray_batch`.
    ///
    /// `background` is either a same-sized RGB image or `None` for white.
    pub fn render_image<B: Backend>(
        &self,
        model: &NerfNetwork<B>,
        camera: &PinholeCamera,
        grid: Option<&DensityGrid>,
        background: Option<&FloatImage>,
        shading: Shading,
        device: &B::Device,
    ) -> Result<RenderedView> {
        let (w, h) = (camera.width, camera.height);
        let mut rgb = Vec::with_capacity(w * h * 3);
        let mut depth = Vec::with_capacity(w * h);
        let mut alpha = Vec::with_capacity(w * h);

        let pixels: Vec<(usize, usize)> = (0..h).flat_map(|y| (0..w).map(move |x| (x, y))).collect();
        for chunk in pixels.chunks(self.max_ray_batch) {
            let rays: Vec<Ray> = chunk.iter().map(|&(x, y)| camera.pixel_ray(x, y)).collect();
            let bg: Vec<f32> = match background {
                Some(img) => chunk
                    .iter()
                    .flat_map(|&(x, y)| {
                        let p = img.pixel(x as u32, y as u32);
                        [p[0], p[1], p[2]]
                    })
                    .collect(),
                None => vec![1.0; chunk.len() * 3],
            };
            let bg = Tensor::<B, 1>::from_floats(bg.as_slice(), device).reshape([chunk.len(), 3]);

            let out = self.render(model, &rays, grid, None, shading, bg);
            rgb.extend(to_vec(out.image)?);
            depth.extend(to_vec(out.depth)?);
            alpha.extend(to_vec(out.opacity)?);
        }

        Ok(RenderedView {
            image: FloatImage::from_data(w as u32, h as u32, 3, rgb)?,
            depth,
            alpha,
        })
    }
}

/// A rendered camera view.
#[derive(Debug, Clone)]
pub struct RenderedView {
    /// RGB image.
    pub image: FloatImage,
    /// Per-pixel expected depth.
    pub depth: Vec<f32>,
    /// Per-pixel accumulated opacity.
    pub alpha: Vec<f32>,
}

/// Read a tensor back into a flat `Vec<f32>`.
pub fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| NeuralAdvError::training(format!("tensor readback failed: {:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::NerfNetworkConfig;
    use adv_core::{look_at, Aabb, Intrinsics, MarchParams, Point3};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn renderer() -> VolumeRenderer {
        let sampler = RaySampler::new(MarchParams::new(1.0, 64, 0.0, 16), Aabb::cube(1.0), 0.05);
        VolumeRenderer::new(sampler, 7)
    }

    #[test]
    fn test_prefix_matrix() {
        let m = exclusive_prefix_matrix::<TestBackend>(3, &Default::default());
        let v = m.into_data().to_vec::<f32>().unwrap();
        assert_eq!(v, vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_weights_bounded_and_missed_ray_shows_background() {
        let device = Default::default();
        let model = NerfNetworkConfig::new(1.0).init::<TestBackend>(&device);
        let rays = [
            Ray::new(Point3::new(0.0, 0.0, 3.0), Point3::new(0.0, 0.0, -1.0)),
            Ray::new(Point3::new(5.0, 5.0, 3.0), Point3::new(0.0, 0.0, 1.0)),
        ];
        let bg = Tensor::<TestBackend, 2>::from_floats([[0.2, 0.4, 0.6], [0.2, 0.4, 0.6]], &device);
        let out = renderer().render(&model, &rays, None, None, Shading::default(), bg);

        let opacity = to_vec(out.opacity).unwrap();
        assert!(opacity[0] >= 0.0 && opacity[0] <= 1.0 + 1e-5);
        assert_eq!(opacity[1], 0.0);

        let image = to_vec(out.image).unwrap();
        assert!((image[3] - 0.2).abs() < 1e-6);
        assert!((image[5] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_render_image_chunks() {
        let device = Default::default();
        let model = NerfNetworkConfig::new(1.0).init::<TestBackend>(&device);
        let camera = PinholeCamera::new(
            look_at(Point3::new(0.0, -3.0, 0.0), Point3::splat(0.0)),
            Intrinsics::from_fov_x(5, 4, 0.8),
            5,
            4,
        );
        let view = renderer()
            .render_image(&model, &camera, None, None, Shading::default(), &device)
            .unwrap();
        assert_eq!((view.image.width, view.image.height), (5, 4));
        assert_eq!(view.depth.len(), 20);
        assert!(view.image.data.iter().all(|v| (0.0..=1.0 + 1e-5).contains(v)));
    }
}
