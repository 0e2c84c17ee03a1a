//! Ray sampling on the CPU.
//!
//! Rays are marched with the occupancy grid from adv_core, then packed into a dense
//! `[rays, samples]` layout padded to the longest ray so the renderer can composite
//! with plain tensor ops. Padding slots carry a zero mask.

use adv_core::{march_ray, Aabb, DensityGrid, MarchParams, Ray};
use burn::prelude::*;

use crate::config::Options;

/// Marches rays through the scene box.
#[derive(Debug, Clone, Copy)]
pub struct RaySampler {
    params: MarchParams,
    bounds: Aabb,
    min_near: f32,
}

impl RaySampler {
    /// Create a sampler.
    pub fn new(params: MarchParams, bounds: Aabb, min_near: f32) -> Self {
        Self {
            params,
            bounds,
            min_near,
        }
    }

    /// Sampler matching a normalized option set.
    pub fn from_options(options: &Options) -> Self {
        let bound = options.dataset.bound;
        let params = MarchParams::new(
            bound,
            options.training.max_steps,
            options.training.dt_gamma,
            options.training.grid_size,
        )
        .with_contract(options.experimental.contract);
        Self::new(params, Aabb::cube(bound), options.dataset.min_near)
    }

    /// Marching parameters.
    pub fn params(&self) -> &MarchParams {
        &self.params
    }

    /// Ray segment inside the scene box, starting no closer than `min_near`.
    pub fn near_far(&self, ray: &Ray) -> Option<(f32, f32)> {
        let (near, far) = self.bounds.intersect(ray)?;
        let near = near.max(self.min_near);
        (far > near).then_some((near, far))
    }

    /// March every ray and pack the samples. `jitters` holds one value in `[0, 1)` per ray.
    pub fn sample(&self, rays: &[Ray], grid: Option<&DensityGrid>, jitters: Option<&[f32]>) -> PackedSamples {
        let per_ray: Vec<_> = rays
            .iter()
            .enumerate()
            .map(|(i, ray)| match self.near_far(ray) {
                Some((near, far)) => {
                    let jitter = jitters.and_then(|j| j.get(i).copied()).unwrap_or(0.0);
                    march_ray(ray, near, far, &self.params, grid, jitter)
                }
                None => Default::default(),
            })
            .collect();

        let width = per_ray.iter().map(|s| s.len()).max().unwrap_or(0).max(1);
        let n = rays.len();
        let mut packed = PackedSamples {
            num_rays: n,
            samples_per_ray: width,
            positions: vec![0.0; n * width * 3],
            dirs: vec![0.0; n * width * 3],
            deltas: vec![0.0; n * width],
            depths: vec![0.0; n * width],
            mask: vec![0.0; n * width],
            total_samples: 0,
        };

        for (r, (ray, samples)) in rays.iter().zip(&per_ray).enumerate() {
            for s in 0..width {
                let slot = r * width + s;
                let (depth, delta, valid) = match samples.depths.get(s) {
                    Some(&t) => (t, samples.deltas[s], 1.0),
                    None => (0.0, 0.0, 0.0),
                };
                let p = ray.at(depth);
                packed.positions[slot * 3..slot * 3 + 3].copy_from_slice(&p.as_array());
                packed.dirs[slot * 3..slot * 3 + 3].copy_from_slice(&ray.dir.as_array());
                packed.depths[slot] = depth;
                packed.deltas[slot] = delta;
                packed.mask[slot] = valid;
            }
            packed.total_samples += samples.len();
        }
        packed
    }
}

/// Samples of a ray batch in a padded `[rays, samples]` layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedSamples {
    /// Number of rays.
    pub num_rays: usize,
    /// Padded samples per ray (at least one).
    pub samples_per_ray: usize,
    /// Sample positions, `[rays * samples, 3]` flattened.
    pub positions: Vec<f32>,
    /// Ray directions repeated per sample, `[rays * samples, 3]` flattened.
    pub dirs: Vec<f32>,
    /// Interval lengths, `[rays, samples]` flattened.
    pub deltas: Vec<f32>,
    /// Sample depths, `[rays, samples]` flattened.
    pub depths: Vec<f32>,
    /// 1 for real samples, 0 for padding.
    pub mask: Vec<f32>,
    /// Number of real samples.
    pub total_samples: usize,
}

/// [`PackedSamples`] on a device.
#[derive(Debug, Clone)]
pub struct SampleTensors<B: Backend> {
    /// `[R*S, 3]`
    pub positions: Tensor<B, 2>,
    /// `[R*S, 3]`
    pub dirs: Tensor<B, 2>,
    /// `[R, S]`
    pub deltas: Tensor<B, 2>,
    /// `[R, S]`
    pub depths: Tensor<B, 2>,
    /// `[R, S]`
    pub mask: Tensor<B, 2>,
}

impl PackedSamples {
    /// Upload to `device`.
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> SampleTensors<B> {
        let (r, s) = (self.num_rays, self.samples_per_ray);
        let grid = |v: &[f32]| Tensor::<B, 1>::from_floats(v, device).reshape([r, s]);
        SampleTensors {
            positions: Tensor::<B, 1>::from_floats(self.positions.as_slice(), device)
                .reshape([r * s, 3]),
            dirs: Tensor::<B, 1>::from_floats(self.dirs.as_slice(), device).reshape([r * s, 3]),
            deltas: grid(&self.deltas),
            depths: grid(&self.depths),
            mask: grid(&self.mask),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adv_core::Point3;
    use burn::backend::NdArray;

    fn sampler() -> RaySampler {
        RaySampler::new(MarchParams::new(1.0, 32, 0.0, 16), Aabb::cube(1.0), 0.05)
    }

    #[test]
    fn test_missing_ray_is_all_padding() {
        let rays = [
            Ray::new(Point3::new(0.0, 0.0, 3.0), Point3::new(0.0, 0.0, -1.0)),
            Ray::new(Point3::new(5.0, 5.0, 3.0), Point3::new(0.0, 0.0, 1.0)),
        ];
        let packed = sampler().sample(&rays, None, None);

        let s = packed.samples_per_ray;
        assert!(s > 1);
        assert!(packed.mask[..s].iter().all(|&m| m == 1.0));
        assert!(packed.mask[s..].iter().all(|&m| m == 0.0));
        assert_eq!(packed.total_samples, s);
    }

    #[test]
    fn test_empty_batch_has_one_slot() {
        let packed = sampler().sample(&[], None, None);
        assert_eq!(packed.samples_per_ray, 1);
        assert_eq!(packed.total_samples, 0);
    }

    #[test]
    fn test_min_near_clips_segment() {
        let ray = Ray::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        let (near, far) = sampler().near_far(&ray).unwrap();
        assert!((near - 0.05).abs() < 1e-6);
        assert!((far - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_tensor_shapes() {
        let rays = [Ray::new(Point3::new(0.0, 0.0, 3.0), Point3::new(0.0, 0.0, -1.0)); 3];
        let packed = sampler().sample(&rays, None, Some(&[0.0, 0.5, 0.9]));
        let tensors = packed.to_tensors::<NdArray>(&Default::default());
        let s = packed.samples_per_ray;
        assert_eq!(tensors.positions.dims(), [3 * s, 3]);
        assert_eq!(tensors.deltas.dims(), [3, s]);
    }
}
