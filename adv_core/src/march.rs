//! Ray marching with adaptive step size and empty-space skipping.
//!
//! Step length grows with distance as `t * dt_gamma`, clamped between a minimum that lets a
//! ray cross the whole scene diagonal in `max_steps` steps and a maximum of one occupancy
//! cell. Samples are only emitted inside occupied cells when a grid is supplied.

use crate::alloc_prelude::Vec;
use crate::contraction::contract_linf;
use crate::occupancy::DensityGrid;
use crate::types::Ray;

const SQRT3: f32 = 1.732_050_8;

/// Marching parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarchParams {
    /// Scene half-extent.
    pub bound: f32,
    /// Maximum number of samples emitted per ray.
    pub max_steps: usize,
    /// Step growth with distance; 0 gives uniform steps.
    pub dt_gamma: f32,
    /// Smallest step.
    pub dt_min: f32,
    /// Largest step.
    pub dt_max: f32,
    /// Look up occupancy in contracted coordinates.
    pub contract: bool,
}

impl MarchParams {
    /// Parameters for a scene of half-extent `bound` and an occupancy grid of `grid_resolution`.
    pub fn new(bound: f32, max_steps: usize, dt_gamma: f32, grid_resolution: usize) -> Self {
        let max_steps = max_steps.max(1);
        let dt_min = 2.0 * SQRT3 * bound / max_steps as f32;
        let dt_max = (2.0 * SQRT3 * bound / grid_resolution.max(1) as f32).max(dt_min);
        Self {
            bound,
            max_steps,
            dt_gamma: dt_gamma.max(0.0),
            dt_min,
            dt_max,
            contract: false,
        }
    }

    /// Enable contracted occupancy lookups.
    pub fn with_contract(mut self, contract: bool) -> Self {
        self.contract = contract;
        self
    }

    /// Step length at distance `t`.
    #[inline]
    pub fn step_at(&self, t: f32) -> f32 {
        (t * self.dt_gamma).clamp(self.dt_min, self.dt_max)
    }
}

/// Samples along a single ray.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaySamples {
    /// Sample depths (interval midpoints), increasing.
    pub depths: Vec<f32>,
    /// Interval lengths matching `depths`.
    pub deltas: Vec<f32>,
}

impl RaySamples {
    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.depths.len()
    }

    /// True if the ray produced no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.depths.is_empty()
    }
}

/// March `ray` over `[near, far]`.
///
/// `jitter` in `[0, 1)` shifts the first sample by a fraction of the minimum step, giving
/// stratified sampling during training. Pass `0.0` for deterministic rendering.
pub fn march_ray(
    ray: &Ray,
    near: f32,
    far: f32,
    params: &MarchParams,
    grid: Option<&DensityGrid>,
    jitter: f32,
) -> RaySamples {
    let mut samples = RaySamples::default();
    let mut t = near + jitter * params.dt_min;

    while t < far && samples.len() < params.max_steps {
        let dt = params.step_at(t).min(far - t);
        let mid = t + 0.5 * dt;

        let keep = match grid {
            Some(grid) => {
                let p = ray.at(mid);
                let q = if params.contract { contract_linf(p) } else { p };
                grid.is_occupied(q)
            }
            None => true,
        };
        if keep && dt > 0.0 {
            samples.depths.push(mid);
            samples.deltas.push(dt);
        }
        t += params.step_at(t);
    }

    samples
}
