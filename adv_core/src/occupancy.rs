//! Occupancy grid used to skip empty space while ray marching.
//!
//! The grid keeps an exponentially decayed running maximum of the density observed at each
//! cell. A cell is occupied while its density exceeds `min(mean density, threshold)`.
//! Cells that no training camera can see may be marked untrained; they are never occupied
//! and never updated again.

use crate::alloc_prelude::{vec, Vec};
use crate::error::AdvCoreError;
use crate::traits::ViewProjector;
use crate::types::{Aabb, Point3};

/// Density value stored for cells excluded by [`DensityGrid::mark_untrained`].
pub const UNTRAINED_DENSITY: f32 = -1.0;

/// Dense occupancy grid over an axis-aligned box.
#[derive(Debug, Clone)]
pub struct DensityGrid {
    resolution: usize,
    bounds: Aabb,
    threshold: f32,
    density: Vec<f32>,
    occupied: Vec<bool>,
    mean_density: f32,
}

impl DensityGrid {
    /// Create a grid of `resolution^3` cells; every cell starts occupied.
    pub fn new(resolution: usize, bounds: Aabb) -> Result<Self, AdvCoreError> {
        if resolution < 2 {
            return Err(AdvCoreError::InvalidResolution { resolution, min: 2 });
        }
        let n = resolution * resolution * resolution;
        Ok(Self {
            resolution,
            bounds,
            threshold: 10.0,
            density: vec![0.0; n],
            occupied: vec![true; n],
            mean_density: 0.0,
        })
    }

    /// Set the absolute occupancy threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Cells per axis.
    #[inline]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Total number of cells.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.density.len()
    }

    /// Box covered by the grid.
    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Edge length of a cell along x.
    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.bounds.extent().x / self.resolution as f32
    }

    /// Mean density over trained cells after the last update.
    #[inline]
    pub fn mean_density(&self) -> f32 {
        self.mean_density
    }

    /// Raw per-cell densities, x fastest.
    #[inline]
    pub fn densities(&self) -> &[f32] {
        &self.density
    }

    #[inline]
    fn flat(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.resolution + j) * self.resolution + i
    }

    /// Flat index of the cell containing `p`, or `None` outside the grid.
    pub fn index_of(&self, p: Point3) -> Option<usize> {
        if !self.bounds.contains(p) {
            return None;
        }
        let rel = p - self.bounds.min;
        let ext = self.bounds.extent();
        let last = self.resolution - 1;
        let cell = |v: f32, e: f32| ((v / e * self.resolution as f32) as usize).min(last);
        Some(self.flat(cell(rel.x, ext.x), cell(rel.y, ext.y), cell(rel.z, ext.z)))
    }

    /// Center of the cell at flat index `idx`, offset by `jitter` in cell units (`[-0.5, 0.5]`).
    pub fn cell_point(&self, idx: usize, jitter: Point3) -> Point3 {
        let r = self.resolution;
        let i = idx % r;
        let j = (idx / r) % r;
        let k = idx / (r * r);
        let t = (Point3::new(i as f32, j as f32, k as f32) + Point3::splat(0.5) + jitter)
            / r as f32;
        self.bounds.min + self.bounds.extent().mul_elem(t)
    }

    /// True if `p` falls in an occupied cell.
    #[inline]
    pub fn is_occupied(&self, p: Point3) -> bool {
        self.index_of(p).map(|idx| self.occupied[idx]).unwrap_or(false)
    }

    /// Fraction of cells currently occupied.
    pub fn occupancy_ratio(&self) -> f32 {
        let count = self.occupied.iter().filter(|&&o| o).count();
        count as f32 / self.occupied.len() as f32
    }

    /// Exclude cells whose centers no view can see.
    ///
    /// `to_world` maps grid space back to world space (the inverse contraction when the grid
    /// covers a contracted scene). Returns the number of cells marked.
    pub fn mark_untrained<V, F>(&mut self, views: &[V], to_world: F) -> usize
    where
        V: ViewProjector,
        F: Fn(Point3) -> Point3,
    {
        let mut marked = 0;
        for idx in 0..self.density.len() {
            let p = to_world(self.cell_point(idx, Point3::splat(0.0)));
            if !views.iter().any(|v| v.sees(p, 0.0)) {
                self.density[idx] = UNTRAINED_DENSITY;
                self.occupied[idx] = false;
                marked += 1;
            }
        }
        marked
    }

    /// Fold freshly sampled densities into the grid.
    ///
    /// `values[i]` is the density measured in cell `i`. Trained cells keep
    /// `max(old * decay, new)`; untrained cells are left alone.
    pub fn apply_update(&mut self, decay: f32, values: &[f32]) -> Result<(), AdvCoreError> {
        if values.len() != self.density.len() {
            return Err(AdvCoreError::LengthMismatch {
                expected: self.density.len(),
                got: values.len(),
            });
        }

        let mut sum = 0.0f64;
        let mut count = 0usize;
        for (d, &v) in self.density.iter_mut().zip(values) {
            if *d < 0.0 {
                continue;
            }
            *d = (*d * decay).max(v);
            sum += *d as f64;
            count += 1;
        }
        self.mean_density = if count > 0 { (sum / count as f64) as f32 } else { 0.0 };

        let thresh = self.mean_density.min(self.threshold);
        for (occ, &d) in self.occupied.iter_mut().zip(&self.density) {
            *occ = d >= 0.0 && d > thresh;
        }
        Ok(())
    }

    /// Evaluate `density_fn` at every cell center and fold the results in.
    pub fn update_with<F>(&mut self, decay: f32, mut density_fn: F) -> Result<(), AdvCoreError>
    where
        F: FnMut(Point3) -> f32,
    {
        let values: Vec<f32> = (0..self.density.len())
            .map(|idx| density_fn(self.cell_point(idx, Point3::splat(0.0))))
            .collect();
        self.apply_update(decay, &values)
    }

    /// Restore densities, e.g. from a checkpoint, and recompute occupancy.
    pub fn restore(&mut self, densities: &[f32]) -> Result<(), AdvCoreError> {
        if densities.len() != self.density.len() {
            return Err(AdvCoreError::LengthMismatch {
                expected: self.density.len(),
                got: densities.len(),
            });
        }
        self.density.copy_from_slice(densities);
        let trained: Vec<f32> = self.density.iter().copied().filter(|d| *d >= 0.0).collect();
        self.mean_density = if trained.is_empty() {
            0.0
        } else {
            trained.iter().sum::<f32>() / trained.len() as f32
        };
        let thresh = self.mean_density.min(self.threshold);
        for (occ, &d) in self.occupied.iter_mut().zip(&self.density) {
            *occ = d >= 0.0 && d > thresh;
        }
        Ok(())
    }
}
