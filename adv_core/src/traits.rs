//! Traits shared between the math core and the tensor crates.
//!
//! These let neural_adv hand network-backed fields and dataset cameras to the mesh
//! extraction and culling algorithms without adv_core knowing about tensors.

use crate::types::{Aabb, Point3};

/// A scalar field sampled on a regular lattice of `resolution^3` points spanning `bounds`.
///
/// Lattice point `(0, 0, 0)` sits at `bounds.min` and `(r-1, r-1, r-1)` at `bounds.max`.
pub trait ScalarField {
    /// Lattice points per axis.
    fn resolution(&self) -> usize;

    /// The box covered by the lattice.
    fn bounds(&self) -> Aabb;

    /// Field value at lattice index `(i, j, k)`.
    fn value(&self, i: usize, j: usize, k: usize) -> f32;

    /// World position of lattice index `(i, j, k)`.
    #[inline]
    fn position(&self, i: usize, j: usize, k: usize) -> Point3 {
        let b = self.bounds();
        let denom = (self.resolution().max(2) - 1) as f32;
        let t = Point3::new(i as f32, j as f32, k as f32) / denom;
        b.min + b.extent().mul_elem(t)
    }
}

/// A view that can tell where a world point lands on its image plane.
pub trait ViewProjector {
    /// Image width in pixels.
    fn width(&self) -> usize;

    /// Image height in pixels.
    fn height(&self) -> usize;

    /// Pixel coordinates `(u, v)` of `p`, or `None` if it lies behind the camera.
    ///
    /// Points outside the frame still project; use [`ViewProjector::sees`] to test coverage.
    fn project(&self, p: Point3) -> Option<(f32, f32)>;

    /// True if `p` projects inside the image, allowing `margin` pixels of slack.
    #[inline]
    fn sees(&self, p: Point3, margin: f32) -> bool {
        match self.project(p) {
            Some((u, v)) => {
                u >= -margin
                    && v >= -margin
                    && u < self.width() as f32 + margin
                    && v < self.height() as f32 + margin
            }
            None => false,
        }
    }
}
