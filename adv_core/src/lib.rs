//! # adv_core
//!
//! Pure geometry, sampling and scheduling math for adversarial NeRF training.
//!
//! This crate holds everything in the training driver that does not need a tensor
//! backend: camera-ray/box intersection, L-inf scene contraction, the occupancy grid
//! used to skip empty space while ray marching, iteration cadence arithmetic,
//! isosurface extraction and mesh cleanup.
//!
//! ## Features
//!
//! - **no_std compatible**: Works without the standard library when only `alloc` is enabled
//! - **Deterministic**: No randomness is drawn internally, callers supply jitter
//! - **Table-free isosurfaces**: Marching tetrahedra over any [`ScalarField`]
//!
//! ## Feature Flags
//!
//! - `std` (default): Enables standard library support
//! - `alloc`: Enables heap allocation (Vec, BTreeMap) without full std
//!
//! ## Modules
//!
//! - [`types`]: Core data types (Point3, Aabb, Ray)
//! - [`camera`]: Pinhole cameras, ray generation and projection
//! - [`contraction`]: L-inf contraction of unbounded scenes into `[-2, 2]^3`
//! - [`schedule`]: Epoch budget, save/eval cadence, refine steps and LR factor
//! - [`occupancy`]: Density grid with EMA updates and untrained-cell marking
//! - [`march`]: Ray marching with `dt_gamma` adaptive steps and empty-space skipping
//! - [`isosurface`]: Mesh extraction from a scalar field
//! - [`mesh`]: Triangle mesh cleanup, decimation and visibility culling
//! - [`traits`]: Field abstractions shared with the tensor crates
//! - [`error`]: Error types
//!
//! ## Usage
//!
//! ```ignore
//! use adv_core::prelude::*;
//!
//! let cadence = Cadence::new(20_000, 100, 50, 5)?;
//! assert_eq!(cadence.max_epoch, 200);
//!
//! let bounds = Aabb::cube(2.0);
//! let ray = Ray::new(Point3::new(0.0, 0.0, 5.0), Point3::new(0.0, 0.0, -1.0));
//! let (near, far) = bounds.intersect(&ray).unwrap();
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

#[cfg(all(feature = "alloc", not(feature = "std")))]
extern crate alloc;

// Internal alloc prelude for conditional compilation
#[cfg(feature = "std")]
mod alloc_prelude {
    pub use std::collections::BTreeMap;
    pub use std::vec;
    pub use std::vec::Vec;
}

#[cfg(all(feature = "alloc", not(feature = "std")))]
mod alloc_prelude {
    pub use alloc::collections::BTreeMap;
    pub use alloc::vec;
    pub use alloc::vec::Vec;
}

pub mod camera;
pub mod contraction;
pub mod error;
#[cfg(any(feature = "std", feature = "alloc"))]
pub mod isosurface;
#[cfg(any(feature = "std", feature = "alloc"))]
pub mod march;
#[cfg(any(feature = "std", feature = "alloc"))]
pub mod mesh;
#[cfg(any(feature = "std", feature = "alloc"))]
pub mod occupancy;
pub mod schedule;
pub mod traits;
pub mod types;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::camera::{look_at, Intrinsics, PinholeCamera};
    pub use crate::contraction::{contract_linf, uncontract_linf};
    pub use crate::error::AdvCoreError;
    pub use crate::schedule::{lr_factor, Cadence, LR_WARMUP_ITERS};
    pub use crate::traits::{ScalarField, ViewProjector};
    pub use crate::types::{Aabb, Point3, Ray};

    #[cfg(any(feature = "std", feature = "alloc"))]
    pub use crate::isosurface::{extract_isosurface, DenseField};
    #[cfg(any(feature = "std", feature = "alloc"))]
    pub use crate::march::{march_ray, MarchParams, RaySamples};
    #[cfg(any(feature = "std", feature = "alloc"))]
    pub use crate::mesh::TriangleMesh;
    #[cfg(any(feature = "std", feature = "alloc"))]
    pub use crate::occupancy::DensityGrid;
    #[cfg(any(feature = "std", feature = "alloc"))]
    pub use crate::schedule::refine_steps;
}

pub use camera::{look_at, Intrinsics, PinholeCamera};
pub use contraction::{contract_linf, uncontract_linf};
pub use error::AdvCoreError;
pub use schedule::{lr_factor, Cadence, LR_WARMUP_ITERS};
pub use traits::{ScalarField, ViewProjector};
pub use types::{Aabb, Point3, Ray};

#[cfg(any(feature = "std", feature = "alloc"))]
pub use isosurface::{extract_isosurface, DenseField};
#[cfg(any(feature = "std", feature = "alloc"))]
pub use march::{march_ray, MarchParams, RaySamples};
#[cfg(any(feature = "std", feature = "alloc"))]
pub use mesh::TriangleMesh;
#[cfg(any(feature = "std", feature = "alloc"))]
pub use occupancy::DensityGrid;
#[cfg(any(feature = "std", feature = "alloc"))]
pub use schedule::refine_steps;

#[cfg(all(test, feature = "std"))]
mod integration_tests {
    use super::*;

    /// Sphere of radius 0.5 centered at the origin, sampled on a dense lattice.
    fn sphere_field(resolution: usize) -> DenseField {
        DenseField::from_fn(resolution, Aabb::cube(1.0), |p| p.length() - 0.5)
    }

    #[test]
    fn test_sphere_isosurface_is_welded_and_bounded() {
        let field = sphere_field(24);
        let mesh = extract_isosurface(&field, 0.0);

        assert!(mesh.num_faces() > 100, "too few faces: {}", mesh.num_faces());
        for v in &mesh.vertices {
            let r = v.length();
            assert!((r - 0.5).abs() < 0.1, "vertex off the sphere: {:?} (r={})", v, r);
        }

        // Welded meshes share vertices between neighbouring triangles
        assert!(mesh.num_vertices() < mesh.num_faces() * 3);
    }

    #[test]
    fn test_marching_through_occupied_grid_hits_sphere() {
        let bounds = Aabb::cube(1.0);
        let mut grid = DensityGrid::new(16, bounds).unwrap();
        grid.update_with(0.0, |p| if p.length() < 0.5 { 50.0 } else { 0.0 }).unwrap();

        let ray = Ray::new(Point3::new(0.0, 0.0, 3.0), Point3::new(0.0, 0.0, -1.0));
        let (near, far) = bounds.intersect(&ray).unwrap();
        let params = MarchParams::new(1.0, 256, 0.0, 16);
        let samples = march_ray(&ray, near, far, &params, Some(&grid), 0.0);

        assert!(!samples.is_empty());
        for &t in &samples.depths {
            let p = ray.at(t);
            assert!(p.length() < 0.5 + 2.0 * grid.cell_size(), "sample outside occupied shell: {:?}", p);
        }
    }

    #[test]
    fn test_cadence_matches_refine_schedule_budget() {
        let cadence = Cadence::new(20_000, 100, 50, 5).unwrap();
        let steps = refine_steps(&[0.1, 0.5], 20_000);

        assert_eq!(cadence.max_epoch, 200);
        assert_eq!(steps, std::vec![2000, 10_000]);
        assert!(steps.iter().all(|&s| s <= cadence.max_epoch * 100));
    }
}
