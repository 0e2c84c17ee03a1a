//! Surface extraction from the trained field.

use std::path::{Path, PathBuf};

use adv_core::{extract_isosurface, Aabb, DenseField, PinholeCamera, TriangleMesh};
use adv_io::{export_obj_to_file, ObjExportConfig};
use burn::prelude::*;

use crate::config::Options;
use crate::error::{NeuralAdvError, Result};
use crate::nn::NerfNetwork;

/// Points per network query while sampling the lattice.
const QUERY_CHUNK: usize = 1 << 16;

/// Settings for turning the field into a cleaned triangle mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshExtractor {
    /// Lattice points per axis.
    pub resolution: usize,
    /// Face budget after decimation; 0 keeps every face.
    pub decimate_target: usize,
    /// Density level of the surface (ignored in SDF mode, where the level is 0).
    pub density_thresh: f32,
    /// Components with fewer faces are dropped.
    pub clean_min_faces: usize,
    /// Components smaller than this percentage of the mesh diagonal are dropped.
    pub clean_min_diameter_pct: f32,
    /// Frame dilation in pixels for visibility culling.
    pub visibility_dilation: f32,
    /// Region sampled.
    pub bounds: Aabb,
}

impl MeshExtractor {
    /// Extractor for a normalized option set at `resolution`.
    pub fn from_options(options: &Options, resolution: usize, decimate_target: usize) -> Self {
        Self {
            resolution,
            decimate_target,
            density_thresh: options.training.density_thresh,
            clean_min_faces: options.mesh.clean_min_f,
            clean_min_diameter_pct: options.mesh.clean_min_d,
            visibility_dilation: options.mesh.visibility_mask_dilation as f32,
            bounds: Aabb::cube(options.dataset.bound),
        }
    }

    /// Sample the field and return a signed field, positive outside the object.
    pub fn sample<B: Backend>(&self, model: &NerfNetwork<B>, device: &B::Device) -> Result<DenseField> {
        let points = DenseField::lattice_points(self.resolution, self.bounds);
        let values = if model.is_sdf() {
            model.raw_at(&points, QUERY_CHUNK, device)?
        } else {
            model
                .density_at(&points, QUERY_CHUNK, device)?
                .into_iter()
                .map(|sigma| self.density_thresh - sigma)
                .collect()
        };
        Ok(DenseField::from_values(self.resolution.max(2), self.bounds, values)?)
    }

    /// Extract, clean, decimate and optionally cull against `views`.
    pub fn extract<B: Backend>(
        &self,
        model: &NerfNetwork<B>,
        views: Option<&[PinholeCamera]>,
        device: &B::Device,
    ) -> Result<TriangleMesh> {
        let field = self.sample(model, device)?;
        let mut mesh = extract_isosurface(&field, 0.0);
        log::info!(
            "Marched {}^3 lattice: {} vertices, {} faces",
            self.resolution,
            mesh.num_vertices(),
            mesh.num_faces()
        );

        let removed = mesh.remove_small_components(self.clean_min_faces, self.clean_min_diameter_pct);
        if removed > 0 {
            log::debug!("Removed {} small components", removed);
        }
        if self.decimate_target > 0 && mesh.num_faces() > self.decimate_target {
            mesh.decimate(self.decimate_target);
            log::info!("Decimated to {} faces", mesh.num_faces());
        }
        if let Some(views) = views {
            let culled = mesh.cull_invisible(views, self.visibility_dilation);
            log::info!("Culled {} faces unseen by {} views", culled, views.len());
        }
        mesh.remove_degenerate_faces();
        mesh.remove_unreferenced_vertices();

        if mesh.is_empty() {
            log::warn!("Extracted mesh is empty; the field may not be trained yet");
        }
        Ok(mesh)
    }
}

/// Write `mesh` to `<dir>/mesh.obj`.
pub fn write_mesh(mesh: &TriangleMesh, dir: &Path, comments: Vec<String>) -> Result<PathBuf> {
    let path = dir.join("mesh.obj");
    let config = ObjExportConfig {
        comments,
        normals: true,
    };
    export_obj_to_file(mesh, &path, &config)
        .map_err(|e| NeuralAdvError::Export {
            message: format!("{}: {}", path.display(), e),
        })?;
    Ok(path)
}
