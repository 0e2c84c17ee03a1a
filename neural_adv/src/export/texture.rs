//! Texture baking for the fine-tuned appearance.
//!
//! Every face gets its own square cell in the atlas and occupies the lower-left half of
//! it. Texels are colored by querying the field's diffuse color at the surface point
//! they map to, averaged over `ssaa x ssaa` subsamples.

use std::path::Path;

use adv_core::{Point3, TriangleMesh};
use adv_io::{export_textured_to_dir, FloatImage, ObjExportConfig, TexturedExport, UvLayout};
use burn::prelude::*;

use crate::error::{NeuralAdvError, Result};
use crate::nn::{NerfNetwork, Shading};
use crate::render::to_vec;

/// Texel subsamples per network query.
const QUERY_CHUNK: usize = 1 << 15;

/// Texels left empty around each triangle to limit bleeding.
const CELL_PADDING: f32 = 1.0;

/// Atlas layout: one square cell per face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceAtlas {
    /// Texture side length.
    pub size: usize,
    /// Cells per row.
    pub cells_per_row: usize,
    /// Cell side in texels.
    pub cell_size: f32,
}

impl FaceAtlas {
    /// Layout for `num_faces` faces on a `size x size` texture.
    pub fn new(num_faces: usize, size: usize) -> Self {
        let cells_per_row = ((num_faces.max(1) as f64).sqrt().ceil() as usize).max(1);
        Self {
            size,
            cells_per_row,
            cell_size: size as f32 / cells_per_row as f32,
        }
    }

    /// Texel-space corners of face `face`: origin, +u, +v.
    fn corners(&self, face: usize) -> [[f32; 2]; 3] {
        let cx = (face % self.cells_per_row) as f32 * self.cell_size;
        let cy = (face / self.cells_per_row) as f32 * self.cell_size;
        let pad = CELL_PADDING.min(self.cell_size * 0.25);
        let s = self.cell_size - 3.0 * pad;
        let (x0, y0) = (cx + pad, cy + pad);
        [[x0, y0], [x0 + s, y0], [x0, y0 + s]]
    }

    /// UV coordinates of every face corner (v up, so texel rows are flipped).
    pub fn uv_layout(&self, num_faces: usize) -> UvLayout {
        let size = self.size as f32;
        let mut uvs = Vec::with_capacity(num_faces * 3);
        let mut faces = Vec::with_capacity(num_faces);
        for f in 0..num_faces {
            for [x, y] in self.corners(f) {
                uvs.push([x / size, 1.0 - y / size]);
            }
            let base = (f * 3) as u32;
            faces.push([base, base + 1, base + 2]);
        }
        UvLayout { uvs, faces }
    }

    /// Face and barycentric weights for the texel-space point `(x, y)`, if it is covered.
    pub fn locate(&self, x: f32, y: f32, num_faces: usize) -> Option<(usize, [f32; 3])> {
        let col = (x / self.cell_size) as usize;
        let row = (y / self.cell_size) as usize;
        if col >= self.cells_per_row {
            return None;
        }
        let face = row * self.cells_per_row + col;
        if face >= num_faces {
            return None;
        }
        let [o, u, _] = self.corners(face);
        let s = u[0] - o[0];
        if s <= 0.0 {
            return None;
        }
        let a = (x - o[0]) / s;
        let b = (y - o[1]) / s;
        // Texels just outside the triangle are snapped back in to avoid seams
        if a < -0.5 || b < -0.5 || a + b > 1.5 {
            return None;
        }
        let a = a.clamp(0.0, 1.0);
        let b = b.clamp(0.0, 1.0 - a);
        Some((face, [1.0 - a - b, a, b]))
    }
}

/// Bakes the field's diffuse color into a texture atlas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureBaker {
    /// Texture side length.
    pub size: usize,
    /// Supersampling factor per axis.
    pub ssaa: usize,
}

impl TextureBaker {
    /// Baker for a `size x size` texture with `ssaa x ssaa` subsamples.
    pub fn new(size: usize, ssaa: usize) -> Self {
        Self {
            size: size.max(1),
            ssaa: ssaa.max(1),
        }
    }

    /// Bake `mesh` into an atlas; returns the UV layout and the RGB texture.
    pub fn bake<B: Backend>(
        &self,
        model: &NerfNetwork<B>,
        mesh: &TriangleMesh,
        device: &B::Device,
    ) -> Result<(UvLayout, FloatImage)> {
        let num_faces = mesh.num_faces();
        let atlas = FaceAtlas::new(num_faces, self.size);
        let normals = mesh.face_normals();

        // Surface points and viewing directions of every covered subsample
        let mut targets: Vec<usize> = Vec::new();
        let mut points: Vec<Point3> = Vec::new();
        let mut dirs: Vec<Point3> = Vec::new();
        let n = self.ssaa;
        for ty in 0..self.size {
            for tx in 0..self.size {
                for sy in 0..n {
                    for sx in 0..n {
                        let x = tx as f32 + (sx as f32 + 0.5) / n as f32;
                        let y = ty as f32 + (sy as f32 + 0.5) / n as f32;
                        let Some((face, w)) = atlas.locate(x, y, num_faces) else {
                            continue;
                        };
                        let [i0, i1, i2] = mesh.faces[face];
                        let p = mesh.vertices[i0 as usize] * w[0]
                            + mesh.vertices[i1 as usize] * w[1]
                            + mesh.vertices[i2 as usize] * w[2];
                        targets.push(ty * self.size + tx);
                        points.push(p);
                        dirs.push(-normals[face]);
                    }
                }
            }
        }

        let colors = query_diffuse(model, &points, &dirs, device)?;
        let mut sum = vec![0.0f32; self.size * self.size * 3];
        let mut count = vec![0u32; self.size * self.size];
        for (i, &texel) in targets.iter().enumerate() {
            for c in 0..3 {
                sum[texel * 3 + c] += colors[i * 3 + c];
            }
            count[texel] += 1;
        }
        let data: Vec<f32> = sum
            .chunks_exact(3)
            .zip(&count)
            .flat_map(|(rgb, &k)| {
                let k = k.max(1) as f32;
                [rgb[0] / k, rgb[1] / k, rgb[2] / k]
            })
            .collect();

        let texture = FloatImage::from_data(self.size as u32, self.size as u32, 3, data)?;
        log::info!(
            "Baked {}x{} texture for {} faces ({} samples)",
            self.size,
            self.size,
            num_faces,
            points.len()
        );
        Ok((atlas.uv_layout(num_faces), texture))
    }

    /// Bake and write `<stem>.obj`, `<stem>.mtl` and `texture.png` into `dir`.
    pub fn export<B: Backend>(
        &self,
        model: &NerfNetwork<B>,
        mesh: &TriangleMesh,
        dir: &Path,
        stem: &str,
        device: &B::Device,
    ) -> Result<TexturedExport> {
        let (uv, texture) = self.bake(model, mesh, device)?;
        let config = ObjExportConfig {
            comments: vec![format!("texture {}x{}, ssaa {}", self.size, self.size, self.ssaa)],
            normals: true,
        };
        export_textured_to_dir(dir, stem, mesh, &uv, &texture, &config).map_err(|e| {
            NeuralAdvError::Export {
                message: format!("{}: {}", dir.display(), e),
            }
        })
    }
}

/// Diffuse color at `points` seen along `dirs`, flattened RGB.
fn query_diffuse<B: Backend>(
    model: &NerfNetwork<B>,
    points: &[Point3],
    dirs: &[Point3],
    device: &B::Device,
) -> Result<Vec<f32>> {
    let shading = Shading {
        specular: false,
        ..Shading::default()
    };
    let mut out = Vec::with_capacity(points.len() * 3);
    for (p, d) in points.chunks(QUERY_CHUNK).zip(dirs.chunks(QUERY_CHUNK)) {
        let n = p.len();
        let flat_p: Vec<f32> = p.iter().flat_map(|v| v.as_array()).collect();
        let flat_d: Vec<f32> = d.iter().flat_map(|v| v.as_array()).collect();
        let x = Tensor::<B, 1>::from_floats(flat_p.as_slice(), device).reshape([n, 3]);
        let dir = Tensor::<B, 1>::from_floats(flat_d.as_slice(), device).reshape([n, 3]);
        out.extend(to_vec(model.forward(x, dir, shading).rgb)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::NerfNetworkConfig;
    use burn::backend::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn tetrahedron() -> TriangleMesh {
        TriangleMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.5, 0.0, 0.0),
                Point3::new(0.0, 0.5, 0.0),
                Point3::new(0.0, 0.0, 0.5),
            ],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
    }

    #[test]
    fn test_atlas_cells_do_not_overlap() {
        let atlas = FaceAtlas::new(4, 64);
        assert_eq!(atlas.cells_per_row, 2);
        let uv = atlas.uv_layout(4);
        assert_eq!(uv.faces.len(), 4);
        assert!(uv.uvs.iter().all(|[u, v]| (0.0..=1.0).contains(u) && (0.0..=1.0).contains(v)));

        // The centroid of each face's triangle maps back to that face
        for f in 0..4 {
            let [o, a, b] = atlas.corners(f);
            let x = (o[0] + a[0] + b[0]) / 3.0;
            let y = (o[1] + a[1] + b[1]) / 3.0;
            let (face, w) = atlas.locate(x, y, 4).unwrap();
            assert_eq!(face, f);
            assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_bake_writes_textured_mesh() {
        let device = Default::default();
        let model = NerfNetworkConfig::new(1.0).init::<TestBackend>(&device);
        let temp = TempDir::new().unwrap();
        let exported = TextureBaker::new(16, 2)
            .export(&model, &tetrahedron(), temp.path(), "mesh_stage1", &device)
            .unwrap();

        assert!(exported.obj.ends_with("mesh_stage1.obj"));
        assert!(exported.texture.is_file());
        let mtl = std::fs::read_to_string(exported.mtl).unwrap();
        assert!(mtl.contains("texture.png"));
    }

    #[test]
    fn test_baked_colors_are_in_range() {
        let device = Default::default();
        let model = NerfNetworkConfig::new(1.0).init::<TestBackend>(&device);
        let (_, texture) = TextureBaker::new(8, 1).bake(&model, &tetrahedron(), &device).unwrap();
        assert_eq!(texture.data.len(), 8 * 8 * 3);
        assert!(texture.data.iter().all(|c| (0.0..=1.0).contains(c)));
    }
}
