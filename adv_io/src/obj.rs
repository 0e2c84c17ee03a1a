//! Wavefront OBJ/MTL export.
//!
//! Writes plain meshes for the density-field surface and textured meshes (with a material
//! library and a PNG texture) for the fine-tuned stage.

use std::io::Write;
use std::path::{Path, PathBuf};

use adv_core::TriangleMesh;

use crate::error::{AdvIoError, Result};
use crate::image_io::{save_png, FloatImage};

/// Configuration for OBJ export.
#[derive(Debug, Clone)]
pub struct ObjExportConfig {
    /// Free-form comment lines written after the header.
    pub comments: Vec<String>,
    /// Also write per-vertex normals.
    pub normals: bool,
}

impl Default for ObjExportConfig {
    fn default() -> Self {
        Self {
            comments: Vec::new(),
            normals: true,
        }
    }
}

/// Texture coordinates for a mesh, indexed per face corner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UvLayout {
    /// UV coordinates in `[0, 1]`, v pointing up.
    pub uvs: Vec<[f32; 2]>,
    /// Per-face indices into `uvs`, matching the mesh faces one to one.
    pub faces: Vec<[u32; 3]>,
}

/// Mesh statistics returned by export functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshStats {
    /// Number of vertices in the mesh.
    pub vertex_count: usize,
    /// Number of triangles in the mesh.
    pub triangle_count: usize,
}

fn write_header<W: Write>(writer: &mut W, mesh: &TriangleMesh, config: &ObjExportConfig) -> Result<()> {
    writeln!(writer, "# nerf-adv OBJ Export")?;
    for line in &config.comments {
        writeln!(writer, "# {}", line)?;
    }
    writeln!(writer, "# {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces())?;
    writeln!(writer)?;
    Ok(())
}

fn write_geometry<W: Write>(writer: &mut W, mesh: &TriangleMesh, config: &ObjExportConfig) -> Result<()> {
    for v in &mesh.vertices {
        writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
    }
    if config.normals {
        for n in mesh.vertex_normals() {
            writeln!(writer, "vn {} {} {}", n.x, n.y, n.z)?;
        }
    }
    Ok(())
}

/// Write `mesh` as OBJ.
pub fn export_obj<W: Write>(
    mesh: &TriangleMesh,
    writer: &mut W,
    config: &ObjExportConfig,
) -> Result<MeshStats> {
    write_header(writer, mesh, config)?;
    write_geometry(writer, mesh, config)?;
    writeln!(writer)?;

    // OBJ uses 1-based indexing
    for f in &mesh.faces {
        let (a, b, c) = (f[0] + 1, f[1] + 1, f[2] + 1);
        if config.normals {
            writeln!(writer, "f {a}//{a} {b}//{b} {c}//{c}")?;
        } else {
            writeln!(writer, "f {a} {b} {c}")?;
        }
    }

    Ok(MeshStats {
        vertex_count: mesh.num_vertices(),
        triangle_count: mesh.num_faces(),
    })
}

/// Write `mesh` as OBJ to a file, creating parent directories.
pub fn export_obj_to_file<P: AsRef<Path>>(
    mesh: &TriangleMesh,
    path: P,
    config: &ObjExportConfig,
) -> Result<MeshStats> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    let stats = export_obj(mesh, &mut file, config)?;
    file.flush()?;
    log::info!(
        "Wrote {} ({} vertices, {} faces)",
        path.display(),
        stats.vertex_count,
        stats.triangle_count
    );
    Ok(stats)
}

/// Write a textured mesh referencing material `material` from `mtllib`.
pub fn export_textured_obj<W: Write>(
    mesh: &TriangleMesh,
    uv: &UvLayout,
    mtllib: &str,
    material: &str,
    writer: &mut W,
    config: &ObjExportConfig,
) -> Result<MeshStats> {
    if uv.faces.len() != mesh.faces.len() {
        return Err(AdvIoError::InvalidMesh {
            message: format!(
                "uv layout has {} faces, mesh has {}",
                uv.faces.len(),
                mesh.faces.len()
            ),
        });
    }

    write_header(writer, mesh, config)?;
    writeln!(writer, "mtllib {}", mtllib)?;
    write_geometry(writer, mesh, config)?;
    for t in &uv.uvs {
        writeln!(writer, "vt {} {}", t[0], t[1])?;
    }
    writeln!(writer)?;
    writeln!(writer, "usemtl {}", material)?;

    for (f, t) in mesh.faces.iter().zip(&uv.faces) {
        write!(writer, "f")?;
        for k in 0..3 {
            let (v, vt) = (f[k] + 1, t[k] + 1);
            if config.normals {
                write!(writer, " {v}/{vt}/{v}")?;
            } else {
                write!(writer, " {v}/{vt}")?;
            }
        }
        writeln!(writer)?;
    }

    Ok(MeshStats {
        vertex_count: mesh.num_vertices(),
        triangle_count: mesh.num_faces(),
    })
}

/// Write a material library with a single diffuse-textured material.
pub fn write_mtl<W: Write>(writer: &mut W, material: &str, texture_file: &str) -> Result<()> {
    writeln!(writer, "newmtl {}", material)?;
    writeln!(writer, "Ka 1.000000 1.000000 1.000000")?;
    writeln!(writer, "Kd 1.000000 1.000000 1.000000")?;
    writeln!(writer, "Ks 0.000000 0.000000 0.000000")?;
    writeln!(writer, "Tr 1.000000")?;
    writeln!(writer, "illum 1")?;
    writeln!(writer, "Ns 0.000000")?;
    writeln!(writer, "map_Kd {}", texture_file)?;
    Ok(())
}

/// Paths written by [`export_textured_to_dir`].
#[derive(Debug, Clone, PartialEq)]
pub struct TexturedExport {
    /// The `.obj` file.
    pub obj: PathBuf,
    /// The `.mtl` file.
    pub mtl: PathBuf,
    /// The texture image.
    pub texture: PathBuf,
    /// Geometry counts.
    pub stats: MeshStats,
}

/// Write `<stem>.obj`, `<stem>.mtl` and `texture.png` into `dir`.
pub fn export_textured_to_dir(
    dir: &Path,
    stem: &str,
    mesh: &TriangleMesh,
    uv: &UvLayout,
    texture: &FloatImage,
    config: &ObjExportConfig,
) -> Result<TexturedExport> {
    std::fs::create_dir_all(dir)?;
    let obj = dir.join(format!("{stem}.obj"));
    let mtl = dir.join(format!("{stem}.mtl"));
    let texture_path = dir.join("texture.png");
    let mtl_name = format!("{stem}.mtl");

    let mut file = std::io::BufWriter::new(std::fs::File::create(&obj)?);
    let stats = export_textured_obj(mesh, uv, &mtl_name, "mat0", &mut file, config)?;
    file.flush()?;

    let mut file = std::io::BufWriter::new(std::fs::File::create(&mtl)?);
    write_mtl(&mut file, "mat0", "texture.png")?;
    file.flush()?;

    save_png(&texture_path, texture)?;
    log::info!(
        "Wrote textured mesh {} ({} faces, {}x{} texture)",
        obj.display(),
        stats.triangle_count,
        texture.width,
        texture.height
    );

    Ok(TexturedExport {
        obj,
        mtl,
        texture: texture_path,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use adv_core::Point3;

    fn triangle() -> TriangleMesh {
        TriangleMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn test_export_plain_obj() {
        let mut out = Vec::new();
        let config = ObjExportConfig {
            comments: vec!["stage 0".to_string()],
            normals: false,
        };
        let stats = export_obj(&triangle(), &mut out, &config).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(stats.vertex_count, 3);
        assert_eq!(stats.triangle_count, 1);
        assert!(text.contains("# stage 0"));
        assert!(text.contains("v 1 0 0"));
        assert!(text.contains("f 1 2 3"));
        assert!(!text.contains("vn "));
    }

    #[test]
    fn test_export_with_normals() {
        let mut out = Vec::new();
        export_obj(&triangle(), &mut out, &ObjExportConfig::default()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("vn 0 0 1"));
        assert!(text.contains("f 1//1 2//2 3//3"));
    }

    #[test]
    fn test_textured_export_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let uv = UvLayout {
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            faces: vec![[0, 1, 2]],
        };
        let texture = FloatImage::filled(4, 4, 3, 0.5);
        let config = ObjExportConfig {
            comments: Vec::new(),
            normals: false,
        };

        let export =
            export_textured_to_dir(dir.path(), "mesh_stage1", &triangle(), &uv, &texture, &config)
                .unwrap();
        assert!(export.obj.is_file() && export.mtl.is_file() && export.texture.is_file());

        let obj = std::fs::read_to_string(&export.obj).unwrap();
        assert!(obj.contains("mtllib mesh_stage1.mtl"));
        assert!(obj.contains("f 1/1 2/2 3/3"));
        let mtl = std::fs::read_to_string(&export.mtl).unwrap();
        assert!(mtl.contains("map_Kd texture.png"));
    }

    #[test]
    fn test_textured_rejects_mismatched_uvs() {
        let mut out = Vec::new();
        let err = export_textured_obj(
            &triangle(),
            &UvLayout::default(),
            "a.mtl",
            "mat0",
            &mut out,
            &ObjExportConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AdvIoError::InvalidMesh { .. }));
    }
}
