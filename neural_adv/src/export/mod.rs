//! Mesh and texture export.

pub mod mesh;
pub mod texture;

pub use mesh::{write_mesh, MeshExtractor};
pub use texture::{FaceAtlas, TextureBaker};
