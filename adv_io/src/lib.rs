//! adv_io - file formats for the adversarial NeRF driver.
//!
//! This crate handles everything that touches disk outside of model records:
//!
//! - [`LabelTable`]: the 1000-entry ImageNet class-name list
//! - [`Manifest`]: Blender-layout `transforms_<split>.json` camera manifests
//! - [`FloatImage`]: float image loading, saving, resizing and alpha compositing
//! - [`export_obj`] / [`export_textured_to_dir`]: Wavefront OBJ/MTL mesh export
//!
//! # Example
//!
//! ```ignore
//! use adv_io::{LabelTable, Manifest, Split};
//!
//! let labels = LabelTable::load("dataset/imagenet-simple-labels.json")?;
//! let manifest = Manifest::load_splits(root, &[Split::Train, Split::Val])?;
//! println!("{} frames, class 0 is {}", manifest.frames.len(), labels.get(0).unwrap());
//! ```

pub mod error;
pub mod image_io;
pub mod labels;
pub mod manifest;
pub mod obj;

// Re-export geometry from adv_core
pub use adv_core::{Point3, TriangleMesh};

pub use error::{AdvIoError, Result};
pub use image_io::{
    linear_to_srgb, load_backgrounds, load_image, save_png, srgb_to_linear, FloatImage,
};
pub use labels::{LabelTable, IMAGENET_CLASSES};
pub use manifest::{Frame, Manifest, Split};
pub use obj::{
    export_obj, export_obj_to_file, export_textured_obj, export_textured_to_dir, write_mtl,
    MeshStats, ObjExportConfig, TexturedExport, UvLayout,
};
