//! Blender-layout camera manifests (`transforms_<split>.json`).
//!
//! Each manifest lists frames with an image path and a 4x4 camera-to-world matrix in the
//! OpenGL convention, plus either a horizontal field of view or explicit pinhole
//! intrinsics.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AdvIoError, Result};

/// Dataset split stored in its own manifest file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    /// Training frames.
    Train,
    /// Validation frames.
    Val,
    /// Held-out test frames.
    Test,
}

impl Split {
    /// Lowercase split name.
    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }

    /// Manifest file name for this split.
    pub fn file_name(self) -> String {
        format!("transforms_{}.json", self.as_str())
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One posed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Image path relative to the dataset root, with or without extension.
    pub file_path: String,
    /// Camera-to-world matrix, row-major.
    pub transform_matrix: [[f32; 4]; 4],
}

impl Frame {
    /// Absolute image path; `.png` is appended when the path has no extension.
    pub fn image_path(&self, root: &Path) -> PathBuf {
        let rel = self.file_path.trim_start_matches("./");
        let mut path = root.join(rel);
        if path.extension().is_none() {
            path.set_extension("png");
        }
        path
    }

    /// Camera center (translation column).
    pub fn center(&self) -> [f32; 3] {
        let m = &self.transform_matrix;
        [m[0][3], m[1][3], m[2][3]]
    }
}

/// Parsed manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Horizontal field of view in radians.
    #[serde(default)]
    pub camera_angle_x: Option<f32>,
    /// Focal length along x in pixels.
    #[serde(default)]
    pub fl_x: Option<f32>,
    /// Focal length along y in pixels.
    #[serde(default)]
    pub fl_y: Option<f32>,
    /// Principal point x.
    #[serde(default)]
    pub cx: Option<f32>,
    /// Principal point y.
    #[serde(default)]
    pub cy: Option<f32>,
    /// Image width the intrinsics refer to.
    #[serde(default)]
    pub w: Option<u32>,
    /// Image height the intrinsics refer to.
    #[serde(default)]
    pub h: Option<u32>,
    /// Posed frames.
    pub frames: Vec<Frame>,
}

impl Manifest {
    /// Parse manifest JSON and check that some form of intrinsics is present.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(json)?;
        if manifest.camera_angle_x.is_none() && manifest.fl_x.is_none() {
            return Err(AdvIoError::InvalidManifest {
                message: "neither camera_angle_x nor fl_x is set".to_string(),
            });
        }
        Ok(manifest)
    }

    /// Load the manifest for `split` under `root`.
    ///
    /// Falls back to a single `transforms.json` shared by every split.
    pub fn load(root: &Path, split: Split) -> Result<Self> {
        let per_split = root.join(split.file_name());
        let path = if per_split.is_file() {
            per_split
        } else {
            let shared = root.join("transforms.json");
            if !shared.is_file() {
                return Err(AdvIoError::MissingFile {
                    path: per_split.display().to_string(),
                });
            }
            log::warn!(
                "{} not found, using {}",
                split.file_name(),
                shared.display()
            );
            shared
        };
        let text = std::fs::read_to_string(&path)?;
        Self::from_json_str(&text)
    }

    /// Load and concatenate several splits. Intrinsics come from the first split.
    pub fn load_splits(root: &Path, splits: &[Split]) -> Result<Self> {
        let mut merged: Option<Manifest> = None;
        for &split in splits {
            let manifest = Self::load(root, split)?;
            if manifest.frames.is_empty() {
                return Err(AdvIoError::EmptySplit {
                    split: split.to_string(),
                });
            }
            match merged.as_mut() {
                Some(m) => m.frames.extend(manifest.frames),
                None => merged = Some(manifest),
            }
        }
        merged.ok_or_else(|| AdvIoError::InvalidManifest {
            message: "no splits requested".to_string(),
        })
    }

    /// Horizontal field of view, derived from `fl_x` and `w` when not given directly.
    pub fn fov_x(&self) -> Option<f32> {
        if let Some(angle) = self.camera_angle_x {
            return Some(angle);
        }
        match (self.fl_x, self.w) {
            (Some(fl), Some(w)) if fl > 0.0 => Some(2.0 * (w as f32 / (2.0 * fl)).atan()),
            _ => None,
        }
    }

    /// Largest camera distance from the origin.
    pub fn max_camera_distance(&self) -> f32 {
        self.frames
            .iter()
            .map(|f| {
                let c = f.center();
                (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt()
            })
            .fold(0.0, f32::max)
    }
}
