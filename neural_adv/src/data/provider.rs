//! Dataset providers.
//!
//! Task 1 trains on the Blender-layout images as they are. Task 2 additionally pairs
//! every frame with a background image, so the object is rendered and supervised over a
//! real scene.

use std::path::{Path, PathBuf};

use adv_core::{look_at, Intrinsics, PinholeCamera, Point3};
use adv_io::{load_backgrounds, load_image, srgb_to_linear, FloatImage, Manifest, Split};

use crate::config::{ColorSpace, DataFormat, Options, TrainSplit};
use crate::error::{NeuralAdvError, Result};

use super::dataset::{DatasetSplit, SceneDataset};

/// Number of views in the `circle` test trajectory.
pub const CIRCLE_VIEWS: usize = 60;

/// Produces posed image sets for each split.
pub trait DatasetProvider {
    /// Load `split`.
    fn load(&self, split: DatasetSplit) -> Result<SceneDataset>;
}

/// Orbit camera settings for synthetic test trajectories.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitSettings {
    /// Image width.
    pub width: usize,
    /// Image height.
    pub height: usize,
    /// Orbit radius.
    pub radius: f32,
    /// Vertical field of view in degrees.
    pub fovy: f32,
}

/// Reads `transforms_<split>.json` datasets.
#[derive(Debug, Clone)]
pub struct BlenderProvider {
    root: PathBuf,
    train_split: TrainSplit,
    downscale: u32,
    scale: f32,
    offset: Point3,
    bound: f32,
    color_space: ColorSpace,
    camera_traj: String,
    orbit: OrbitSettings,
}

impl BlenderProvider {
    /// Provider for a normalized option set. Only the `nerf` layout is supported.
    pub fn from_options(options: &Options) -> Result<Self> {
        if options.dataset.data_format != DataFormat::Nerf {
            return Err(NeuralAdvError::config(format!(
                "data_format {:?} is not supported by the built-in provider, use nerf",
                options.dataset.data_format
            )));
        }
        let offset = &options.dataset.offset;
        Ok(Self {
            root: PathBuf::from(&options.run.path),
            train_split: options.dataset.train_split,
            downscale: options.dataset.downscale,
            scale: options.dataset.scale,
            offset: Point3::new(
                offset.first().copied().unwrap_or(0.0),
                offset.get(1).copied().unwrap_or(0.0),
                offset.get(2).copied().unwrap_or(0.0),
            ),
            bound: options.dataset.bound,
            color_space: options.experimental.color_space,
            camera_traj: options.run.camera_traj.clone(),
            orbit: OrbitSettings {
                width: options.gui.w,
                height: options.gui.h,
                radius: options.gui.radius,
                fovy: options.gui.fovy,
            },
        })
    }

    /// Dataset root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest_splits(&self, split: DatasetSplit) -> Vec<Split> {
        match split {
            DatasetSplit::Train => match self.train_split {
                TrainSplit::Train => vec![Split::Train],
                TrainSplit::Trainval => vec![Split::Train, Split::Val],
                TrainSplit::All => vec![Split::Train, Split::Val, Split::Test],
            },
            DatasetSplit::Val => vec![Split::Val],
            DatasetSplit::Test => vec![Split::Test],
        }
    }

    /// Camera position scale; negative requests fitting the cameras to `2 * bound`.
    fn resolve_scale(&self, manifest: &Manifest) -> f32 {
        if self.scale > 0.0 {
            return self.scale;
        }
        let distance = manifest.max_camera_distance();
        if distance > 0.0 {
            let scale = 2.0 * self.bound / distance;
            log::info!("Auto scale {:.4} (max camera distance {:.3})", scale, distance);
            scale
        } else {
            1.0
        }
    }

    fn intrinsics(manifest: &Manifest, width: u32, height: u32) -> Result<Intrinsics> {
        if let (Some(fl_x), Some(w)) = (manifest.fl_x, manifest.w) {
            let s = width as f32 / w as f32;
            let fl_y = manifest.fl_y.unwrap_or(fl_x);
            return Ok(Intrinsics {
                fx: fl_x * s,
                fy: fl_y * s,
                cx: manifest.cx.unwrap_or(w as f32 * 0.5) * s,
                cy: manifest.cy.unwrap_or(manifest.h.unwrap_or(height) as f32 * 0.5) * s,
            });
        }
        let fov = manifest.fov_x().ok_or_else(|| {
            NeuralAdvError::config("manifest has no usable intrinsics".to_string())
        })?;
        Ok(Intrinsics::from_fov_x(width as usize, height as usize, fov))
    }

    fn load_frames(&self, split: DatasetSplit) -> Result<SceneDataset> {
        let manifest = Manifest::load_splits(&self.root, &self.manifest_splits(split))?;
        let scale = self.resolve_scale(&manifest);

        let mut cameras = Vec::with_capacity(manifest.frames.len());
        let mut images = Vec::with_capacity(manifest.frames.len());
        for frame in &manifest.frames {
            let mut image = load_image(frame.image_path(&self.root), self.downscale)?;
            if self.color_space == ColorSpace::Linear {
                image = image.map_color(srgb_to_linear);
            }
            let intrinsics = Self::intrinsics(&manifest, image.width, image.height)?;
            let camera = PinholeCamera::new(
                frame.transform_matrix,
                intrinsics,
                image.width as usize,
                image.height as usize,
            )
            .rescaled(scale, self.offset);
            cameras.push(camera);
            images.push(image);
        }
        log::info!(
            "Loaded {} {} frames from {}",
            cameras.len(),
            split,
            self.root.display()
        );

        Ok(SceneDataset {
            split,
            cameras,
            images,
            backgrounds: Vec::new(),
        })
    }

    /// Orbit around the origin at the configured radius and field of view.
    pub fn circle_trajectory(orbit: &OrbitSettings, views: usize) -> Vec<PinholeCamera> {
        let fovy = orbit.fovy.to_radians();
        let focal = 0.5 * orbit.height as f32 / (0.5 * fovy).tan();
        let intrinsics = Intrinsics {
            fx: focal,
            fy: focal,
            cx: orbit.width as f32 * 0.5,
            cy: orbit.height as f32 * 0.5,
        };
        let elevation = 30f32.to_radians();
        (0..views)
            .map(|i| {
                let azimuth = i as f32 / views as f32 * std::f32::consts::TAU;
                let eye = Point3::new(
                    orbit.radius * elevation.cos() * azimuth.cos(),
                    orbit.radius * elevation.cos() * azimuth.sin(),
                    orbit.radius * elevation.sin(),
                );
                PinholeCamera::new(
                    look_at(eye, Point3::splat(0.0)),
                    intrinsics,
                    orbit.width,
                    orbit.height,
                )
            })
            .collect()
    }
}

impl DatasetProvider for BlenderProvider {
    fn load(&self, split: DatasetSplit) -> Result<SceneDataset> {
        if split == DatasetSplit::Test && self.camera_traj == "circle" {
            return Ok(SceneDataset {
                split,
                cameras: Self::circle_trajectory(&self.orbit, CIRCLE_VIEWS),
                images: Vec::new(),
                backgrounds: Vec::new(),
            });
        }
        if !self.camera_traj.is_empty() && self.camera_traj != "circle" {
            log::warn!("Unknown camera_traj '{}', using dataset poses", self.camera_traj);
        }
        self.load_frames(split)
    }
}

/// Blender frames paired with background images (task 2).
#[derive(Debug, Clone)]
pub struct BackgroundProvider {
    inner: BlenderProvider,
    backgrounds: Vec<FloatImage>,
}

impl BackgroundProvider {
    /// Provider for a normalized option set; requires `--back_file`.
    pub fn from_options(options: &Options) -> Result<Self> {
        let back_file = options
            .attack
            .back_file
            .as_deref()
            .ok_or_else(|| NeuralAdvError::config("task 2 requires --back_file"))?;
        let backgrounds = load_backgrounds(back_file)
            .map_err(|e| NeuralAdvError::resource("background images", e))?;
        Ok(Self::new(BlenderProvider::from_options(options)?, backgrounds))
    }

    /// Wrap `inner` with already loaded backgrounds.
    pub fn new(inner: BlenderProvider, backgrounds: Vec<FloatImage>) -> Self {
        Self { inner, backgrounds }
    }

    /// Background for frame `index` at `width x height`, cycling through the set.
    fn background_for(&self, index: usize, width: usize, height: usize) -> FloatImage {
        match self.backgrounds.get(index % self.backgrounds.len().max(1)) {
            Some(bg) => bg.to_rgb().resized(width as u32, height as u32),
            None => FloatImage::filled(width as u32, height as u32, 3, 1.0),
        }
    }
}

impl DatasetProvider for BackgroundProvider {
    fn load(&self, split: DatasetSplit) -> Result<SceneDataset> {
        let mut dataset = self.inner.load(split)?;
        dataset.backgrounds = dataset
            .cameras
            .iter()
            .enumerate()
            .map(|(i, camera)| self.background_for(i, camera.width, camera.height))
            .collect();
        Ok(dataset)
    }
}

/// The provider selected by `--task`.
pub fn provider_for_task(options: &Options) -> Result<Box<dyn DatasetProvider>> {
    match options.attack.task {
        1 => Ok(Box::new(BlenderProvider::from_options(options)?)),
        2 => Ok(Box::new(BackgroundProvider::from_options(options)?)),
        task => Err(NeuralAdvError::config(format!("task must be 1 or 2, got {}", task))),
    }
}
