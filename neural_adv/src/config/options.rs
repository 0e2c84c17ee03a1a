//! Command-line option groups.
//!
//! Each group derives both [`clap::Args`] and burn's [`Config`], so the same struct is
//! parsed from the command line, filled with defaults in code via `new()`, and saved to
//! `workspace/options.json`.

use burn::config::Config;
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// Dataset layout understood by the data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// Blender `transforms_<split>.json` layout.
    Nerf,
    /// COLMAP sparse reconstruction.
    Colmap,
    /// DTU multi-view stereo scans.
    Dtu,
}

/// Which splits form the training set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainSplit {
    /// Train frames only.
    Train,
    /// Train and validation frames together.
    Trainval,
    /// Every split.
    All,
}

/// Background behind the rendered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    /// Constant white.
    White,
    /// Uniform random color per ray.
    Random,
}

/// Color space the network predicts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    /// sRGB-encoded targets.
    Srgb,
    /// Linear targets; images are converted on load.
    Linear,
}

/// Run control: where to read, where to write, which stage.
#[derive(Config, Debug, Args)]
#[command(rename_all = "snake_case")]
pub struct RunOptions {
    /// Dataset root directory.
    #[arg(help_heading = "Run Options")]
    pub path: String,

    /// Recommended settings (fp16, preload, mark_untrained, random_image_batch, ...).
    #[arg(short = 'O', help_heading = "Run Options")]
    #[config(default = false)]
    pub preset_o: bool,

    /// Output directory.
    #[arg(long, help_heading = "Run Options", default_value = "workspace")]
    #[config(default = "String::from(\"workspace\")")]
    pub workspace: String,

    /// Random seed.
    #[arg(long, help_heading = "Run Options", default_value = "0")]
    #[config(default = 0)]
    pub seed: u64,

    /// Training stage: 0 optimizes the radiance field, 1 fine-tunes appearance.
    #[arg(long, help_heading = "Run Options", default_value = "0")]
    #[config(default = 0)]
    pub stage: u32,

    /// Checkpoint policy: latest, scratch, best, or a checkpoint directory.
    #[arg(long, help_heading = "Run Options", default_value = "latest")]
    #[config(default = "String::from(\"latest\")")]
    pub ckpt: String,

    /// Mixed precision (accepted, the reference backend runs in f32).
    #[arg(long, help_heading = "Run Options")]
    #[config(default = false)]
    pub fp16: bool,

    /// Treat the density field as a signed distance field.
    #[arg(long, help_heading = "Run Options")]
    #[config(default = false)]
    pub sdf: bool,

    /// Use fused MLP kernels (accepted for compatibility).
    #[arg(long, help_heading = "Run Options")]
    #[config(default = false)]
    pub tcnn: bool,

    /// Progressively unlock positional-encoding frequencies.
    #[arg(long, help_heading = "Run Options")]
    #[config(default = false)]
    pub progressive_level: bool,

    /// Skip training, render the test split and export.
    #[arg(long, help_heading = "Run Options")]
    #[config(default = false)]
    pub test: bool,

    /// With --test, skip rendering the test split.
    #[arg(long, help_heading = "Run Options")]
    #[config(default = false)]
    pub test_no_video: bool,

    /// With --test, skip mesh export.
    #[arg(long, help_heading = "Run Options")]
    #[config(default = false)]
    pub test_no_mesh: bool,

    /// Test camera trajectory: empty for the dataset poses, `circle` for an orbit.
    #[arg(long, help_heading = "Run Options", default_value = "")]
    #[config(default = "String::new()")]
    pub camera_traj: String,

    /// Steps between progress log lines.
    #[arg(long, help_heading = "Run Options", default_value = "100")]
    #[config(default = 100)]
    pub log_interval: usize,
}

/// Adversarial target and surrogate selection.
#[derive(Config, Debug, Args)]
#[command(rename_all = "snake_case")]
pub struct AttackOptions {
    /// Target class index in [0, 999], or `random`.
    #[arg(long, help_heading = "Attack Options", default_value = "random")]
    #[config(default = "String::from(\"random\")")]
    pub target_label: String,

    /// Surrogate model: resnet, densenet or yolov8.
    #[arg(long, help_heading = "Attack Options", default_value = "resnet")]
    #[config(default = "String::from(\"resnet\")")]
    pub surrogate_model: String,

    /// Background image or directory of images (task 2).
    #[arg(long, help_heading = "Attack Options")]
    pub back_file: Option<String>,

    /// Number of detector classes.
    #[arg(long, help_heading = "Attack Options", default_value = "80")]
    #[config(default = 80)]
    pub nc: usize,

    /// 1: object on a plain background, 2: object composited over background images.
    #[arg(long, help_heading = "Attack Options", default_value = "1")]
    #[config(default = 1)]
    pub task: u32,

    /// JSON array of the 1000 ImageNet class names.
    #[arg(
        long,
        help_heading = "Attack Options",
        default_value = "dataset/imagenet-simple-labels.json"
    )]
    #[config(default = "String::from(\"dataset/imagenet-simple-labels.json\")")]
    pub labels: String,

    /// Directory holding the classifier records.
    #[arg(long, help_heading = "Attack Options", default_value = "pretrained")]
    #[config(default = "String::from(\"pretrained\")")]
    pub surrogate_dir: String,

    /// Detector record path, without extension.
    #[arg(long, help_heading = "Attack Options", default_value = "v8s_55e_last")]
    #[config(default = "String::from(\"v8s_55e_last\")")]
    pub yolo_checkpoint: String,

    /// Weight of the adversarial cross-entropy term.
    #[arg(long, help_heading = "Attack Options", default_value = "1.0")]
    #[config(default = 1.0)]
    pub lambda_adv: f32,

    /// Side length of the full-image render fed to the surrogate.
    #[arg(long, help_heading = "Attack Options", default_value = "64")]
    #[config(default = 64)]
    pub adv_reso: usize,
}

/// Dataset loading and scene normalization.
#[derive(Config, Debug, Args)]
#[command(rename_all = "snake_case")]
pub struct DatasetOptions {
    /// Dataset layout.
    #[arg(long, help_heading = "Dataset Options", value_enum, default_value_t = DataFormat::Nerf)]
    #[config(default = "DataFormat::Nerf")]
    pub data_format: DataFormat,

    /// Splits used for training.
    #[arg(long, help_heading = "Dataset Options", value_enum, default_value_t = TrainSplit::Train)]
    #[config(default = "TrainSplit::Train")]
    pub train_split: TrainSplit,

    /// Keep every image in memory up front.
    #[arg(long, help_heading = "Dataset Options")]
    #[config(default = false)]
    pub preload: bool,

    /// Draw each ray from a random image instead of one image per step.
    #[arg(long, help_heading = "Dataset Options")]
    #[config(default = false)]
    pub random_image_batch: bool,

    /// Image downscale factor.
    #[arg(long, help_heading = "Dataset Options", default_value = "2")]
    #[config(default = 2)]
    pub downscale: u32,

    /// Scene half-extent; the scene lives in [-bound, bound]^3.
    #[arg(long, help_heading = "Dataset Options", default_value = "2")]
    #[config(default = 2.0)]
    pub bound: f32,

    /// Camera position scale; negative derives it from the camera distances.
    #[arg(long, help_heading = "Dataset Options", default_value = "-1", allow_hyphen_values = true)]
    #[config(default = -1.0)]
    pub scale: f32,

    /// Camera position offset.
    #[arg(
        long,
        help_heading = "Dataset Options",
        num_args = 3,
        default_values_t = [0.0, 0.0, 0.0],
        allow_hyphen_values = true
    )]
    #[config(default = "vec![0.0, 0.0, 0.0]")]
    pub offset: Vec<f32>,

    /// Initial mesh for stage 1; empty uses the stage 0 export.
    #[arg(long, help_heading = "Dataset Options", default_value = "")]
    #[config(default = "String::new()")]
    pub mesh: String,

    /// Use per-camera near/far planes.
    #[arg(long, help_heading = "Dataset Options")]
    #[config(default = false)]
    pub enable_cam_near_far: bool,

    /// Recenter the scene on the camera centroid.
    #[arg(long, help_heading = "Dataset Options")]
    #[config(default = false)]
    pub enable_cam_center: bool,

    /// Minimum ray near distance.
    #[arg(long, help_heading = "Dataset Options", default_value = "0.05")]
    #[config(default = 0.05)]
    pub min_near: f32,

    /// Supervise with sparse COLMAP depth.
    #[arg(long, help_heading = "Dataset Options")]
    #[config(default = false)]
    pub enable_sparse_depth: bool,

    /// Supervise with dense depth maps.
    #[arg(long, help_heading = "Dataset Options")]
    #[config(default = false)]
    pub enable_dense_depth: bool,
}

/// Optimization budget and ray marching.
#[derive(Config, Debug, Args)]
#[command(rename_all = "snake_case")]
pub struct TrainingOptions {
    /// Total training iterations.
    #[arg(long, help_heading = "Training Options", default_value = "20000")]
    #[config(default = 20000)]
    pub iters: usize,

    /// Initial learning rate of the field.
    #[arg(long, help_heading = "Training Options", default_value = "0.01")]
    #[config(default = 1e-2)]
    pub lr: f64,

    /// Learning rate of mesh vertex offsets (stage 1).
    #[arg(long, help_heading = "Training Options", default_value = "0.0001")]
    #[config(default = 1e-4)]
    pub lr_vert: f64,

    /// Gradient multiplier for vertex positions (stage 1).
    #[arg(long, help_heading = "Training Options", default_value = "1")]
    #[config(default = 1.0)]
    pub pos_gradient_boost: f32,

    /// Occupancy-accelerated ray marching (always enabled).
    #[arg(long, help_heading = "Training Options")]
    #[config(default = false)]
    pub cuda_ray: bool,

    /// Maximum samples per ray.
    #[arg(long, help_heading = "Training Options", default_value = "1024")]
    #[config(default = 1024)]
    pub max_steps: usize,

    /// Steps between occupancy grid updates.
    #[arg(long, help_heading = "Training Options", default_value = "16")]
    #[config(default = 16)]
    pub update_extra_interval: usize,

    /// Rays rendered per chunk at evaluation time.
    #[arg(long, help_heading = "Training Options", default_value = "4096")]
    #[config(default = 4096)]
    pub max_ray_batch: usize,

    /// Occupancy grid resolution.
    #[arg(long, help_heading = "Training Options", default_value = "128")]
    #[config(default = 128)]
    pub grid_size: usize,

    /// Mark grid cells that no training camera sees.
    #[arg(long, help_heading = "Training Options")]
    #[config(default = false)]
    pub mark_untrained: bool,

    /// Step growth with distance; 0 for uniform steps.
    #[arg(long, help_heading = "Training Options", default_value = "0.00390625")]
    #[config(default = "1.0 / 256.0")]
    pub dt_gamma: f32,

    /// Occupancy threshold and surface density level.
    #[arg(long, help_heading = "Training Options", default_value = "10")]
    #[config(default = 10.0)]
    pub density_thresh: f32,

    /// Steps trained with the diffuse color only.
    #[arg(long, help_heading = "Training Options", default_value = "1000")]
    #[config(default = 1000)]
    pub diffuse_step: usize,

    /// Never enable the specular head.
    #[arg(long, help_heading = "Training Options")]
    #[config(default = false)]
    pub diffuse_only: bool,

    /// Background behind the object.
    #[arg(long, help_heading = "Training Options", value_enum, default_value_t = Background::White)]
    #[config(default = "Background::White")]
    pub background: Background,

    /// Let stage 1 gradients reach the field offsets.
    #[arg(long, help_heading = "Training Options")]
    #[config(default = false)]
    pub enable_offset_nerf_grad: bool,

    /// Number of evaluations over the run.
    #[arg(long, help_heading = "Training Options", default_value = "5")]
    #[config(default = 5)]
    pub n_eval: usize,

    /// Number of checkpoints over the run.
    #[arg(long, help_heading = "Training Options", default_value = "50")]
    #[config(default = 50)]
    pub n_ckpt: usize,

    /// Rays per training step.
    #[arg(long, help_heading = "Training Options", default_value = "4096")]
    #[config(default = 4096)]
    pub num_rays: usize,

    /// Adapt the ray count to keep the sample budget constant.
    #[arg(long, help_heading = "Training Options")]
    #[config(default = false)]
    pub adaptive_num_rays: bool,

    /// Target number of samples per step when adapting the ray count.
    #[arg(long, help_heading = "Training Options", default_value = "262144")]
    #[config(default = 262144)]
    pub num_points: usize,
}

/// Loss weights of stage 0.
#[derive(Config, Debug, Args)]
#[command(rename_all = "snake_case")]
pub struct Stage0Weights {
    /// Density regularization.
    #[arg(long, help_heading = "Stage 0 Loss", default_value = "0")]
    #[config(default = 0.0)]
    pub lambda_density: f32,

    /// Opacity entropy.
    #[arg(long, help_heading = "Stage 0 Loss", default_value = "0")]
    #[config(default = 0.0)]
    pub lambda_entropy: f32,

    /// Total variation of the density field.
    #[arg(long, help_heading = "Stage 0 Loss", default_value = "1e-8")]
    #[config(default = 1e-8)]
    pub lambda_tv: f32,

    /// Depth supervision.
    #[arg(long, help_heading = "Stage 0 Loss", default_value = "0.1")]
    #[config(default = 0.1)]
    pub lambda_depth: f32,

    /// Specular magnitude.
    #[arg(long, help_heading = "Stage 0 Loss", default_value = "1e-5")]
    #[config(default = 1e-5)]
    pub lambda_specular: f32,

    /// Eikonal term (SDF mode).
    #[arg(long, help_heading = "Stage 0 Loss", default_value = "0.1")]
    #[config(default = 0.1)]
    pub lambda_eikonal: f32,

    /// Photometric reconstruction.
    #[arg(long, help_heading = "Stage 0 Loss", default_value = "1")]
    #[config(default = 1.0)]
    pub lambda_rgb: f32,

    /// Alpha mask.
    #[arg(long, help_heading = "Stage 0 Loss", default_value = "0.1")]
    #[config(default = 0.1)]
    pub lambda_mask: f32,
}

/// Loss weights of stage 1.
#[derive(Config, Debug, Args)]
#[command(rename_all = "snake_case")]
pub struct Stage1Weights {
    /// Disable every smoothness term.
    #[arg(long, help_heading = "Stage 1 Loss")]
    #[config(default = false)]
    pub wo_smooth: bool,

    /// Perceptual loss.
    #[arg(long, help_heading = "Stage 1 Loss", default_value = "0")]
    #[config(default = 0.0)]
    pub lambda_lpips: f32,

    /// Vertex offset magnitude.
    #[arg(long, help_heading = "Stage 1 Loss", default_value = "0.1")]
    #[config(default = 0.1)]
    pub lambda_offsets: f32,

    /// Mesh Laplacian.
    #[arg(long, help_heading = "Stage 1 Loss", default_value = "0.001")]
    #[config(default = 0.001)]
    pub lambda_lap: f32,

    /// Normal consistency.
    #[arg(long, help_heading = "Stage 1 Loss", default_value = "0")]
    #[config(default = 0.0)]
    pub lambda_normal: f32,

    /// Edge length.
    #[arg(long, help_heading = "Stage 1 Loss", default_value = "0")]
    #[config(default = 0.0)]
    pub lambda_edgelen: f32,

    /// Chamfer distance to the stage 0 surface.
    #[arg(long, help_heading = "Stage 1 Loss", default_value = "3000")]
    #[config(default = 3000.0)]
    pub lambda_cd: f32,
}

/// Less common switches.
#[derive(Config, Debug, Args)]
#[command(rename_all = "snake_case")]
pub struct ExperimentalOptions {
    /// Contract the unbounded scene into [-2, 2]^3.
    #[arg(long, help_heading = "Experimental Options")]
    #[config(default = false)]
    pub contract: bool,

    /// Square patch size for ray sampling.
    #[arg(long, help_heading = "Experimental Options", default_value = "1")]
    #[config(default = 1)]
    pub patch_size: usize,

    /// Learn the occupancy grid instead of estimating it.
    #[arg(long, help_heading = "Experimental Options")]
    #[config(default = false)]
    pub trainable_density_grid: bool,

    /// Color space of the targets.
    #[arg(long, help_heading = "Experimental Options", value_enum, default_value_t = ColorSpace::Srgb)]
    #[config(default = "ColorSpace::Srgb")]
    pub color_space: ColorSpace,

    /// Per-image appearance embedding size; 0 disables it.
    #[arg(long, help_heading = "Experimental Options", default_value = "0")]
    #[config(default = 0)]
    pub ind_dim: usize,

    /// Capacity of the per-image embedding table.
    #[arg(long, help_heading = "Experimental Options", default_value = "500")]
    #[config(default = 500)]
    pub ind_num: usize,
}

/// Surface extraction and cleanup.
#[derive(Config, Debug, Args)]
#[command(rename_all = "snake_case")]
pub struct MeshOptions {
    /// Isosurface lattice resolution.
    #[arg(long, help_heading = "Mesh Options", default_value = "512")]
    #[config(default = 512)]
    pub mcubes_reso: usize,

    /// Lattice resolution used for the contracted background region.
    #[arg(long, help_heading = "Mesh Options", default_value = "256")]
    #[config(default = 256)]
    pub env_reso: usize,

    /// Target face count after decimation.
    #[arg(long, help_heading = "Mesh Options", default_value = "300000")]
    #[config(default = 3e5)]
    pub decimate_target: f64,

    /// Drop faces no training camera sees.
    #[arg(long, help_heading = "Mesh Options")]
    #[config(default = false)]
    pub mesh_visibility_culling: bool,

    /// Visibility margin in pixels.
    #[arg(long, help_heading = "Mesh Options", default_value = "5")]
    #[config(default = 5)]
    pub visibility_mask_dilation: usize,

    /// Minimum faces per kept component.
    #[arg(long, help_heading = "Mesh Options", default_value = "8")]
    #[config(default = 8)]
    pub clean_min_f: usize,

    /// Minimum component diameter, percent of the mesh diagonal.
    #[arg(long, help_heading = "Mesh Options", default_value = "5")]
    #[config(default = 5.0)]
    pub clean_min_d: f32,
}

/// Texture baking and stage 1 refinement.
#[derive(Config, Debug, Args)]
#[command(rename_all = "snake_case")]
pub struct TextureOptions {
    /// Supersampling factor when baking.
    #[arg(long, help_heading = "Texture Options", default_value = "2")]
    #[config(default = 2)]
    pub ssaa: usize,

    /// Texture atlas side length.
    #[arg(long, help_heading = "Texture Options", default_value = "1024")]
    #[config(default = 1024)]
    pub texture_size: usize,

    /// Refine the mesh during stage 1.
    #[arg(long, help_heading = "Texture Options")]
    #[config(default = false)]
    pub refine: bool,

    /// Refinement points as fractions of `iters`.
    #[arg(
        long,
        help_heading = "Texture Options",
        num_args = 1..,
        default_values_t = [0.1, 0.2, 0.3, 0.4, 0.5, 0.7]
    )]
    #[config(default = "vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.7]")]
    pub refine_steps_ratio: Vec<f64>,

    /// Faces with larger error are subdivided.
    #[arg(long, help_heading = "Texture Options", default_value = "0.01")]
    #[config(default = 0.01)]
    pub refine_size: f32,

    /// Fraction of faces decimated per refinement.
    #[arg(long, help_heading = "Texture Options", default_value = "0.1")]
    #[config(default = 0.1)]
    pub refine_decimate_ratio: f32,

    /// Remesh edge length.
    #[arg(long, help_heading = "Texture Options", default_value = "0.02")]
    #[config(default = 0.02)]
    pub refine_remesh_size: f32,

    /// Refinement iterations, derived from `refine_steps_ratio` and `iters`.
    #[arg(skip)]
    #[config(default = "Vec::new()")]
    pub refine_steps: Vec<usize>,
}

/// Viewer options. The viewer itself is not part of this binary.
#[derive(Config, Debug, Args)]
#[command(rename_all = "snake_case")]
pub struct GuiOptions {
    /// Visualize the training poses.
    #[arg(long, help_heading = "GUI Options")]
    #[config(default = false)]
    pub vis_pose: bool,

    /// Start the interactive viewer.
    #[arg(long, help_heading = "GUI Options")]
    #[config(default = false)]
    pub gui: bool,

    /// Viewer and orbit-camera width.
    #[arg(long = "W", help_heading = "GUI Options", default_value = "1000")]
    #[config(default = 1000)]
    pub w: usize,

    /// Viewer and orbit-camera height.
    #[arg(long = "H", help_heading = "GUI Options", default_value = "1000")]
    #[config(default = 1000)]
    pub h: usize,

    /// Orbit radius.
    #[arg(long, help_heading = "GUI Options", default_value = "5")]
    #[config(default = 5.0)]
    pub radius: f32,

    /// Vertical field of view in degrees.
    #[arg(long, help_heading = "GUI Options", default_value = "50")]
    #[config(default = 50.0)]
    pub fovy: f32,

    /// Samples per pixel accumulated by the viewer.
    #[arg(long, help_heading = "GUI Options", default_value = "1")]
    #[config(default = 1)]
    pub max_spp: usize,
}

/// The full option set.
#[derive(Config, Debug, Args)]
pub struct Options {
    /// Run control.
    #[command(flatten)]
    pub run: RunOptions,

    /// Attack target and surrogate.
    #[command(flatten)]
    #[config(default = "AttackOptions::new()")]
    pub attack: AttackOptions,

    /// Dataset.
    #[command(flatten)]
    #[config(default = "DatasetOptions::new()")]
    pub dataset: DatasetOptions,

    /// Training budget.
    #[command(flatten)]
    #[config(default = "TrainingOptions::new()")]
    pub training: TrainingOptions,

    /// Stage 0 loss weights.
    #[command(flatten)]
    #[config(default = "Stage0Weights::new()")]
    pub stage0: Stage0Weights,

    /// Stage 1 loss weights.
    #[command(flatten)]
    #[config(default = "Stage1Weights::new()")]
    pub stage1: Stage1Weights,

    /// Experimental switches.
    #[command(flatten)]
    #[config(default = "ExperimentalOptions::new()")]
    pub experimental: ExperimentalOptions,

    /// Mesh extraction.
    #[command(flatten)]
    #[config(default = "MeshOptions::new()")]
    pub mesh: MeshOptions,

    /// Texture baking.
    #[command(flatten)]
    #[config(default = "TextureOptions::new()")]
    pub texture: TextureOptions,

    /// Viewer.
    #[command(flatten)]
    #[config(default = "GuiOptions::new()")]
    pub gui: GuiOptions,
}

impl Options {
    /// Path of the saved option file inside the workspace.
    pub fn options_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.run.workspace).join("options.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::new(RunOptions::new("data/lego".to_string()));
        assert_eq!(options.run.workspace, "workspace");
        assert_eq!(options.run.ckpt, "latest");
        assert_eq!(options.attack.target_label, "random");
        assert_eq!(options.attack.surrogate_model, "resnet");
        assert_eq!(options.attack.back_file, None);
        assert_eq!(options.dataset.offset, vec![0.0, 0.0, 0.0]);
        assert_eq!(options.dataset.scale, -1.0);
        assert_eq!(options.training.iters, 20000);
        assert!((options.training.dt_gamma - 1.0 / 256.0).abs() < 1e-9);
        assert_eq!(options.texture.refine_steps_ratio.len(), 6);
        assert!(options.texture.refine_steps.is_empty());
        assert_eq!(options.gui.w, 1000);
    }

    #[test]
    fn test_options_serialize_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        let options = Options::new(RunOptions::new("data/lego".to_string()).with_seed(7))
            .with_training(TrainingOptions::new().with_iters(300));
        options.save(&path).unwrap();

        let loaded = Options::load(&path).unwrap();
        assert_eq!(loaded.run.seed, 7);
        assert_eq!(loaded.training.iters, 300);
        assert_eq!(loaded.dataset.data_format, DataFormat::Nerf);
    }
}
