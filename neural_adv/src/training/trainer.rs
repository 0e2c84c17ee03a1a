//! Attack trainer: optimizes the radiance field against the surrogate.
//!
//! One step renders a ray batch for the photometric terms plus a full low-resolution view
//! of the same frame for the surrogate, sums every term and takes an Adam step. Stage 0
//! trains the whole field and keeps an exponential moving average for evaluation; stage 1
//! freezes the geometry and only adapts appearance.

use std::fs;
use std::path::PathBuf;

use adv_core::{
    uncontract_linf, Aabb, Cadence, DensityGrid, PinholeCamera, Point3, Ray, TriangleMesh,
};
use adv_io::{save_png, FloatImage, TexturedExport};
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{Options, Stage0Weights};
use crate::data::{RayBatch, RayLoader, SceneDataset};
use crate::error::{NeuralAdvError, Result};
use crate::export::{write_mesh, MeshExtractor, TextureBaker};
use crate::loss::{combine, AdversarialLoss, LossTerm, NerfLoss};
use crate::nn::{NerfNetwork, Shading};
use crate::render::{RaySampler, VolumeRenderer};
use crate::surrogate::SurrogatePipeline;
use crate::target::TargetClass;

use super::checkpoint::{
    load_checkpoint, save_checkpoint, CheckpointManager, CheckpointMetadata, CheckpointPolicy,
};
use super::ema::{ParamEma, EMA_DECAY};
use super::metrics::{EvalSample, Meter, MetricsTracker, TrainMetrics};
use super::optimizer::{LrSchedule, OptimizerFactory, TrainingState};

/// Decay applied to the occupancy grid at every refresh.
const GRID_DECAY: f32 = 0.95;

/// Points per network query while refreshing the grid.
const GRID_CHUNK: usize = 1 << 16;

/// Random points per step for the eikonal term.
const EIKONAL_POINTS: usize = 1024;

/// Window of the running loss average.
const LOSS_WINDOW: usize = 100;

/// Operations the driver needs from a trainer.
pub trait Trainer {
    /// Resume according to `policy`; true if a checkpoint was loaded.
    fn restore(&mut self, policy: &CheckpointPolicy) -> Result<bool>;

    /// Run the optimization loop up to the configured number of epochs.
    fn train(&mut self, train: &mut RayLoader, valid: Option<&RayLoader>) -> Result<()>;

    /// Render every frame of `loader`, update the meters and return their values.
    fn evaluate(&mut self, loader: &RayLoader, name: Option<&str>) -> Result<EvalReport>;

    /// Render every frame of `loader` into `results/`; returns the frames written.
    fn test(&mut self, loader: &RayLoader, write_video: bool) -> Result<usize>;

    /// Extract the surface and write `mesh/mesh.obj`.
    fn save_mesh(
        &mut self,
        resolution: usize,
        decimate_target: usize,
        visibility: Option<&SceneDataset>,
    ) -> Result<PathBuf>;

    /// Extract the surface, bake its texture and write `mesh/mesh_stage1.*`.
    fn export_stage1(&mut self, texture_size: usize) -> Result<TexturedExport>;

    /// Replace the evaluation meters.
    fn set_metrics(&mut self, meters: Vec<Box<dyn Meter>>);
}

/// Meter values of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalReport {
    /// `(meter name, value)` in meter order.
    pub values: Vec<(&'static str, Option<f32>)>,
}

impl EvalReport {
    /// Value of the meter called `name`.
    pub fn get(&self, name: &str) -> Option<f32> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, v)| *v)
    }
}

/// Scalar knobs the trainer reads from the option set.
#[derive(Debug, Clone)]
pub struct TrainerSettings {
    /// Training stage.
    pub stage: u32,
    /// Output root.
    pub workspace: PathBuf,
    /// Total optimizer steps.
    pub iters: usize,
    /// Steps between grid refreshes.
    pub update_extra_interval: usize,
    /// Steps before the specular head is enabled.
    pub diffuse_step: usize,
    /// Never enable the specular head.
    pub diffuse_only: bool,
    /// Unlock positional bands progressively.
    pub progressive_level: bool,
    /// Steps between progress lines.
    pub log_interval: usize,
    /// Side of the view fed to the surrogate.
    pub adv_reso: usize,
    /// Weight of the adversarial term.
    pub lambda_adv: f32,
    /// Contracted scene.
    pub contract: bool,
    /// Scene half-extent.
    pub bound: f32,
    /// Keep an occupancy grid of this resolution.
    pub grid_size: usize,
    /// Occupancy threshold.
    pub density_thresh: f32,
    /// Texture supersampling.
    pub ssaa: usize,
    /// Lattice resolution for stage 1 export.
    pub mcubes_reso: usize,
    /// Face budget for stage 1 export.
    pub decimate_target: usize,
    /// Refine the stage 1 surface during training.
    pub refine: bool,
    /// Steps at which the stage 1 surface is refined.
    pub refine_steps: Vec<usize>,
    /// Fraction of faces removed per refinement.
    pub refine_decimate_ratio: f32,
    /// Seed of the trainer's RNG.
    pub seed: u64,
}

impl TrainerSettings {
    /// Settings of a normalized option set.
    pub fn from_options(options: &Options) -> Self {
        Self {
            stage: options.run.stage,
            workspace: PathBuf::from(&options.run.workspace),
            iters: options.training.iters,
            update_extra_interval: options.training.update_extra_interval.max(1),
            diffuse_step: options.training.diffuse_step,
            diffuse_only: options.training.diffuse_only,
            progressive_level: options.run.progressive_level,
            log_interval: options.run.log_interval.max(1),
            adv_reso: options.attack.adv_reso.max(1),
            lambda_adv: options.attack.lambda_adv,
            contract: options.experimental.contract,
            bound: options.dataset.bound,
            grid_size: options.training.grid_size,
            density_thresh: options.training.density_thresh,
            ssaa: options.texture.ssaa,
            mcubes_reso: options.mesh.mcubes_reso,
            decimate_target: options.mesh.decimate_target.max(0.0) as usize,
            refine: options.texture.refine,
            refine_steps: options.texture.refine_steps.clone(),
            refine_decimate_ratio: options.texture.refine_decimate_ratio.clamp(0.0, 1.0),
            seed: options.run.seed,
        }
    }

    /// Refinements due by `step`.
    pub fn refine_passes(&self, step: usize) -> usize {
        if self.stage != 1 || !self.refine {
            return 0;
        }
        self.refine_steps.iter().filter(|&&s| s > 0 && s <= step).count()
    }

    /// Checkpoint directory of `stage`.
    pub fn checkpoint_dir(&self, stage: u32) -> PathBuf {
        self.workspace.join("checkpoints").join(format!("stage{}", stage))
    }
}

/// Everything the trainer is built from.
pub struct TrainerInputs<B: AutodiffBackend, F, S> {
    /// Trainable network.
    pub model: NerfNetwork<B>,
    /// Frozen clean reference.
    pub model2: NerfNetwork<B::InnerBackend>,
    /// Frozen surrogate.
    pub surrogate: SurrogatePipeline<B>,
    /// Adversarial target.
    pub target: TargetClass,
    /// Builds the optimizer (again when a checkpoint is loaded).
    pub optimizer_factory: F,
    /// Learning rate per step.
    pub schedule: S,
    /// Epoch cadence.
    pub cadence: Cadence,
}

/// Reference [`Trainer`] for both stages.
pub struct AttackTrainer<B: AutodiffBackend, F: OptimizerFactory<B>, S: LrSchedule> {
    model: NerfNetwork<B>,
    model2: NerfNetwork<B::InnerBackend>,
    ema: Option<ParamEma<B::InnerBackend>>,
    optimizer_factory: F,
    optimizer: F::Optimizer,
    schedule: S,
    surrogate: SurrogatePipeline<B>,
    target: TargetClass,
    nerf_loss: NerfLoss,
    adversarial: AdversarialLoss,
    renderer: VolumeRenderer,
    grid: Option<DensityGrid>,
    cadence: Cadence,
    checkpoints: CheckpointManager,
    mesh: MeshExtractor,
    surface: Option<TriangleMesh>,
    settings: TrainerSettings,
    state: TrainingState,
    tracker: MetricsTracker,
    meters: Vec<Box<dyn Meter>>,
    rng: StdRng,
    name: String,
    device: B::Device,
}

impl<B, F, S> AttackTrainer<B, F, S>
where
    B: AutodiffBackend,
    F: OptimizerFactory<B>,
    S: LrSchedule,
{
    /// Build a trainer for a normalized option set.
    pub fn new(inputs: TrainerInputs<B, F, S>, options: &Options, device: &B::Device) -> Result<Self> {
        let settings = TrainerSettings::from_options(options);

        // Stage 1 keeps the reconstruction term only; the field regularizers act on geometry
        let weights = if settings.stage == 0 {
            options.stage0.clone()
        } else {
            Stage0Weights::new()
                .with_lambda_rgb(options.stage0.lambda_rgb)
                .with_lambda_mask(0.0)
                .with_lambda_tv(0.0)
                .with_lambda_specular(0.0)
                .with_lambda_eikonal(0.0)
                .with_lambda_density(0.0)
                .with_lambda_entropy(0.0)
        };

        let grid = if settings.grid_size >= 2 {
            let bounds = if settings.contract {
                Aabb::cube(2.0)
            } else {
                Aabb::cube(settings.bound)
            };
            Some(DensityGrid::new(settings.grid_size, bounds)?.with_threshold(settings.density_thresh))
        } else {
            None
        };

        let ema = (settings.stage == 0).then(|| ParamEma::new(inputs.model.valid(), EMA_DECAY));
        let optimizer = inputs.optimizer_factory.build();
        let mesh = MeshExtractor::from_options(options, settings.mcubes_reso, settings.decimate_target);

        log::info!(
            "Trainer stage {}: target {}, {} epochs (save every {}, eval every {})",
            settings.stage,
            inputs.target,
            inputs.cadence.max_epoch,
            inputs.cadence.save_interval,
            inputs.cadence.eval_interval
        );

        Ok(Self {
            model: inputs.model,
            model2: inputs.model2,
            ema,
            optimizer_factory: inputs.optimizer_factory,
            optimizer,
            schedule: inputs.schedule,
            adversarial: AdversarialLoss::new(inputs.target.index, settings.lambda_adv),
            surrogate: inputs.surrogate,
            target: inputs.target,
            nerf_loss: NerfLoss::new(weights),
            renderer: VolumeRenderer::new(RaySampler::from_options(options), options.training.max_ray_batch),
            grid,
            cadence: inputs.cadence,
            checkpoints: CheckpointManager::new(settings.checkpoint_dir(settings.stage)),
            mesh,
            surface: None,
            state: TrainingState::new(),
            tracker: MetricsTracker::new(LOSS_WINDOW),
            meters: Vec::new(),
            rng: StdRng::seed_from_u64(settings.seed),
            name: format!("nerf_adv_stage{}", settings.stage),
            settings,
            device: device.clone(),
        })
    }

    /// Training progress.
    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// The adversarial target.
    pub fn target(&self) -> &TargetClass {
        &self.target
    }

    /// The trainable network.
    pub fn model(&self) -> &NerfNetwork<B> {
        &self.model
    }

    /// The occupancy grid, if one is kept.
    pub fn grid(&self) -> Option<&DensityGrid> {
        self.grid.as_ref()
    }

    /// Faces of the refined stage 1 surface, once a refinement ran.
    pub fn surface_faces(&self) -> Option<usize> {
        self.surface.as_ref().map(TriangleMesh::num_faces)
    }

    /// Exclude grid cells no training camera sees; returns the number of cells marked.
    pub fn mark_untrained(&mut self, cameras: &[PinholeCamera]) -> usize {
        let contract = self.settings.contract;
        match self.grid.as_mut() {
            Some(grid) => {
                let marked = grid.mark_untrained(cameras, |p| if contract { uncontract_linf(p) } else { p });
                log::info!("Marked {} of {} grid cells untrained", marked, grid.num_cells());
                marked
            }
            None => 0,
        }
    }

    /// Network used for evaluation and export: the average in stage 0.
    fn eval_model(&self) -> NerfNetwork<B::InnerBackend> {
        match &self.ema {
            Some(ema) => ema.model().clone(),
            None => self.model.valid(),
        }
    }

    /// Field query options at `step`.
    fn shading(&self, step: usize) -> Shading {
        let bands = self.model.num_bands();
        let active_bands = if self.settings.progressive_level {
            let ramp = (self.settings.iters / 2).max(1);
            (1 + (bands.saturating_sub(1) * step) / ramp).min(bands)
        } else {
            usize::MAX
        };
        Shading {
            active_bands,
            specular: !self.settings.diffuse_only && step >= self.settings.diffuse_step,
            image_index: None,
            geometry_grad: self.settings.stage == 0,
        }
    }

    /// Refresh the occupancy grid from the current densities.
    fn update_grid(&mut self) -> Result<()> {
        let Some(grid) = self.grid.as_mut() else {
            return Ok(());
        };
        let contract = self.settings.contract;
        let points: Vec<Point3> = (0..grid.num_cells())
            .map(|idx| {
                let jitter = Point3::new(
                    self.rng.gen::<f32>() - 0.5,
                    self.rng.gen::<f32>() - 0.5,
                    self.rng.gen::<f32>() - 0.5,
                );
                let p = grid.cell_point(idx, jitter);
                if contract {
                    uncontract_linf(p)
                } else {
                    p
                }
            })
            .collect();
        let densities = self.model.valid().density_at(&points, GRID_CHUNK, &self.device)?;
        grid.apply_update(GRID_DECAY, &densities)?;
        log::debug!(
            "Grid refreshed: mean density {:.4}, occupancy {:.3}",
            grid.mean_density(),
            grid.occupancy_ratio()
        );
        Ok(())
    }

    /// Stage 1 surface after `passes` refinements.
    ///
    /// Geometry is frozen in stage 1, so every pass decimates the extracted surface again.
    fn refined_surface(&self, passes: usize) -> Result<TriangleMesh> {
        let model = self.eval_model();
        let mut mesh = self.mesh.extract(&model, None, &self.device)?;
        let keep = 1.0 - self.settings.refine_decimate_ratio;
        if keep < 1.0 {
            for _ in 0..passes {
                let target = ((mesh.num_faces() as f32 * keep).round() as usize).max(1);
                mesh.decimate(target);
            }
        }
        Ok(mesh)
    }

    /// Refine the stage 1 surface if `step` is a refinement step.
    fn maybe_refine(&mut self, step: usize) -> Result<()> {
        if self.settings.refine_passes(step) == 0 || !self.settings.refine_steps.contains(&step) {
            return Ok(());
        }
        let passes = self.settings.refine_passes(step);
        let mesh = self.refined_surface(passes)?;
        log::info!(
            "Refined surface at step {} (pass {}): {} faces, {} vertices",
            step,
            passes,
            mesh.num_faces(),
            mesh.num_vertices()
        );
        self.surface = Some(mesh);
        Ok(())
    }

    /// Rays of a square `adv_reso` view of `camera`.
    fn adversarial_rays(&self, camera: &PinholeCamera) -> (PinholeCamera, Vec<Ray>) {
        let r = self.settings.adv_reso;
        let camera = camera.resized(r, r);
        let rays = (0..r)
            .flat_map(|y| (0..r).map(move |x| camera.pixel_ray(x, y)))
            .collect();
        (camera, rays)
    }

    /// Adversarial term on a differentiable render of `frame`.
    fn adversarial_term(
        &self,
        dataset: &SceneDataset,
        frame: usize,
        shading: Shading,
    ) -> Tensor<B, 1> {
        let r = self.settings.adv_reso;
        let (_, rays) = self.adversarial_rays(&dataset.cameras[frame]);
        let background = adversarial_background(dataset, frame, r);
        let background = Tensor::<B, 1>::from_floats(background.data.as_slice(), &self.device).reshape([r * r, 3]);
        let out = self
            .renderer
            .render(&self.model, &rays, self.grid.as_ref(), None, shading, background);
        let image = out.image.reshape([1, r, r, 3]).swap_dims(1, 3).swap_dims(2, 3);
        self.adversarial.forward(self.surrogate.forward(image))
    }

    /// Surrogate predictions on the clean reference and on the attacked field.
    fn classify_views(
        &self,
        model: &NerfNetwork<B::InnerBackend>,
        dataset: &SceneDataset,
        frame: usize,
        shading: Shading,
    ) -> Result<(usize, usize)> {
        let r = self.settings.adv_reso;
        let (camera, _) = self.adversarial_rays(&dataset.cameras[frame]);
        let background = adversarial_background(dataset, frame, r);
        let clean = self.renderer.render_image(
            &self.model2,
            &camera,
            self.grid.as_ref(),
            Some(&background),
            shading,
            &self.device,
        )?;
        let attacked =
            self.renderer
                .render_image(model, &camera, self.grid.as_ref(), Some(&background), shading, &self.device)?;
        let batch = Tensor::cat(
            vec![
                image_tensor::<B>(&clean.image, &self.device),
                image_tensor::<B>(&attacked.image, &self.device),
            ],
            0,
        );
        let classes = self.surrogate.predict(batch)?;
        match classes.as_slice() {
            [clean, attacked] => Ok((*clean, *attacked)),
            _ => Err(NeuralAdvError::training("surrogate returned an unexpected batch size")),
        }
    }

    /// One optimizer step on `frame`.
    fn train_step(&mut self, loader: &RayLoader, frame: usize) -> Result<TrainMetrics> {
        let step = self.state.global_step;
        let shading = self.shading(step);
        let batch = loader.batch(frame, &mut self.rng);
        let n = batch.len();
        if n == 0 {
            return Err(NeuralAdvError::training("empty ray batch"));
        }

        let jitters: Vec<f32> = (0..n).map(|_| self.rng.gen()).collect();
        let (background, gt_rgb, gt_alpha) = batch_tensors::<B>(&batch, &self.device);
        let render = self.renderer.render(
            &self.model,
            &batch.rays,
            self.grid.as_ref(),
            Some(&jitters),
            shading,
            background,
        );
        let num_samples = render.num_samples;

        let eikonal_points = self.model.is_sdf().then(|| {
            let bound = self.settings.bound;
            let values: Vec<f32> = (0..EIKONAL_POINTS * 3)
                .map(|_| self.rng.gen_range(-bound..bound))
                .collect();
            Tensor::<B, 1>::from_floats(values.as_slice(), &self.device).reshape([EIKONAL_POINTS, 3])
        });
        let gt_alpha = loader.has_gt().then_some(gt_alpha);
        let mut terms = self
            .nerf_loss
            .compute(&self.model, &render, gt_rgb, gt_alpha, eikonal_points);
        if self.adversarial.weight() > 0.0 {
            terms.push((
                LossTerm::Adversarial,
                self.adversarial_term(loader.dataset(), frame, shading),
            ));
        }
        let (total, breakdown) = combine(terms)?;
        if !breakdown.total.is_finite() {
            return Err(NeuralAdvError::training(format!(
                "loss became non-finite at step {}: {}",
                step, breakdown
            )));
        }

        let lr = self.schedule.lr(step);
        let grads = GradientsParams::from_grads(total.backward(), &self.model);
        self.model = self.optimizer.step(lr, self.model.clone(), grads);

        if let Some(ema) = self.ema.as_mut() {
            ema.update(&self.model.valid());
        }
        self.state.on_step(breakdown.total);
        if self.state.global_step % self.settings.update_extra_interval == 0 {
            self.update_grid()?;
        }
        self.maybe_refine(self.state.global_step)?;

        Ok(TrainMetrics {
            step: self.state.global_step,
            learning_rate: lr,
            loss: breakdown,
            num_rays: n,
            num_samples,
        })
    }

    /// One pass over the training frames.
    fn train_epoch(&mut self, loader: &mut RayLoader) -> Result<()> {
        let order = loader.epoch_order(&mut self.rng);
        for frame in order {
            if self.state.global_step >= self.settings.iters {
                break;
            }
            let metrics = self.train_step(loader, frame)?;
            loader.adapt(metrics.num_samples);
            self.tracker.add(&metrics);
            if metrics.step % self.settings.log_interval == 0 {
                metrics.log(&self.name);
            }
        }
        self.state.on_epoch();
        log::info!(
            "Epoch {}/{} done: step {}, avg loss {:.6}",
            self.state.epoch,
            self.cadence.max_epoch,
            self.state.global_step,
            self.tracker.average_loss()
        );
        Ok(())
    }

    fn metadata(&self) -> CheckpointMetadata {
        CheckpointMetadata::new(
            self.settings.stage,
            self.state.epoch,
            self.state.global_step,
            self.target.index,
        )
        .with_best_psnr(self.state.best_psnr)
        .with_grid_resolution(self.grid.as_ref().map_or(0, DensityGrid::resolution))
    }

    fn save(&self, dir: &std::path::Path) -> Result<()> {
        let ema = self.ema.as_ref().map(|e| e.model());
        let grid = self.grid.as_ref().map(DensityGrid::densities);
        save_checkpoint(dir, &self.model, ema, &self.optimizer, grid, &self.metadata())
    }

    fn mesh_dir(&self) -> PathBuf {
        self.settings.workspace.join("mesh")
    }
}

impl<B, F, S> Trainer for AttackTrainer<B, F, S>
where
    B: AutodiffBackend,
    F: OptimizerFactory<B>,
    S: LrSchedule,
{
    fn restore(&mut self, policy: &CheckpointPolicy) -> Result<bool> {
        let own_dir = self.checkpoints.dir().to_path_buf();
        let mut found = policy.resolve(&[own_dir])?;
        let mut model_only = false;

        // Stage 1 starts from the stage 0 result when it has nothing of its own
        if found.is_none() && self.settings.stage == 1 && policy != &CheckpointPolicy::Scratch {
            found = policy.resolve(&[self.settings.checkpoint_dir(0)])?;
            model_only = found.is_some();
        }
        let Some(dir) = found else {
            log::info!("No checkpoint to resume, training from scratch");
            return Ok(false);
        };

        let restored = load_checkpoint(
            &dir,
            self.model.clone(),
            Some(self.optimizer_factory.build()),
            &self.device,
        )?;
        let from_other_stage = model_only || restored.metadata.stage != self.settings.stage;
        if !from_other_stage && restored.metadata.target != self.target.index {
            return Err(NeuralAdvError::config(format!(
                "checkpoint {} attacks target {}, not {} (keep --target_label or use --ckpt scratch)",
                dir.display(),
                restored.metadata.target,
                self.target
            )));
        }

        self.model = restored.model;
        if from_other_stage {
            // Fresh optimizer and counters; the loaded weights become the clean reference
            self.model2 = self.model.valid();
            if let Some(ema) = self.ema.as_mut() {
                ema.reset(self.model.valid());
            }
            log::info!("Initialized stage {} from {}", self.settings.stage, dir.display());
        } else {
            if let Some(optimizer) = restored.optimizer {
                self.optimizer = optimizer;
            }
            if let Some(ema) = self.ema.as_mut() {
                ema.reset(restored.ema.unwrap_or_else(|| self.model.valid()));
            }
            self.state = TrainingState::resumed(
                restored.metadata.epoch,
                restored.metadata.global_step,
                restored.metadata.best_psnr.unwrap_or(f32::NEG_INFINITY),
            );
        }

        if let (Some(grid), Some(values)) = (self.grid.as_mut(), restored.grid) {
            if restored.metadata.grid_resolution == grid.resolution() {
                grid.restore(&values)?;
            } else {
                log::warn!(
                    "Checkpoint grid resolution {} does not match {}, rebuilding the grid",
                    restored.metadata.grid_resolution,
                    grid.resolution()
                );
            }
        }
        Ok(true)
    }

    fn train(&mut self, train: &mut RayLoader, valid: Option<&RayLoader>) -> Result<()> {
        if train.is_empty() {
            return Err(NeuralAdvError::training("training set is empty"));
        }
        if self.state.global_step == 0 {
            self.update_grid()?;
        }

        let start = self.state.epoch + 1;
        for epoch in start..=self.cadence.max_epoch {
            if self.state.global_step >= self.settings.iters {
                break;
            }
            self.train_epoch(train)?;

            if self.cadence.should_eval(epoch) {
                if let Some(valid) = valid {
                    let report = self.evaluate(valid, None)?;
                    if let Some(psnr) = report.get("PSNR") {
                        if self.state.on_validation(psnr) {
                            log::info!("New best PSNR {:.4} at epoch {}", psnr, epoch);
                            self.save(&self.checkpoints.best_dir())?;
                        }
                    }
                }
            }
            if self.cadence.should_save(epoch) {
                self.save(&self.checkpoints.periodic_dir(epoch))?;
                self.checkpoints.prune()?;
            }
        }

        // Always leave a resumable checkpoint behind
        let last = self.checkpoints.periodic_dir(self.state.epoch);
        if !last.exists() {
            self.save(&last)?;
            self.checkpoints.prune()?;
        }
        log::info!(
            "Training finished after {} steps ({} epochs)",
            self.state.global_step,
            self.state.epoch
        );
        Ok(())
    }

    fn evaluate(&mut self, loader: &RayLoader, name: Option<&str>) -> Result<EvalReport> {
        let dataset = loader.dataset();
        let model = self.eval_model();
        let shading = Shading {
            geometry_grad: false,
            ..self.shading(self.state.global_step)
        };
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("{}_ep{:04}", self.name, self.state.epoch),
        };
        let dir = self.settings.workspace.join("validation");
        fs::create_dir_all(&dir)?;

        for meter in &mut self.meters {
            meter.clear();
        }
        log::info!("Evaluating {} views of the {} split", dataset.len(), dataset.split);
        for (i, camera) in dataset.cameras.iter().enumerate() {
            let view = self.renderer.render_image(
                &model,
                camera,
                self.grid.as_ref(),
                dataset.background(i),
                shading,
                &self.device,
            )?;
            let gt = dataset.composited(i, [1.0; 3]);
            let (clean, attacked) = self.classify_views(&model, dataset, i, shading)?;
            let sample = EvalSample {
                pred: &view.image,
                gt: gt.as_ref(),
                clean_class: Some(clean),
                attacked_class: Some(attacked),
            };
            for meter in &mut self.meters {
                meter.update(&sample);
            }
            save_png(dir.join(format!("{}_{:04}_rgb.png", name, i)), &view.image)?;
        }

        let report = EvalReport {
            values: self.meters.iter().map(|m| (m.name(), m.value())).collect(),
        };
        for meter in &self.meters {
            log::info!("[{}] {}", name, meter.report());
        }
        Ok(report)
    }

    fn test(&mut self, loader: &RayLoader, write_video: bool) -> Result<usize> {
        if !write_video {
            log::info!("Skipping test renders");
            return Ok(0);
        }
        let dataset = loader.dataset();
        let model = self.eval_model();
        let shading = Shading {
            geometry_grad: false,
            ..self.shading(self.state.global_step)
        };
        let dir = self.settings.workspace.join("results");
        fs::create_dir_all(&dir)?;

        for (i, camera) in dataset.cameras.iter().enumerate() {
            let view = self.renderer.render_image(
                &model,
                camera,
                self.grid.as_ref(),
                dataset.background(i),
                shading,
                &self.device,
            )?;
            save_png(dir.join(format!("{}_{:04}_rgb.png", self.name, i)), &view.image)?;
        }
        log::info!("Wrote {} test frames to {}", dataset.len(), dir.display());
        Ok(dataset.len())
    }

    fn save_mesh(
        &mut self,
        resolution: usize,
        decimate_target: usize,
        visibility: Option<&SceneDataset>,
    ) -> Result<PathBuf> {
        let extractor = MeshExtractor {
            resolution,
            decimate_target,
            ..self.mesh.clone()
        };
        let model = self.eval_model();
        let views = visibility.map(|d| d.cameras.as_slice());
        let mesh = extractor.extract(&model, views, &self.device)?;
        let comments = vec![
            format!("stage {}", self.settings.stage),
            format!("target {}", self.target),
            format!("step {}", self.state.global_step),
        ];
        write_mesh(&mesh, &self.mesh_dir(), comments)
    }

    fn export_stage1(&mut self, texture_size: usize) -> Result<TexturedExport> {
        let model = self.eval_model();
        let mesh = match &self.surface {
            Some(mesh) => mesh.clone(),
            None => self.refined_surface(self.settings.refine_passes(self.state.global_step))?,
        };
        if mesh.is_empty() {
            return Err(NeuralAdvError::Export {
                message: "cannot texture an empty mesh".to_string(),
            });
        }
        TextureBaker::new(texture_size, self.settings.ssaa).export(
            &model,
            &mesh,
            &self.mesh_dir(),
            "mesh_stage1",
            &self.device,
        )
    }

    fn set_metrics(&mut self, meters: Vec<Box<dyn Meter>>) {
        self.meters = meters;
    }
}

/// Background of the surrogate view: the frame's own background, or white.
fn adversarial_background(dataset: &SceneDataset, frame: usize, size: usize) -> FloatImage {
    match dataset.background(frame) {
        Some(bg) => bg.to_rgb().resized(size as u32, size as u32),
        None => FloatImage::filled(size as u32, size as u32, 3, 1.0),
    }
}

/// `[1, 3, H, W]` tensor of an image's RGB channels.
fn image_tensor<B: Backend>(image: &FloatImage, device: &B::Device) -> Tensor<B, 4> {
    let rgb = image.to_rgb();
    let (w, h) = (rgb.width as usize, rgb.height as usize);
    Tensor::<B, 1>::from_floats(rgb.data.as_slice(), device)
        .reshape([1, h, w, 3])
        .swap_dims(1, 3)
        .swap_dims(2, 3)
}

/// Background `[R, 3]`, target color `[R, 3]` and target alpha `[R, 1]` of a batch.
fn batch_tensors<B: Backend>(
    batch: &RayBatch,
    device: &B::Device,
) -> (Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>) {
    let n = batch.len();
    let background = Tensor::<B, 1>::from_floats(batch.background.as_slice(), device).reshape([n, 3]);
    let rgb = Tensor::<B, 1>::from_floats(batch.target_rgb.as_slice(), device).reshape([n, 3]);
    let alpha = Tensor::<B, 1>::from_floats(batch.target_alpha.as_slice(), device).reshape([n, 1]);
    (background, rgb, alpha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunOptions;
    use crate::data::{DatasetSplit, SceneDataset};
    use crate::nn::NerfNetworkConfig;
    use crate::surrogate::{classifier_backbone, ConvBackboneConfig, SurrogateKind};
    use crate::training::{AdamFactory, PsnrMeter, WarmupDecayFactory, SchedulerFactory};
    use adv_core::{look_at, Intrinsics};
    use burn::backend::{Autodiff, NdArray};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn options(workspace: &std::path::Path, stage: u32) -> Options {
        let mut options = Options::new(
            RunOptions::new("data".to_string())
                .with_workspace(workspace.display().to_string())
                .with_stage(stage),
        );
        options.training.iters = 4;
        options.training.num_rays = 16;
        options.training.max_steps = 8;
        options.training.grid_size = 4;
        options.training.update_extra_interval = 2;
        options.attack.adv_reso = 8;
        options.mesh.mcubes_reso = 8;
        options.texture.texture_size = 8;
        options.texture.ssaa = 1;
        options.dataset.bound = 1.0;
        options
    }

    fn dataset(split: DatasetSplit) -> SceneDataset {
        let cameras = (0..2)
            .map(|i| {
                let eye = if i == 0 {
                    Point3::new(0.0, -3.0, 0.5)
                } else {
                    Point3::new(3.0, 0.0, 0.5)
                };
                PinholeCamera::new(
                    look_at(eye, Point3::splat(0.0)),
                    Intrinsics::from_fov_x(8, 8, 0.8),
                    8,
                    8,
                )
            })
            .collect();
        let images = (0..2)
            .map(|_| FloatImage::filled(8, 8, 4, 0.5))
            .collect();
        SceneDataset {
            split,
            cameras,
            images,
            backgrounds: Vec::new(),
        }
    }

    type TestTrainer = AttackTrainer<TestBackend, AdamFactory, crate::training::WarmupExponentialDecay>;

    fn trainer(options: &Options) -> TestTrainer {
        trainer_targeting(options, 3)
    }

    fn trainer_targeting(options: &Options, target: usize) -> TestTrainer {
        let device = Default::default();
        let config = NerfNetworkConfig::new(options.dataset.bound);
        let backbone = ConvBackboneConfig::new(10)
            .with_channels(vec![4])
            .init_classifier::<TestBackend>(&device);
        let surrogate = SurrogatePipeline::new(
            SurrogateKind::Resnet,
            classifier_backbone(backbone, "resnet"),
            &device,
        );
        let inputs = TrainerInputs {
            model: config.init::<TestBackend>(&device),
            model2: config.init(&device),
            surrogate,
            target: TargetClass {
                index: target,
                label: format!("class {}", target),
            },
            optimizer_factory: AdamFactory::new(),
            schedule: WarmupDecayFactory.build(options),
            cadence: Cadence::new(options.training.iters, 2, 2, 1).unwrap(),
        };
        AttackTrainer::new(inputs, options, &device).unwrap()
    }

    #[test]
    fn test_shading_schedule() {
        let temp = TempDir::new().unwrap();
        let mut opts = options(temp.path(), 0);
        opts.training.diffuse_step = 2;
        let trainer = trainer(&opts);
        assert!(!trainer.shading(0).specular);
        assert!(trainer.shading(2).specular);
        assert!(trainer.shading(0).geometry_grad);

        let stage1 = self::trainer(&options(temp.path(), 1));
        assert!(!stage1.shading(0).geometry_grad);
    }

    #[test]
    fn test_train_evaluate_and_resume() {
        let temp = TempDir::new().unwrap();
        let opts = options(temp.path(), 0);
        let mut trainer = trainer(&opts);
        trainer.set_metrics(vec![Box::new(PsnrMeter::new())]);

        let mut train = RayLoader::new(dataset(DatasetSplit::Train), &opts, true);
        let valid = RayLoader::new(dataset(DatasetSplit::Val), &opts, false);
        trainer.train(&mut train, Some(&valid)).unwrap();
        assert_eq!(trainer.state().global_step, 4);
        assert_eq!(trainer.state().epoch, 2);

        let report = trainer.evaluate(&valid, Some("check")).unwrap();
        assert!(report.get("PSNR").is_some());
        assert!(temp.path().join("validation/check_0000_rgb.png").is_file());

        let mut resumed = self::trainer(&opts);
        assert!(resumed.restore(&CheckpointPolicy::Latest).unwrap());
        assert_eq!(resumed.state().global_step, 4);
    }

    #[test]
    fn test_stage1_starts_from_stage0_and_exports() {
        let temp = TempDir::new().unwrap();
        let opts = options(temp.path(), 0);
        let mut stage0 = trainer(&opts);
        let mut train = RayLoader::new(dataset(DatasetSplit::Train), &opts, true);
        stage0.train(&mut train, None).unwrap();

        let opts1 = options(temp.path(), 1);
        let mut stage1 = trainer(&opts1);
        assert!(stage1.restore(&CheckpointPolicy::Latest).unwrap());
        assert_eq!(stage1.state().global_step, 0);

        let test = RayLoader::new(dataset(DatasetSplit::Test), &opts1, false);
        assert_eq!(stage1.test(&test, true).unwrap(), 2);
        assert!(temp.path().join("results/nerf_adv_stage1_0001_rgb.png").is_file());
        assert_eq!(stage1.test(&test, false).unwrap(), 0);

        let path = stage0.save_mesh(8, 0, None).unwrap();
        assert!(path.ends_with("mesh/mesh.obj"));
    }

    #[test]
    fn test_resume_keeps_the_checkpoint_target() {
        let temp = TempDir::new().unwrap();
        let opts = options(temp.path(), 0);
        let mut first = trainer(&opts);
        let mut train = RayLoader::new(dataset(DatasetSplit::Train), &opts, true);
        first.train(&mut train, None).unwrap();

        let mut other = trainer_targeting(&opts, 5);
        let err = other.restore(&CheckpointPolicy::Latest).unwrap_err();
        assert!(matches!(err, NeuralAdvError::Configuration { .. }));
        assert_eq!(err.exit_code(), 2);

        // A new stage may start from a field attacked towards another class
        let mut stage1 = trainer_targeting(&options(temp.path(), 1), 5);
        assert!(stage1.restore(&CheckpointPolicy::Latest).unwrap());
    }

    #[test]
    fn test_refine_passes_follow_stage_and_steps() {
        let temp = TempDir::new().unwrap();
        let mut opts = options(temp.path(), 1);
        opts.texture.refine = true;
        opts.texture.refine_steps = vec![0, 2, 4];
        let settings = TrainerSettings::from_options(&opts);
        assert_eq!(settings.refine_passes(1), 0);
        assert_eq!(settings.refine_passes(2), 1);
        assert_eq!(settings.refine_passes(10), 2);

        opts.texture.refine = false;
        assert_eq!(TrainerSettings::from_options(&opts).refine_passes(10), 0);
        let mut stage0 = options(temp.path(), 0);
        stage0.texture.refine = true;
        stage0.texture.refine_steps = vec![2];
        assert_eq!(TrainerSettings::from_options(&stage0).refine_passes(10), 0);
    }

    #[test]
    fn test_stage1_refines_surface_at_refine_steps() {
        let temp = TempDir::new().unwrap();
        let opts = options(temp.path(), 0);
        let mut stage0 = trainer(&opts);
        let mut train = RayLoader::new(dataset(DatasetSplit::Train), &opts, true);
        stage0.train(&mut train, None).unwrap();

        let mut opts1 = options(temp.path(), 1);
        opts1.texture.refine = true;
        opts1.texture.refine_steps = vec![2, 4];
        opts1.texture.refine_decimate_ratio = 0.5;
        let mut stage1 = trainer(&opts1);
        assert!(stage1.restore(&CheckpointPolicy::Latest).unwrap());
        assert_eq!(stage1.surface_faces(), None);

        let mut train1 = RayLoader::new(dataset(DatasetSplit::Train), &opts1, true);
        stage1.train(&mut train1, None).unwrap();
        let refined = stage1.surface_faces().unwrap();
        let unrefined = stage1.refined_surface(0).unwrap().num_faces();
        assert!(refined <= unrefined);
    }

    #[test]
    fn test_scratch_policy_loads_nothing() {
        let temp = TempDir::new().unwrap();
        let mut trainer = trainer(&options(temp.path(), 0));
        assert!(!trainer.restore(&CheckpointPolicy::Scratch).unwrap());
    }
}
