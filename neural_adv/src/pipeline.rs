//! End-to-end driver: options in, trained field and exports out.

use std::fs;
use std::path::Path;

use adv_core::Cadence;
use adv_io::LabelTable;
use burn::config::Config;
use burn::module::{AutodiffModule, Module};
use burn::tensor::backend::Backend;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{
    normalize, validate, validate_dataset_len, DatasetOptions, ExperimentalOptions, GuiOptions,
    MeshOptions, Options, Stage0Weights, Stage1Weights, TextureOptions, TrainingOptions,
};
use crate::data::{provider_for_task, DatasetProvider, DatasetSplit, RayLoader};
use crate::device::{select_device, DefaultBackend};
use crate::error::{NeuralAdvError, Result};
use crate::nn::NerfNetworkConfig;
use crate::surrogate::{build_surrogate, RecordBackboneLoader};
use crate::target::TargetSpec;
use crate::training::{
    AdamFactory, AttackSuccessMeter, AttackTrainer, CheckpointPolicy, Meter, PsnrMeter,
    SchedulerFactory, SsimMeter, Trainer, TrainerInputs, WarmupDecayFactory,
};

/// Load the ImageNet label table.
pub fn load_labels(path: &str) -> Result<LabelTable> {
    LabelTable::load(path).map_err(|e| NeuralAdvError::resource(format!("labels {}", path), e))
}

fn load_split(provider: &dyn DatasetProvider, options: &Options, split: DatasetSplit) -> Result<RayLoader> {
    let dataset = provider.load(split)?;
    if dataset.is_empty() {
        return Err(NeuralAdvError::resource(
            format!("{} split", split),
            format!("no frames found under {}", options.run.path),
        ));
    }
    Ok(RayLoader::new(dataset, options, split == DatasetSplit::Train))
}

fn save_options(options: &Options) -> Result<()> {
    fs::create_dir_all(&options.run.workspace)?;
    let path = options.options_path();
    options.save(&path)?;
    log::debug!("Saved options to {}", path.display());
    Ok(())
}

/// Options set away from their defaults that this binary accepts but does not act on.
///
/// Covers the mesh vertex optimization of stage 1, depth supervision and the renderer
/// knobs of the CUDA backend. Call on the options as given, before normalization.
pub fn inert_options(options: &Options) -> Vec<&'static str> {
    let dataset = DatasetOptions::new();
    let training = TrainingOptions::new();
    let stage0 = Stage0Weights::new();
    let stage1 = Stage1Weights::new();
    let experimental = ExperimentalOptions::new();
    let mesh = MeshOptions::new();
    let texture = TextureOptions::new();
    let gui = GuiOptions::new();

    [
        ("preload", options.dataset.preload != dataset.preload),
        ("enable_cam_near_far", options.dataset.enable_cam_near_far != dataset.enable_cam_near_far),
        ("enable_cam_center", options.dataset.enable_cam_center != dataset.enable_cam_center),
        ("lr_vert", options.training.lr_vert != training.lr_vert),
        ("pos_gradient_boost", options.training.pos_gradient_boost != training.pos_gradient_boost),
        (
            "enable_offset_nerf_grad",
            options.training.enable_offset_nerf_grad != training.enable_offset_nerf_grad,
        ),
        ("lambda_depth", options.stage0.lambda_depth != stage0.lambda_depth),
        ("wo_smooth", options.stage1.wo_smooth != stage1.wo_smooth),
        ("lambda_lpips", options.stage1.lambda_lpips != stage1.lambda_lpips),
        ("lambda_offsets", options.stage1.lambda_offsets != stage1.lambda_offsets),
        ("lambda_lap", options.stage1.lambda_lap != stage1.lambda_lap),
        ("lambda_normal", options.stage1.lambda_normal != stage1.lambda_normal),
        ("lambda_edgelen", options.stage1.lambda_edgelen != stage1.lambda_edgelen),
        ("lambda_cd", options.stage1.lambda_cd != stage1.lambda_cd),
        (
            "trainable_density_grid",
            options.experimental.trainable_density_grid != experimental.trainable_density_grid,
        ),
        ("env_reso", options.mesh.env_reso != mesh.env_reso),
        ("refine_size", options.texture.refine_size != texture.refine_size),
        ("refine_remesh_size", options.texture.refine_remesh_size != texture.refine_remesh_size),
        ("max_spp", options.gui.max_spp != gui.max_spp),
    ]
    .into_iter()
    .filter_map(|(name, set)| set.then_some(name))
    .collect()
}

/// Run training (or test-only rendering) for a parsed option set.
pub fn run(options: Options) -> Result<()> {
    let inert = inert_options(&options);
    let normalized = normalize(options);
    normalized.log();
    let options = normalized.options;
    let target_spec: TargetSpec = options.attack.target_label.parse()?;
    validate(&options)?;

    if options.gui.gui {
        log::warn!("--gui is not supported by this binary, running headless");
    }
    if options.gui.vis_pose {
        log::warn!("--vis_pose is not supported by this binary, ignoring");
    }
    if !inert.is_empty() {
        log::warn!("Options with no effect in this build: {}", inert.join(", "));
    }
    if options.run.fp16 || options.run.tcnn {
        log::info!("--fp16/--tcnn have no effect, the reference backend runs in f32");
    }

    save_options(&options)?;
    let device = select_device();
    DefaultBackend::seed(options.run.seed);
    let mut rng = StdRng::seed_from_u64(options.run.seed);

    let network = NerfNetworkConfig::from_options(&options);
    let model = network.init::<DefaultBackend>(&device);
    let model2 = network.init::<DefaultBackend>(&device).valid();
    let optimizer_factory = AdamFactory::from_options(&options);
    log::info!(
        "Radiance field: {} parameters, Adam (beta {} / {}, eps {:e})",
        model.num_params(),
        optimizer_factory.beta_1,
        optimizer_factory.beta_2,
        optimizer_factory.epsilon
    );

    let provider = provider_for_task(&options)?;
    let mut train_loader = if options.run.test {
        None
    } else {
        Some(load_split(provider.as_ref(), &options, DatasetSplit::Train)?)
    };
    let epoch_len = train_loader.as_ref().map_or(1, RayLoader::len);
    let cadence = Cadence::new(
        options.training.iters,
        epoch_len,
        options.training.n_ckpt,
        options.training.n_eval,
    )?;
    if let Some(loader) = &train_loader {
        validate_dataset_len(&options, loader.len())?;
    }
    let schedule = WarmupDecayFactory.build(&options);

    let backbones = RecordBackboneLoader::new(
        &options.attack.surrogate_dir,
        &options.attack.yolo_checkpoint,
        options.attack.nc,
    );
    let surrogate =
        build_surrogate::<DefaultBackend, _>(&options.attack.surrogate_model, &backbones, &device)?;
    let labels = load_labels(&options.attack.labels)?;
    let target = target_spec
        .select(&mut rng, &labels)?
        .scored_by(surrogate.num_classes());
    log::info!("Attack target: {}", target);

    let inputs = TrainerInputs {
        model,
        model2,
        surrogate,
        target,
        optimizer_factory,
        schedule,
        cadence,
    };
    let mut trainer = AttackTrainer::new(inputs, &options, &device)?;
    if options.training.mark_untrained {
        if let Some(loader) = &train_loader {
            trainer.mark_untrained(&loader.dataset().cameras);
        }
    }
    let policy: CheckpointPolicy = options.run.ckpt.parse()?;
    trainer.restore(&policy)?;

    let workspace = Path::new(&options.run.workspace);
    if options.run.test {
        return run_test(&mut trainer, provider.as_ref(), &options, workspace);
    }

    let valid_loader = load_split(provider.as_ref(), &options, DatasetSplit::Val)?;
    if let Some(train_loader) = train_loader.as_mut() {
        trainer.set_metrics(vec![Box::new(PsnrMeter::new())]);
        trainer.train(train_loader, Some(&valid_loader))?;
    }

    trainer.set_metrics(metrics(trainer.target().index));
    trainer.evaluate(&valid_loader, None)?;

    let test_loader = load_split(provider.as_ref(), &options, DatasetSplit::Test)?;
    if test_loader.has_gt() {
        trainer.evaluate(&test_loader, Some("test"))?;
    }
    trainer.test(&test_loader, true)?;

    export(&mut trainer, &options, train_loader.as_ref())?;
    log::info!("Outputs written to {}", workspace.display());
    Ok(())
}

fn metrics(target: usize) -> Vec<Box<dyn Meter>> {
    vec![
        Box::new(PsnrMeter::new()),
        Box::new(SsimMeter::new()),
        Box::new(AttackSuccessMeter::new(target)),
    ]
}

fn export<T: Trainer>(trainer: &mut T, options: &Options, train: Option<&RayLoader>) -> Result<()> {
    if options.run.stage == 1 {
        trainer.export_stage1(options.texture.texture_size)?;
    } else {
        let visibility = options
            .mesh
            .mesh_visibility_culling
            .then(|| train.map(RayLoader::dataset))
            .flatten();
        trainer.save_mesh(
            options.mesh.mcubes_reso,
            options.mesh.decimate_target.max(0.0) as usize,
            visibility,
        )?;
    }
    Ok(())
}

fn run_test<T: Trainer>(
    trainer: &mut T,
    provider: &dyn DatasetProvider,
    options: &Options,
    workspace: &Path,
) -> Result<()> {
    if !options.run.test_no_video {
        let test_loader = load_split(provider, options, DatasetSplit::Test)?;
        trainer.test(&test_loader, true)?;
    }
    if !options.run.test_no_mesh {
        export(trainer, options, None)?;
    }
    log::info!("Test outputs written to {}", workspace.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunOptions;

    fn base() -> Options {
        Options::new(RunOptions::new("data".to_string()))
    }

    #[test]
    fn test_defaults_have_no_inert_options() {
        assert!(inert_options(&base()).is_empty());
    }

    #[test]
    fn test_inert_options_are_listed() {
        let mut options = base();
        options.training.lr_vert = 1e-3;
        options.stage1.wo_smooth = true;
        options.stage0.lambda_depth = 0.5;
        options.gui.max_spp = 4;
        assert_eq!(
            inert_options(&options),
            vec!["lr_vert", "lambda_depth", "wo_smooth", "max_spp"]
        );

        // Refinement schedule and decimation are acted on
        let mut refined = base();
        refined.texture.refine = true;
        refined.texture.refine_decimate_ratio = 0.5;
        refined.texture.refine_steps_ratio = vec![0.5];
        assert!(inert_options(&refined).is_empty());
    }
}
