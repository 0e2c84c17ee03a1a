//! Checkpoint save/load for resuming training.
//!
//! A checkpoint is a directory holding:
//! - `model.mpk`: the trained network (burn `CompactRecorder`)
//! - `ema.mpk`: the averaged network, when one is kept
//! - `optim.mpk`: optimizer state
//! - `grid.bin`: occupancy grid densities as little-endian `f32`
//! - `metadata.json`: progress counters
//!
//! Periodic checkpoints are named `checkpoint_<epoch>`; the best one by validation PSNR
//! is kept separately as `best`.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use burn::module::{AutodiffModule, Module};
use burn::optim::Optimizer;
use burn::prelude::*;
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::error::{NeuralAdvError, Result};
use crate::nn::NerfNetwork;

/// Format version written to `metadata.json`.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Periodic checkpoints kept on disk.
pub const MAX_PERIODIC_CHECKPOINTS: usize = 2;

const MODEL_FILE: &str = "model";
const EMA_FILE: &str = "ema";
const OPTIM_FILE: &str = "optim";
const GRID_FILE: &str = "grid.bin";
const METADATA_FILE: &str = "metadata.json";
const BEST_DIR: &str = "best";
const PERIODIC_PREFIX: &str = "checkpoint_";

/// Progress stored next to the records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Format version.
    pub version: u32,
    /// Training stage that wrote the checkpoint.
    pub stage: u32,
    /// Completed epochs.
    pub epoch: usize,
    /// Completed optimizer steps.
    pub global_step: usize,
    /// Best validation PSNR, if any validation ran.
    pub best_psnr: Option<f32>,
    /// Occupancy grid resolution, 0 without a grid.
    pub grid_resolution: usize,
    /// Adversarial target class.
    pub target: usize,
}

impl CheckpointMetadata {
    /// Metadata for the given progress.
    pub fn new(stage: u32, epoch: usize, global_step: usize, target: usize) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            stage,
            epoch,
            global_step,
            best_psnr: None,
            grid_resolution: 0,
            target,
        }
    }

    /// Set the best PSNR; non-finite values are stored as missing.
    pub fn with_best_psnr(mut self, psnr: f32) -> Self {
        self.best_psnr = psnr.is_finite().then_some(psnr);
        self
    }

    /// Set the grid resolution.
    pub fn with_grid_resolution(mut self, resolution: usize) -> Self {
        self.grid_resolution = resolution;
        self
    }
}

/// Which checkpoint, if any, to start from (`--ckpt`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointPolicy {
    /// Resume the newest periodic checkpoint if there is one.
    Latest,
    /// Always start fresh.
    Scratch,
    /// Resume the best checkpoint.
    Best,
    /// Resume an explicit checkpoint directory.
    Path(PathBuf),
}

impl FromStr for CheckpointPolicy {
    type Err = NeuralAdvError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "latest" => CheckpointPolicy::Latest,
            "scratch" => CheckpointPolicy::Scratch,
            "best" => CheckpointPolicy::Best,
            "" => return Err(NeuralAdvError::config("--ckpt must not be empty")),
            path => CheckpointPolicy::Path(PathBuf::from(path)),
        })
    }
}

impl CheckpointPolicy {
    /// Resolve to a checkpoint directory, searching `dirs` in order.
    ///
    /// `Latest` and `Best` quietly yield `None` when nothing is found; an explicit path
    /// must exist.
    pub fn resolve(&self, dirs: &[PathBuf]) -> Result<Option<PathBuf>> {
        match self {
            CheckpointPolicy::Scratch => Ok(None),
            CheckpointPolicy::Latest => Ok(dirs.iter().find_map(|d| find_latest_checkpoint(d))),
            CheckpointPolicy::Best => {
                let best = dirs
                    .iter()
                    .map(|d| d.join(BEST_DIR))
                    .find(|d| checkpoint_exists(d));
                match best {
                    Some(best) => Ok(Some(best)),
                    None => {
                        log::warn!("No best checkpoint found, falling back to the latest one");
                        Ok(dirs.iter().find_map(|d| find_latest_checkpoint(d)))
                    }
                }
            }
            CheckpointPolicy::Path(path) => {
                if checkpoint_exists(path) {
                    Ok(Some(path.clone()))
                } else {
                    Err(NeuralAdvError::resource(
                        "checkpoint",
                        format!("{} is not a checkpoint directory", path.display()),
                    ))
                }
            }
        }
    }
}

/// A restored checkpoint.
pub struct Restored<B: AutodiffBackend, O> {
    /// Network with the saved weights.
    pub model: NerfNetwork<B>,
    /// Averaged network, when one was saved.
    pub ema: Option<NerfNetwork<B::InnerBackend>>,
    /// Optimizer with its saved state, when one was requested and saved.
    pub optimizer: Option<O>,
    /// Occupancy grid densities, when saved.
    pub grid: Option<Vec<f32>>,
    /// Progress counters.
    pub metadata: CheckpointMetadata,
}

/// True if `dir` holds at least a model record and metadata.
pub fn checkpoint_exists(dir: &Path) -> bool {
    dir.join(METADATA_FILE).is_file() && dir.join(MODEL_FILE).with_extension("mpk").is_file()
}

/// Newest `checkpoint_<epoch>` directory under `base_dir`.
pub fn find_latest_checkpoint(base_dir: &Path) -> Option<PathBuf> {
    periodic_checkpoints(base_dir).pop().map(|(_, path)| path)
}

/// Valid periodic checkpoints sorted by epoch.
fn periodic_checkpoints(base_dir: &Path) -> Vec<(usize, PathBuf)> {
    let mut found: Vec<(usize, PathBuf)> = fs::read_dir(base_dir)
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let epoch = path
                .file_name()?
                .to_str()?
                .strip_prefix(PERIODIC_PREFIX)?
                .parse::<usize>()
                .ok()?;
            checkpoint_exists(&path).then_some((epoch, path))
        })
        .collect();
    found.sort_by_key(|(epoch, _)| *epoch);
    found
}

fn record_error(e: impl std::fmt::Debug) -> NeuralAdvError {
    NeuralAdvError::resource("checkpoint", format!("{:?}", e))
}

/// Save a network record to `path` (extension added by the recorder).
pub fn save_network<B: Backend>(model: &NerfNetwork<B>, path: &Path) -> Result<()> {
    model
        .clone()
        .save_file(path.to_path_buf(), &CompactRecorder::new())
        .map_err(record_error)
}

/// Load a network record from `path` into `model`.
pub fn load_network<B: Backend>(
    model: NerfNetwork<B>,
    path: &Path,
    device: &B::Device,
) -> Result<NerfNetwork<B>> {
    model
        .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
        .map_err(record_error)
}

/// Write a checkpoint into `dir`, replacing whatever was there.
pub fn save_checkpoint<B, O>(
    dir: &Path,
    model: &NerfNetwork<B>,
    ema: Option<&NerfNetwork<B::InnerBackend>>,
    optimizer: &O,
    grid: Option<&[f32]>,
    metadata: &CheckpointMetadata,
) -> Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<NerfNetwork<B>, B>,
{
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;

    save_network(model, &dir.join(MODEL_FILE))?;
    if let Some(ema) = ema {
        save_network(ema, &dir.join(EMA_FILE))?;
    }
    Recorder::<B>::record(&CompactRecorder::new(), optimizer.to_record(), dir.join(OPTIM_FILE))
        .map_err(record_error)?;

    if let Some(grid) = grid {
        let bytes: Vec<u8> = grid.iter().flat_map(|v| v.to_le_bytes()).collect();
        fs::write(dir.join(GRID_FILE), bytes)?;
    }

    let json = serde_json::to_string_pretty(metadata).map_err(adv_io::AdvIoError::from)?;
    fs::write(dir.join(METADATA_FILE), json)?;

    log::info!(
        "Saved checkpoint to {} (stage {}, epoch {}, step {})",
        dir.display(),
        metadata.stage,
        metadata.epoch,
        metadata.global_step
    );
    Ok(())
}

/// Read a checkpoint from `dir` into fresh modules.
///
/// The optimizer state is restored only when `optimizer` is given and a record exists.
pub fn load_checkpoint<B, O>(
    dir: &Path,
    model: NerfNetwork<B>,
    optimizer: Option<O>,
    device: &B::Device,
) -> Result<Restored<B, O>>
where
    B: AutodiffBackend,
    O: Optimizer<NerfNetwork<B>, B>,
{
    let json = fs::read_to_string(dir.join(METADATA_FILE))?;
    let metadata: CheckpointMetadata =
        serde_json::from_str(&json).map_err(adv_io::AdvIoError::from)?;
    if metadata.version != CHECKPOINT_VERSION {
        return Err(NeuralAdvError::resource(
            "checkpoint",
            format!("unsupported checkpoint version {}", metadata.version),
        ));
    }

    let ema_template = model.valid();
    let model = load_network(model, &dir.join(MODEL_FILE), device)?;

    let ema_path = dir.join(EMA_FILE);
    let ema = if ema_path.with_extension("mpk").is_file() {
        Some(load_network(ema_template, &ema_path, device)?)
    } else {
        None
    };

    let optim_path = dir.join(OPTIM_FILE);
    let optimizer = match optimizer {
        Some(optimizer) if optim_path.with_extension("mpk").is_file() => {
            let record = Recorder::<B>::load(&CompactRecorder::new(), optim_path, device)
                .map_err(record_error)?;
            Some(optimizer.load_record(record))
        }
        other => other,
    };

    let grid_path = dir.join(GRID_FILE);
    let grid = if grid_path.is_file() {
        let bytes = fs::read(&grid_path)?;
        if bytes.len() % 4 != 0 {
            return Err(NeuralAdvError::resource(
                "checkpoint",
                format!("{} is truncated", grid_path.display()),
            ));
        }
        Some(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    } else {
        None
    };

    log::info!(
        "Loaded checkpoint from {} (stage {}, epoch {}, step {})",
        dir.display(),
        metadata.stage,
        metadata.epoch,
        metadata.global_step
    );

    Ok(Restored {
        model,
        ema,
        optimizer,
        grid,
        metadata,
    })
}

/// Names, saves and prunes the checkpoints of one training stage.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    keep: usize,
}

impl CheckpointManager {
    /// Manage checkpoints under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            keep: MAX_PERIODIC_CHECKPOINTS,
        }
    }

    /// Base directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory of the periodic checkpoint for `epoch`.
    pub fn periodic_dir(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("{}{}", PERIODIC_PREFIX, epoch))
    }

    /// Directory of the best checkpoint.
    pub fn best_dir(&self) -> PathBuf {
        self.dir.join(BEST_DIR)
    }

    /// Delete the oldest periodic checkpoints beyond the retention limit.
    pub fn prune(&self) -> Result<usize> {
        let found = periodic_checkpoints(&self.dir);
        let excess = found.len().saturating_sub(self.keep);
        for (_, path) in found.iter().take(excess) {
            fs::remove_dir_all(path)?;
            log::debug!("Removed old checkpoint {}", path.display());
        }
        Ok(excess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::NerfNetworkConfig;
    use crate::training::{AdamFactory, OptimizerFactory};
    use burn::backend::{Autodiff, NdArray};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn raw(model: &NerfNetwork<TestBackend>) -> f32 {
        let x = Tensor::<TestBackend, 2>::from_floats([[0.1, 0.0, -0.1]], &Default::default());
        model.density(x, usize::MAX).1.into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("latest".parse::<CheckpointPolicy>().unwrap(), CheckpointPolicy::Latest);
        assert_eq!("scratch".parse::<CheckpointPolicy>().unwrap(), CheckpointPolicy::Scratch);
        assert_eq!("best".parse::<CheckpointPolicy>().unwrap(), CheckpointPolicy::Best);
        assert_eq!(
            "runs/a/checkpoint_3".parse::<CheckpointPolicy>().unwrap(),
            CheckpointPolicy::Path(PathBuf::from("runs/a/checkpoint_3"))
        );
    }

    #[test]
    fn test_missing_explicit_path_is_resource_error() {
        let policy = CheckpointPolicy::Path(PathBuf::from("/definitely/not/here"));
        let err = policy.resolve(&[]).unwrap_err();
        assert!(matches!(err, NeuralAdvError::ResourceLoad { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_metadata_json_roundtrip() {
        let metadata = CheckpointMetadata::new(0, 10, 1000, 42)
            .with_best_psnr(f32::NEG_INFINITY)
            .with_grid_resolution(64);
        let json = serde_json::to_string(&metadata).unwrap();
        let parsed: CheckpointMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, metadata);
        assert_eq!(parsed.best_psnr, None);
    }

    #[test]
    fn test_save_load_and_prune() {
        let temp = TempDir::new().unwrap();
        let device = Default::default();
        let manager = CheckpointManager::new(temp.path().join("stage0"));

        let model = NerfNetworkConfig::new(1.0).init::<TestBackend>(&device);
        let optim = OptimizerFactory::<TestBackend>::build(&AdamFactory::new());
        let grid = vec![0.5f32, -1.0, 2.0];

        for epoch in [1, 2, 3] {
            let metadata = CheckpointMetadata::new(0, epoch, epoch * 10, 7).with_best_psnr(21.5);
            save_checkpoint(
                &manager.periodic_dir(epoch),
                &model,
                Some(&model.valid()),
                &optim,
                Some(grid.as_slice()),
                &metadata,
            )
            .unwrap();
        }
        assert_eq!(manager.prune().unwrap(), 1);
        assert!(!manager.periodic_dir(1).exists());

        let latest = CheckpointPolicy::Latest
            .resolve(&[manager.dir().to_path_buf()])
            .unwrap()
            .unwrap();
        assert!(latest.ends_with("checkpoint_3"));

        let fresh = NerfNetworkConfig::new(1.0).init::<TestBackend>(&device);
        let restored = load_checkpoint(&latest, fresh, Some(optim), &device).unwrap();
        assert_eq!(restored.metadata.epoch, 3);
        assert_eq!(restored.metadata.best_psnr, Some(21.5));
        assert_eq!(restored.grid, Some(grid));
        assert!(restored.ema.is_some());
        assert!(restored.optimizer.is_some());
        assert!((raw(&restored.model) - raw(&model)).abs() < 1e-6);
    }

    #[test]
    fn test_scratch_ignores_existing() {
        let temp = TempDir::new().unwrap();
        let resolved = CheckpointPolicy::Scratch
            .resolve(&[temp.path().to_path_buf()])
            .unwrap();
        assert!(resolved.is_none());
        let latest = CheckpointPolicy::Latest
            .resolve(&[temp.path().to_path_buf()])
            .unwrap();
        assert!(latest.is_none());
    }
}
