//! Surrogate backbones and their loaders.
//!
//! The pipeline only relies on [`Backbone`]; any pretrained network that maps a batch of
//! images to per-class logits can stand behind it. The reference networks here are small
//! convolutional stacks restored from burn records.

use std::path::{Path, PathBuf};

use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::*;
use burn::record::{CompactRecorder, Recorder};

use crate::error::NeuralAdvError;

use super::SurrogateKind;

/// A frozen network producing class logits.
pub trait Backbone<B: Backend> {
    /// Logits `[N, num_classes]` for images `[N, 3, H, W]`.
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Produces a backbone for a surrogate kind.
pub trait BackboneLoader<B: Backend> {
    /// Load the network for `kind` onto `device`.
    fn load(
        &self,
        kind: SurrogateKind,
        device: &B::Device,
    ) -> crate::error::Result<Box<dyn Backbone<B>>>;
}

/// Configuration for [`ConvClassifier`] and [`ConvDetector`].
#[derive(Config, Debug)]
pub struct ConvBackboneConfig {
    /// Number of output classes.
    pub num_classes: usize,
    /// Channels of each stride-2 stage.
    #[config(default = "vec![16, 32, 64]")]
    pub channels: Vec<usize>,
}

impl ConvBackboneConfig {
    fn stages<B: Backend>(&self, device: &B::Device) -> (Vec<Conv2d<B>>, usize) {
        let mut stages = Vec::with_capacity(self.channels.len());
        let mut in_channels = 3;
        for &out_channels in &self.channels {
            stages.push(
                Conv2dConfig::new([in_channels, out_channels], [3, 3])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
            );
            in_channels = out_channels;
        }
        (stages, in_channels)
    }

    /// Initialize a classifier: conv stages, global average pool, linear head.
    pub fn init_classifier<B: Backend>(&self, device: &B::Device) -> ConvClassifier<B> {
        let (stages, features) = self.stages(device);
        ConvClassifier {
            stages,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head: LinearConfig::new(features, self.num_classes).init(device),
            activation: Relu::new(),
            num_classes: self.num_classes,
        }
    }

    /// Initialize a detector: conv stages and a 1x1 class head per anchor cell.
    pub fn init_detector<B: Backend>(&self, device: &B::Device) -> ConvDetector<B> {
        let (stages, features) = self.stages(device);
        ConvDetector {
            stages,
            head: Conv2dConfig::new([features, self.num_classes], [1, 1]).init(device),
            activation: Relu::new(),
            num_classes: self.num_classes,
        }
    }
}

/// Image classifier.
#[derive(Module, Debug)]
pub struct ConvClassifier<B: Backend> {
    stages: Vec<Conv2d<B>>,
    pool: AdaptiveAvgPool2d,
    head: Linear<B>,
    activation: Relu,
    num_classes: usize,
}

impl<B: Backend> ConvClassifier<B> {
    /// Forward pass, `[N, 3, H, W]` to `[N, num_classes]`.
    pub fn forward(&self, mut x: Tensor<B, 4>) -> Tensor<B, 2> {
        for stage in &self.stages {
            x = self.activation.forward(stage.forward(x));
        }
        let [n, c, _, _] = x.dims();
        let pooled = self.pool.forward(x).reshape([n, c]);
        self.head.forward(pooled)
    }
}

/// Dense detector reporting per-cell class scores.
#[derive(Module, Debug)]
pub struct ConvDetector<B: Backend> {
    stages: Vec<Conv2d<B>>,
    head: Conv2d<B>,
    activation: Relu,
    num_classes: usize,
}

impl<B: Backend> ConvDetector<B> {
    /// Per-anchor class scores `[N, num_classes, anchors]`.
    pub fn anchor_scores(&self, mut x: Tensor<B, 4>) -> Tensor<B, 3> {
        for stage in &self.stages {
            x = self.activation.forward(stage.forward(x));
        }
        let scores = self.head.forward(x);
        let [n, c, h, w] = scores.dims();
        scores.reshape([n, c, h * w])
    }
}

struct Named<M> {
    module: M,
    name: String,
}

impl<B: Backend> Backbone<B> for Named<ConvClassifier<B>> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.module.forward(images)
    }

    fn num_classes(&self) -> usize {
        self.module.num_classes
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<B: Backend> Backbone<B> for Named<ConvDetector<B>> {
    // Max over anchors gives one score per class, like a classifier.
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let scores = self.module.anchor_scores(images);
        let [n, c, _] = scores.dims();
        scores.max_dim(2).reshape([n, c])
    }

    fn num_classes(&self) -> usize {
        self.module.num_classes
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap a classifier as a frozen backbone.
pub fn classifier_backbone<B: Backend>(
    module: ConvClassifier<B>,
    name: impl Into<String>,
) -> Box<dyn Backbone<B>> {
    Box::new(Named {
        module: module.no_grad(),
        name: name.into(),
    })
}

/// Wrap a detector as a frozen backbone.
pub fn detector_backbone<B: Backend>(
    module: ConvDetector<B>,
    name: impl Into<String>,
) -> Box<dyn Backbone<B>> {
    Box::new(Named {
        module: module.no_grad(),
        name: name.into(),
    })
}

/// Loads the reference backbones from `CompactRecorder` files.
#[derive(Debug, Clone)]
pub struct RecordBackboneLoader {
    /// Directory with `resnet101.mpk` and `densenet121.mpk`.
    pub classifier_dir: PathBuf,
    /// Detector record path without extension.
    pub detector_record: PathBuf,
    /// Detector class count.
    pub detector_classes: usize,
}

impl RecordBackboneLoader {
    /// Create a loader.
    pub fn new(
        classifier_dir: impl Into<PathBuf>,
        detector_record: impl Into<PathBuf>,
        detector_classes: usize,
    ) -> Self {
        Self {
            classifier_dir: classifier_dir.into(),
            detector_record: detector_record.into(),
            detector_classes,
        }
    }

    /// Record path (without extension) for `kind`.
    pub fn record_path(&self, kind: SurrogateKind) -> PathBuf {
        match kind.record_name() {
            Some(name) => self.classifier_dir.join(name),
            None => self.detector_record.clone(),
        }
    }
}

fn load_record<B: Backend, M: Module<B>>(
    module: M,
    path: &Path,
    device: &B::Device,
) -> crate::error::Result<M> {
    let file = path.with_extension("mpk");
    if !file.is_file() {
        return Err(NeuralAdvError::resource(
            "surrogate weights",
            format!("{} does not exist", file.display()),
        ));
    }
    let record = Recorder::<B>::load(&CompactRecorder::new(), path.to_path_buf(), device)
        .map_err(|e| NeuralAdvError::resource("surrogate weights", e))?;
    log::info!("Loaded surrogate weights from {}", file.display());
    Ok(module.load_record(record))
}

impl<B: Backend> BackboneLoader<B> for RecordBackboneLoader {
    fn load(
        &self,
        kind: SurrogateKind,
        device: &B::Device,
    ) -> crate::error::Result<Box<dyn Backbone<B>>> {
        let path = self.record_path(kind);
        match kind {
            SurrogateKind::Resnet | SurrogateKind::Densenet => {
                let module = ConvBackboneConfig::new(adv_io::IMAGENET_CLASSES).init_classifier(device);
                let module = load_record(module, &path, device)?;
                Ok(classifier_backbone(module, kind.as_str()))
            }
            SurrogateKind::Yolov8 => {
                let module = ConvBackboneConfig::new(self.detector_classes).init_detector(device);
                let module = load_record(module, &path, device)?;
                Ok(detector_backbone(module, kind.as_str()))
            }
        }
    }
}
