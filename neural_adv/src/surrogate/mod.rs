//! Surrogate model pipeline.
//!
//! A surrogate is an immutable composition of a resize to the network input size, an
//! optional per-channel normalization (classifiers only), and a frozen backbone:
//!
//! ```text
//! render [N,3,H,W] ──► Resize ──► Normalize? ──► Backbone ──► logits [N,C]
//! ```

mod backbone;
mod resize;

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;

use crate::error::{NeuralAdvError, Result};

pub use backbone::{
    classifier_backbone, detector_backbone, Backbone, BackboneLoader, ConvBackboneConfig,
    ConvClassifier, ConvDetector, RecordBackboneLoader,
};
pub use resize::{bilinear_weights, BilinearResize};

/// ImageNet per-channel mean.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet per-channel standard deviation.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Supported surrogate networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurrogateKind {
    /// ResNet-101 classifier.
    Resnet,
    /// DenseNet-121 classifier.
    Densenet,
    /// YOLOv8 detector.
    Yolov8,
}

impl SurrogateKind {
    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            SurrogateKind::Resnet => "resnet",
            SurrogateKind::Densenet => "densenet",
            SurrogateKind::Yolov8 => "yolov8",
        }
    }

    /// Network input `[height, width]`.
    pub fn input_size(self) -> [usize; 2] {
        match self {
            SurrogateKind::Resnet | SurrogateKind::Densenet => [224, 224],
            SurrogateKind::Yolov8 => [512, 512],
        }
    }

    /// Per-channel `(mean, std)`; `None` for the detector, which takes raw `[0, 1]` input.
    pub fn normalization(self) -> Option<([f32; 3], [f32; 3])> {
        match self {
            SurrogateKind::Resnet | SurrogateKind::Densenet => Some((IMAGENET_MEAN, IMAGENET_STD)),
            SurrogateKind::Yolov8 => None,
        }
    }

    /// Classifier record file stem, `None` for the detector (configured separately).
    pub fn record_name(self) -> Option<&'static str> {
        match self {
            SurrogateKind::Resnet => Some("resnet101"),
            SurrogateKind::Densenet => Some("densenet121"),
            SurrogateKind::Yolov8 => None,
        }
    }

    /// True for the detector.
    pub fn is_detector(self) -> bool {
        self == SurrogateKind::Yolov8
    }
}

impl FromStr for SurrogateKind {
    type Err = NeuralAdvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resnet" => Ok(SurrogateKind::Resnet),
            "densenet" => Ok(SurrogateKind::Densenet),
            "yolov8" => Ok(SurrogateKind::Yolov8),
            _ => Err(NeuralAdvError::UnsupportedSurrogate {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SurrogateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of the surrogate pipeline, for inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStage {
    /// Bilinear resize.
    Resize {
        /// Output height.
        height: usize,
        /// Output width.
        width: usize,
    },
    /// `(x - mean) / std` per channel.
    Normalize {
        /// Channel means.
        mean: [f32; 3],
        /// Channel standard deviations.
        std: [f32; 3],
    },
    /// The frozen network.
    Backbone {
        /// Backbone name.
        name: String,
    },
}

/// Frozen surrogate: resize, optional normalization, backbone.
pub struct SurrogatePipeline<B: Backend> {
    kind: SurrogateKind,
    normalization: Option<(Tensor<B, 4>, Tensor<B, 4>)>,
    backbone: Box<dyn Backbone<B>>,
    device: B::Device,
}

impl<B: Backend> SurrogatePipeline<B> {
    /// Compose the pipeline for `kind` around an already loaded backbone.
    pub fn new(kind: SurrogateKind, backbone: Box<dyn Backbone<B>>, device: &B::Device) -> Self {
        let normalization = kind.normalization().map(|(mean, std)| {
            (
                Tensor::<B, 1>::from_floats(mean, device).reshape([1, 3, 1, 1]),
                Tensor::<B, 1>::from_floats(std, device).reshape([1, 3, 1, 1]),
            )
        });
        Self {
            kind,
            normalization,
            backbone,
            device: device.clone(),
        }
    }

    /// The surrogate kind.
    pub fn kind(&self) -> SurrogateKind {
        self.kind
    }

    /// Number of classes the backbone scores.
    pub fn num_classes(&self) -> usize {
        self.backbone.num_classes()
    }

    /// Pipeline stages in application order.
    pub fn stages(&self) -> Vec<PipelineStage> {
        let [height, width] = self.kind.input_size();
        let mut stages = vec![PipelineStage::Resize { height, width }];
        if let Some((mean, std)) = self.kind.normalization() {
            stages.push(PipelineStage::Normalize { mean, std });
        }
        stages.push(PipelineStage::Backbone {
            name: self.backbone.name().to_string(),
        });
        stages
    }

    /// Resize and normalize `images` (`[N, 3, H, W]`, values in `[0, 1]`).
    pub fn preprocess(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, h, w] = images.dims();
        let size = self.kind.input_size();
        let x = if [h, w] == size {
            images
        } else {
            BilinearResize::new([h, w], size, &self.device).forward(images)
        };
        match &self.normalization {
            Some((mean, std)) => (x - mean.clone()) / std.clone(),
            None => x,
        }
    }

    /// Logits `[N, num_classes]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.backbone.logits(self.preprocess(images))
    }

    /// Predicted class per image.
    pub fn predict(&self, images: Tensor<B, 4>) -> Result<Vec<usize>> {
        let n = images.dims()[0];
        let classes = self
            .forward(images)
            .argmax(1)
            .reshape([n])
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| NeuralAdvError::training(format!("{:?}", e)))?;
        Ok(classes.into_iter().map(|c| c as usize).collect())
    }
}

impl<B: Backend> fmt::Debug for SurrogatePipeline<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurrogatePipeline")
            .field("kind", &self.kind)
            .field("stages", &self.stages())
            .finish()
    }
}

/// Parse `name`, load its backbone with `loader`, and compose the pipeline.
pub fn build_surrogate<B: Backend, L: BackboneLoader<B> + ?Sized>(
    name: &str,
    loader: &L,
    device: &B::Device,
) -> Result<SurrogatePipeline<B>> {
    let kind: SurrogateKind = name.parse()?;
    let backbone = loader.load(kind, device)?;
    let pipeline = SurrogatePipeline::new(kind, backbone, device);
    log::info!("Surrogate {}: {:?}", kind, pipeline.stages());
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    struct FreshLoader;

    impl BackboneLoader<TestBackend> for FreshLoader {
        fn load(
            &self,
            kind: SurrogateKind,
            device: &<TestBackend as Backend>::Device,
        ) -> Result<Box<dyn Backbone<TestBackend>>> {
            let config = ConvBackboneConfig::new(10).with_channels(vec![4]);
            Ok(if kind.is_detector() {
                detector_backbone(config.init_detector(device), kind.as_str())
            } else {
                classifier_backbone(config.init_classifier(device), kind.as_str())
            })
        }
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("ResNet".parse::<SurrogateKind>().unwrap(), SurrogateKind::Resnet);
        assert_eq!("densenet".parse::<SurrogateKind>().unwrap(), SurrogateKind::Densenet);
        let err = "vgg16".parse::<SurrogateKind>().unwrap_err();
        assert!(matches!(err, NeuralAdvError::UnsupportedSurrogate { .. }));
    }

    #[test]
    fn test_resnet_stages() {
        let device = Default::default();
        let pipeline = build_surrogate::<TestBackend, _>("resnet", &FreshLoader, &device).unwrap();
        let stages = pipeline.stages();
        assert_eq!(stages[0], PipelineStage::Resize { height: 224, width: 224 });
        assert_eq!(
            stages[1],
            PipelineStage::Normalize {
                mean: IMAGENET_MEAN,
                std: IMAGENET_STD
            }
        );
        assert!(matches!(stages[2], PipelineStage::Backbone { .. }));
    }

    #[test]
    fn test_yolo_stages_have_no_normalize() {
        let device = Default::default();
        let pipeline = build_surrogate::<TestBackend, _>("yolov8", &FreshLoader, &device).unwrap();
        let stages = pipeline.stages();
        assert_eq!(stages[0], PipelineStage::Resize { height: 512, width: 512 });
        assert!(!stages
            .iter()
            .any(|s| matches!(s, PipelineStage::Normalize { .. })));
    }

    #[test]
    fn test_unknown_surrogate() {
        let device = Default::default();
        let err = build_surrogate::<TestBackend, _>("vgg", &FreshLoader, &device).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_preprocess_resizes_and_normalizes() {
        let device = Default::default();
        let pipeline = build_surrogate::<TestBackend, _>("densenet", &FreshLoader, &device).unwrap();
        let images = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &device) * 0.485;
        let x = pipeline.preprocess(images);
        assert_eq!(x.dims(), [1, 3, 224, 224]);

        // Red channel equals its mean, so it normalizes to zero
        let values = x.into_data().to_vec::<f32>().unwrap();
        assert!(values[..224 * 224].iter().all(|v| v.abs() < 1e-5));

        let predictions = pipeline.predict(Tensor::zeros([2, 3, 8, 8], &device)).unwrap();
        assert_eq!(predictions.len(), 2);
        assert!(predictions.iter().all(|&c| c < 10));
    }
}
