//! In-memory posed image sets.

use std::fmt;

use adv_core::PinholeCamera;
use adv_io::FloatImage;

/// Which part of the dataset a loader serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetSplit {
    /// Training frames (per `--train_split`).
    Train,
    /// Validation frames.
    Val,
    /// Test frames or a synthetic trajectory.
    Test,
}

impl DatasetSplit {
    /// Lowercase split name.
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetSplit::Train => "train",
            DatasetSplit::Val => "val",
            DatasetSplit::Test => "test",
        }
    }
}

impl fmt::Display for DatasetSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cameras with optional ground-truth images and per-image backgrounds.
#[derive(Debug, Clone)]
pub struct SceneDataset {
    /// The split this set was loaded for.
    pub split: DatasetSplit,
    /// One camera per frame.
    pub cameras: Vec<PinholeCamera>,
    /// Ground truth, RGB or RGBA, one per camera; empty for synthetic trajectories.
    pub images: Vec<FloatImage>,
    /// Background per frame (task 2), same size as the frame; empty otherwise.
    pub backgrounds: Vec<FloatImage>,
}

impl SceneDataset {
    /// Number of frames.
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    /// True if there are no frames.
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// True if ground-truth images are available.
    pub fn has_gt(&self) -> bool {
        !self.images.is_empty()
    }

    /// Background of frame `index`, if any.
    pub fn background(&self, index: usize) -> Option<&FloatImage> {
        self.backgrounds.get(index)
    }

    /// Ground truth of frame `index` composited over its background (or `color`).
    pub fn composited(&self, index: usize, color: [f32; 3]) -> Option<FloatImage> {
        let image = self.images.get(index)?;
        match self.background(index) {
            Some(bg) => image.composite_over(bg).ok(),
            None => Some(image.composite_over_color(color)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adv_core::{Intrinsics, PinholeCamera};

    fn camera() -> PinholeCamera {
        let mut pose = [[0.0; 4]; 4];
        for (i, row) in pose.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        PinholeCamera::new(pose, Intrinsics::from_fov_x(2, 2, 1.0), 2, 2)
    }

    #[test]
    fn test_composited_prefers_background_image() {
        let image = FloatImage::from_data(1, 1, 4, vec![1.0, 0.0, 0.0, 0.5]).unwrap();
        let dataset = SceneDataset {
            split: DatasetSplit::Train,
            cameras: vec![camera()],
            images: vec![image],
            backgrounds: vec![FloatImage::filled(1, 1, 3, 0.0)],
        };
        let out = dataset.composited(0, [1.0, 1.0, 1.0]).unwrap();
        assert!((out.data[0] - 0.5).abs() < 1e-6);
        assert!((out.data[1] - 0.0).abs() < 1e-6);
        assert!(dataset.has_gt());
    }

    #[test]
    fn test_trajectory_has_no_gt() {
        let dataset = SceneDataset {
            split: DatasetSplit::Test,
            cameras: vec![camera(); 3],
            images: Vec::new(),
            backgrounds: Vec::new(),
        };
        assert_eq!(dataset.len(), 3);
        assert!(!dataset.has_gt());
        assert!(dataset.composited(0, [1.0; 3]).is_none());
    }
}
