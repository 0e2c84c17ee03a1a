//! Ray batch loader.
//!
//! One epoch visits every frame once (in shuffled order for training). Each step draws
//! `num_rays` pixels, either from the step's frame or, with `random_image_batch`, from
//! random frames, optionally in square patches.

use adv_core::Ray;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::{Background, Options};

use super::dataset::SceneDataset;

/// Bounds on the adapted ray count.
const MIN_RAYS: usize = 64;
const MAX_RAYS: usize = 1 << 16;

/// Rays and supervision for one training step.
#[derive(Debug, Clone, PartialEq)]
pub struct RayBatch {
    /// Frame the step is built around.
    pub frame: usize,
    /// Rays.
    pub rays: Vec<Ray>,
    /// Frame of every ray.
    pub frames: Vec<usize>,
    /// Background color per ray, `[R, 3]` flattened.
    pub background: Vec<f32>,
    /// Ground truth composited over `background`, `[R, 3]` flattened.
    pub target_rgb: Vec<f32>,
    /// Ground-truth alpha per ray.
    pub target_alpha: Vec<f32>,
}

impl RayBatch {
    /// Number of rays.
    pub fn len(&self) -> usize {
        self.rays.len()
    }

    /// True if the batch has no rays.
    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }
}

/// Iterates ray batches over a [`SceneDataset`].
#[derive(Debug, Clone)]
pub struct RayLoader {
    dataset: SceneDataset,
    num_rays: usize,
    patch_size: usize,
    random_image_batch: bool,
    adaptive_num_rays: bool,
    num_points: usize,
    background: Background,
    shuffle: bool,
}

impl RayLoader {
    /// Loader over `dataset` configured from a normalized option set.
    pub fn new(dataset: SceneDataset, options: &Options, shuffle: bool) -> Self {
        Self {
            dataset,
            num_rays: options.training.num_rays,
            patch_size: options.experimental.patch_size.max(1),
            random_image_batch: options.dataset.random_image_batch,
            adaptive_num_rays: options.training.adaptive_num_rays,
            num_points: options.training.num_points,
            background: options.training.background,
            shuffle,
        }
    }

    /// Batches per epoch (frames in the dataset).
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// True if the dataset has no frames.
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// True if the dataset has ground-truth images.
    pub fn has_gt(&self) -> bool {
        self.dataset.has_gt()
    }

    /// Underlying dataset.
    pub fn dataset(&self) -> &SceneDataset {
        &self.dataset
    }

    /// Current rays per step.
    pub fn num_rays(&self) -> usize {
        self.num_rays
    }

    /// Frame order for one epoch.
    pub fn epoch_order<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if self.shuffle {
            order.shuffle(rng);
        }
        order
    }

    /// Rescale the ray count so the next step marches about `num_points` samples.
    pub fn adapt(&mut self, samples_last_step: usize) {
        if !self.adaptive_num_rays || samples_last_step == 0 {
            return;
        }
        let ratio = self.num_points as f64 / samples_last_step as f64;
        let patch = self.patch_size * self.patch_size;
        let rays = ((self.num_rays as f64 * ratio).round() as usize).clamp(MIN_RAYS, MAX_RAYS);
        self.num_rays = (rays / patch).max(1) * patch;
    }

    fn background_color<R: Rng + ?Sized>(&self, frame: usize, x: usize, y: usize, rng: &mut R) -> [f32; 3] {
        if let Some(bg) = self.dataset.background(frame) {
            let p = bg.pixel(x as u32, y as u32);
            return [p[0], p[1], p[2]];
        }
        match self.background {
            Background::White => [1.0; 3],
            Background::Random => [rng.gen(), rng.gen(), rng.gen()],
        }
    }

    /// Pixel coordinates for one step on a `w x h` frame.
    fn pixels<R: Rng + ?Sized>(&self, w: usize, h: usize, count: usize, rng: &mut R) -> Vec<(usize, usize)> {
        let p = self.patch_size.min(w).min(h).max(1);
        if p == 1 {
            return (0..count)
                .map(|_| (rng.gen_range(0..w), rng.gen_range(0..h)))
                .collect();
        }
        let patches = (count / (p * p)).max(1);
        let mut out = Vec::with_capacity(patches * p * p);
        for _ in 0..patches {
            let x0 = rng.gen_range(0..=w - p);
            let y0 = rng.gen_range(0..=h - p);
            for dy in 0..p {
                for dx in 0..p {
                    out.push((x0 + dx, y0 + dy));
                }
            }
        }
        out
    }

    /// Draw the batch for `frame`.
    pub fn batch<R: Rng + ?Sized>(&self, frame: usize, rng: &mut R) -> RayBatch {
        let n = self.num_rays;
        let mut batch = RayBatch {
            frame,
            rays: Vec::with_capacity(n),
            frames: Vec::with_capacity(n),
            background: Vec::with_capacity(n * 3),
            target_rgb: Vec::with_capacity(n * 3),
            target_alpha: Vec::with_capacity(n),
        };

        let frames: Vec<usize> = if self.random_image_batch {
            (0..n).map(|_| rng.gen_range(0..self.len())).collect()
        } else {
            vec![frame; n]
        };
        let camera = &self.dataset.cameras[frame];
        let pixels = if self.random_image_batch {
            Vec::new()
        } else {
            self.pixels(camera.width, camera.height, n, rng)
        };

        for i in 0..n.max(pixels.len()) {
            let f = frames.get(i).copied().unwrap_or(frame);
            let camera = &self.dataset.cameras[f];
            let (x, y) = match pixels.get(i) {
                Some(&xy) => xy,
                None => (rng.gen_range(0..camera.width), rng.gen_range(0..camera.height)),
            };
            let bg = self.background_color(f, x, y, rng);
            let (rgb, alpha) = match self.dataset.images.get(f) {
                Some(image) => {
                    let px = image.pixel(x as u32, y as u32);
                    let a = if image.has_alpha() { px[3] } else { 1.0 };
                    (
                        [
                            px[0] * a + bg[0] * (1.0 - a),
                            px[1] * a + bg[1] * (1.0 - a),
                            px[2] * a + bg[2] * (1.0 - a),
                        ],
                        a,
                    )
                }
                None => (bg, 0.0),
            };

            batch.rays.push(camera.pixel_ray(x, y));
            batch.frames.push(f);
            batch.background.extend(bg);
            batch.target_rgb.extend(rgb);
            batch.target_alpha.push(alpha);
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunOptions;
    use crate::data::dataset::DatasetSplit;
    use adv_core::{look_at, Intrinsics, PinholeCamera, Point3};
    use adv_io::FloatImage;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn dataset(frames: usize) -> SceneDataset {
        let camera = PinholeCamera::new(
            look_at(Point3::new(0.0, -3.0, 0.0), Point3::splat(0.0)),
            Intrinsics::from_fov_x(8, 8, 0.7),
            8,
            8,
        );
        SceneDataset {
            split: DatasetSplit::Train,
            cameras: vec![camera; frames],
            // Red, half transparent
            images: (0..frames)
                .map(|_| FloatImage::from_data(8, 8, 4, [1.0, 0.0, 0.0, 0.5].repeat(64)).unwrap())
                .collect(),
            backgrounds: Vec::new(),
        }
    }

    fn options() -> Options {
        let mut options = Options::new(RunOptions::new("data".to_string()));
        options.training.num_rays = 16;
        options
    }

    #[test]
    fn test_batch_composites_over_white() {
        let loader = RayLoader::new(dataset(2), &options(), true);
        let mut rng = StdRng::seed_from_u64(0);
        let batch = loader.batch(1, &mut rng);

        assert_eq!(batch.len(), 16);
        assert!(batch.frames.iter().all(|&f| f == 1));
        assert_eq!(&batch.target_rgb[..3], &[1.0, 0.5, 0.5]);
        assert!(batch.target_alpha.iter().all(|&a| a == 0.5));
    }

    #[test]
    fn test_patches_are_contiguous() {
        let mut options = options();
        options.experimental.patch_size = 2;
        let loader = RayLoader::new(dataset(1), &options, false);
        let mut rng = StdRng::seed_from_u64(1);
        let pixels = loader.pixels(8, 8, 16, &mut rng);
        assert_eq!(pixels.len(), 16);
        for patch in pixels.chunks(4) {
            assert_eq!(patch[1].0, patch[0].0 + 1);
            assert_eq!(patch[2].1, patch[0].1 + 1);
        }
    }

    #[test]
    fn test_random_image_batch_uses_many_frames() {
        let mut options = options();
        options.dataset.random_image_batch = true;
        options.training.num_rays = 256;
        let loader = RayLoader::new(dataset(4), &options, true);
        let batch = loader.batch(0, &mut StdRng::seed_from_u64(2));
        let mut seen = batch.frames.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_epoch_order_is_a_permutation() {
        let loader = RayLoader::new(dataset(5), &options(), true);
        let mut order = loader.epoch_order(&mut StdRng::seed_from_u64(3));
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert_eq!(loader.len(), 5);
    }

    #[test]
    fn test_adapt_tracks_sample_budget() {
        let mut options = options();
        options.training.adaptive_num_rays = true;
        options.training.num_rays = 1024;
        options.training.num_points = 4096;
        let mut loader = RayLoader::new(dataset(1), &options, true);

        loader.adapt(8192);
        assert_eq!(loader.num_rays(), 512);
        loader.adapt(0);
        assert_eq!(loader.num_rays(), 512);
        loader.adapt(1);
        assert_eq!(loader.num_rays(), MAX_RAYS);
    }
}
