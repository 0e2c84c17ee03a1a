//! Reconstruction and regularization terms of the radiance field.

use burn::prelude::*;

use crate::config::Stage0Weights;
use crate::nn::NerfNetwork;
use crate::render::RenderOutput;

/// Clamp applied to opacities before taking logarithms.
const ENTROPY_EPS: f32 = 1e-5;

/// Finite-difference step of the eikonal term.
const EIKONAL_STEP: f32 = 1e-3;

/// Radiance field loss calculator.
///
/// Every term is a scalar `[1]` tensor already multiplied by its weight. Terms with a
/// zero weight are skipped entirely and contribute nothing to the graph.
#[derive(Debug, Clone)]
pub struct NerfLoss {
    weights: Stage0Weights,
}

impl NerfLoss {
    /// Create a calculator with the given weights.
    pub fn new(weights: Stage0Weights) -> Self {
        Self { weights }
    }

    /// The weights in use.
    pub fn weights(&self) -> &Stage0Weights {
        &self.weights
    }

    /// Photometric loss.
    ///
    /// L_rgb = mean((pred - gt)^2)
    pub fn rgb_loss<B: Backend>(&self, pred: Tensor<B, 2>, gt: Tensor<B, 2>) -> Tensor<B, 1> {
        let diff = pred - gt;
        (diff.clone() * diff).mean() * self.weights.lambda_rgb
    }

    /// Accumulated opacity against the ground-truth alpha, both `[R, 1]`.
    pub fn mask_loss<B: Backend>(&self, opacity: Tensor<B, 2>, alpha: Tensor<B, 2>) -> Tensor<B, 1> {
        let diff = opacity - alpha;
        (diff.clone() * diff).mean() * self.weights.lambda_mask
    }

    /// Binary entropy of the opacity; pushes rays to be fully empty or fully opaque.
    pub fn entropy_loss<B: Backend>(&self, opacity: Tensor<B, 2>) -> Tensor<B, 1> {
        let a = opacity.clamp(ENTROPY_EPS, 1.0 - ENTROPY_EPS);
        let b = a.clone().neg() + 1.0;
        let entropy = (a.clone() * a.log() + b.clone() * b.log()).neg();
        entropy.mean() * self.weights.lambda_entropy
    }

    /// Mean density over valid samples.
    pub fn density_loss<B: Backend>(&self, sigma: Tensor<B, 2>, mask: Tensor<B, 2>) -> Tensor<B, 1> {
        let [r, s] = mask.dims();
        let mask = mask.reshape([r * s, 1]);
        masked_mean(sigma * mask.clone(), mask) * self.weights.lambda_density
    }

    /// Squared specular magnitude over valid samples.
    pub fn specular_loss<B: Backend>(&self, specular: Tensor<B, 2>, mask: Tensor<B, 2>) -> Tensor<B, 1> {
        let [r, s] = mask.dims();
        let mask = mask.reshape([r * s, 1]);
        let sq = (specular.clone() * specular).sum_dim(1);
        masked_mean(sq * mask.clone(), mask) * self.weights.lambda_specular
    }

    /// Total variation of the raw density head between consecutive samples of a ray.
    pub fn tv_loss<B: Backend>(&self, raw: Tensor<B, 2>, mask: Tensor<B, 2>) -> Tensor<B, 1> {
        let [r, s] = mask.dims();
        if s < 2 {
            return Tensor::zeros([1], &raw.device());
        }
        let raw = raw.reshape([r, s]);
        let next = raw.clone().slice([0..r, 1..s]);
        let prev = raw.slice([0..r, 0..s - 1]);
        // A pair counts only when both samples are real
        let pair = mask.clone().slice([0..r, 1..s]) * mask.slice([0..r, 0..s - 1]);
        let tv = (next - prev).abs() * pair.clone();
        masked_mean(tv, pair) * self.weights.lambda_tv
    }

    /// Eikonal loss of the signed distance head at `points` `[N, 3]`.
    ///
    /// L_eikonal = mean((|grad sdf| - 1)^2), with central differences.
    pub fn eikonal_loss<B: Backend>(&self, model: &NerfNetwork<B>, points: Tensor<B, 2>) -> Tensor<B, 1> {
        let gradients = finite_difference_gradient(
            |x| model.density(x, usize::MAX).1,
            points,
            EIKONAL_STEP,
        );
        let norm = (gradients.clone() * gradients).sum_dim(1).sqrt();
        let deviation = norm - 1.0;
        (deviation.clone() * deviation).mean() * self.weights.lambda_eikonal
    }

    /// Every enabled stage 0 term for one rendered batch.
    pub fn compute<B: Backend>(
        &self,
        model: &NerfNetwork<B>,
        render: &RenderOutput<B>,
        gt_rgb: Tensor<B, 2>,
        gt_alpha: Option<Tensor<B, 2>>,
        eikonal_points: Option<Tensor<B, 2>>,
    ) -> Vec<(LossTerm, Tensor<B, 1>)> {
        let w = &self.weights;
        let mut terms = vec![(LossTerm::Rgb, self.rgb_loss(render.image.clone(), gt_rgb))];

        if let (true, Some(alpha)) = (w.lambda_mask > 0.0, gt_alpha) {
            terms.push((LossTerm::Mask, self.mask_loss(render.opacity.clone(), alpha)));
        }
        if w.lambda_entropy > 0.0 {
            terms.push((LossTerm::Entropy, self.entropy_loss(render.opacity.clone())));
        }
        if w.lambda_density > 0.0 {
            terms.push((
                LossTerm::Density,
                self.density_loss(render.sigma.clone(), render.mask.clone()),
            ));
        }
        if w.lambda_specular > 0.0 {
            terms.push((
                LossTerm::Specular,
                self.specular_loss(render.specular.clone(), render.mask.clone()),
            ));
        }
        if w.lambda_tv > 0.0 {
            terms.push((LossTerm::Tv, self.tv_loss(render.raw.clone(), render.mask.clone())));
        }
        if let (true, Some(points)) = (w.lambda_eikonal > 0.0 && model.is_sdf(), eikonal_points) {
            terms.push((LossTerm::Eikonal, self.eikonal_loss(model, points)));
        }
        terms
    }
}

/// Named loss terms, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LossTerm {
    /// Photometric.
    Rgb,
    /// Alpha mask.
    Mask,
    /// Opacity entropy.
    Entropy,
    /// Density magnitude.
    Density,
    /// Specular magnitude.
    Specular,
    /// Density total variation.
    Tv,
    /// Signed distance gradient norm.
    Eikonal,
    /// Adversarial cross-entropy.
    Adversarial,
}

impl LossTerm {
    /// Short name used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            LossTerm::Rgb => "rgb",
            LossTerm::Mask => "mask",
            LossTerm::Entropy => "entropy",
            LossTerm::Density => "density",
            LossTerm::Specular => "specular",
            LossTerm::Tv => "tv",
            LossTerm::Eikonal => "eikonal",
            LossTerm::Adversarial => "adv",
        }
    }
}

/// Sum of `values` divided by the number of ones in `mask` (at least one).
fn masked_mean<B: Backend>(values: Tensor<B, 2>, mask: Tensor<B, 2>) -> Tensor<B, 1> {
    let count = mask.sum().clamp_min(1.0);
    values.sum() / count
}

/// Central-difference gradient of `f: [N, 3] -> [N, 1]`.
pub fn finite_difference_gradient<B: Backend, F>(f: F, points: Tensor<B, 2>, eps: f32) -> Tensor<B, 2>
where
    F: Fn(Tensor<B, 2>) -> Tensor<B, 2>,
{
    let device = points.device();
    let [n, _] = points.dims();
    let axes: Vec<Tensor<B, 2>> = (0..3)
        .map(|axis| {
            let mut offset = [0.0f32; 3];
            offset[axis] = eps;
            let offset = Tensor::<B, 2>::from_floats([offset], &device).repeat_dim(0, n);
            let forward = f(points.clone() + offset.clone());
            let backward = f(points.clone() - offset);
            (forward - backward) / (2.0 * eps)
        })
        .collect();
    Tensor::cat(axes, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_data().to_vec::<f32>().unwrap()[0]
    }

    fn loss() -> NerfLoss {
        NerfLoss::new(
            Stage0Weights::new()
                .with_lambda_entropy(1.0)
                .with_lambda_tv(1.0)
                .with_lambda_mask(1.0),
        )
    }

    #[test]
    fn test_rgb_loss() {
        let device = Default::default();
        let pred = Tensor::<TestBackend, 2>::zeros([4, 3], &device);
        let gt = Tensor::<TestBackend, 2>::full([4, 3], 0.5, &device);
        assert!((scalar(loss().rgb_loss(pred.clone(), pred.clone()))).abs() < 1e-7);
        assert!((scalar(loss().rgb_loss(pred, gt)) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_entropy_is_lowest_at_extremes() {
        let device = Default::default();
        let binary = Tensor::<TestBackend, 2>::from_floats([[0.0], [1.0]], &device);
        let half = Tensor::<TestBackend, 2>::full([2, 1], 0.5, &device);
        let low = scalar(loss().entropy_loss(binary));
        let high = scalar(loss().entropy_loss(half));
        assert!(low < 1e-3);
        assert!((high - std::f32::consts::LN_2).abs() < 1e-4);
    }

    #[test]
    fn test_tv_ignores_padding() {
        let device = Default::default();
        // One ray, three slots, the last one padded with a large value
        let raw = Tensor::<TestBackend, 2>::from_floats([[1.0], [2.0], [100.0]], &device);
        let mask = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0, 0.0]], &device);
        assert!((scalar(loss().tv_loss(raw, mask)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mask_loss() {
        let device = Default::default();
        let opacity = Tensor::<TestBackend, 2>::from_floats([[1.0], [0.0]], &device);
        let alpha = Tensor::<TestBackend, 2>::from_floats([[1.0], [1.0]], &device);
        assert!((scalar(loss().mask_loss(opacity, alpha)) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_finite_difference_of_linear_function() {
        let device = Default::default();
        let points = Tensor::<TestBackend, 2>::from_floats([[0.1, 0.2, 0.3], [-1.0, 0.5, 2.0]], &device);
        let coeffs = Tensor::<TestBackend, 2>::from_floats([[2.0], [-1.0], [0.5]], &device);
        let grad = finite_difference_gradient(|x| x.matmul(coeffs.clone()), points, 1e-2);
        let values = grad.into_data().to_vec::<f32>().unwrap();
        for row in values.chunks(3) {
            assert!((row[0] - 2.0).abs() < 1e-3);
            assert!((row[1] + 1.0).abs() < 1e-3);
            assert!((row[2] - 0.5).abs() < 1e-3);
        }
    }
}
