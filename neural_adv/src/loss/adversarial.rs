//! Targeted adversarial objective.

use burn::prelude::*;
use burn::tensor::activation::log_softmax;

/// Cross-entropy that pulls surrogate predictions towards one target class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdversarialLoss {
    target: usize,
    weight: f32,
}

impl AdversarialLoss {
    /// Loss towards class `target`, scaled by `weight`.
    pub fn new(target: usize, weight: f32) -> Self {
        Self { target, weight }
    }

    /// Target class.
    pub fn target(&self) -> usize {
        self.target
    }

    /// Weight of the term.
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Mean of `-log softmax(logits)[target]` over the batch; logits are `[N, C]`.
    ///
    /// A target outside `0..C` wraps modulo `C`.
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>) -> Tensor<B, 1> {
        let [n, c] = logits.dims();
        let t = self.target % c.max(1);
        let log_probs = log_softmax(logits, 1);
        log_probs.slice([0..n, t..t + 1]).mean().neg() * self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn value(loss: AdversarialLoss, logits: [[f32; 3]; 1]) -> f32 {
        let logits = Tensor::<TestBackend, 2>::from_floats(logits, &Default::default());
        loss.forward(logits).into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_uniform_logits_give_log_c() {
        let v = value(AdversarialLoss::new(1, 1.0), [[0.0, 0.0, 0.0]]);
        assert!((v - 3f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_confident_target_is_cheap() {
        let hit = value(AdversarialLoss::new(2, 1.0), [[0.0, 0.0, 10.0]]);
        let miss = value(AdversarialLoss::new(0, 1.0), [[0.0, 0.0, 10.0]]);
        assert!(hit < 1e-3);
        assert!(miss > 9.0);
    }

    #[test]
    fn test_target_wraps_and_weight_scales() {
        let wrapped = value(AdversarialLoss::new(5, 2.0), [[0.0, 0.0, 10.0]]);
        let direct = value(AdversarialLoss::new(2, 1.0), [[0.0, 0.0, 10.0]]);
        assert!((wrapped - 2.0 * direct).abs() < 1e-5);
    }
}
