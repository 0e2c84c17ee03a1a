//! Exponential moving average of network parameters.

use burn::prelude::*;

use crate::nn::NerfNetwork;

/// Default decay of the stage 0 average.
pub const EMA_DECAY: f32 = 0.95;

/// Shadow copy of a network whose parameters trail the trained ones.
#[derive(Debug, Clone)]
pub struct ParamEma<B: Backend> {
    shadow: NerfNetwork<B>,
    decay: f32,
    updates: usize,
}

impl<B: Backend> ParamEma<B> {
    /// Start the average at `model`.
    pub fn new(model: NerfNetwork<B>, decay: f32) -> Self {
        Self {
            shadow: model,
            decay: decay.clamp(0.0, 1.0),
            updates: 0,
        }
    }

    /// `shadow = decay * shadow + (1 - decay) * model`.
    pub fn update(&mut self, model: &NerfNetwork<B>) {
        let shadow = self.shadow.clone();
        self.shadow = shadow.lerp(model, 1.0 - self.decay);
        self.updates += 1;
    }

    /// The averaged network.
    pub fn model(&self) -> &NerfNetwork<B> {
        &self.shadow
    }

    /// Replace the average, e.g. after loading a checkpoint.
    pub fn reset(&mut self, model: NerfNetwork<B>) {
        self.shadow = model;
        self.updates = 0;
    }

    /// Updates applied since the last reset.
    pub fn updates(&self) -> usize {
        self.updates
    }
}
