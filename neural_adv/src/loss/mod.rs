//! Loss functions.
//!
//! - [`NerfLoss`]: photometric reconstruction plus density regularizers
//! - [`AdversarialLoss`]: targeted cross-entropy on surrogate logits
//! - [`LossBreakdown`]: per-term scalars of one step, for logging

mod adversarial;
mod nerf;

use std::fmt;

use burn::prelude::*;

pub use adversarial::AdversarialLoss;
pub use nerf::{finite_difference_gradient, LossTerm, NerfLoss};

use crate::error::{NeuralAdvError, Result};
use crate::render::to_vec;

/// Scalar values of the terms of one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LossBreakdown {
    /// `(term, value)` in evaluation order.
    pub terms: Vec<(LossTerm, f32)>,
    /// Sum of all terms.
    pub total: f32,
}

impl LossBreakdown {
    /// Value of `term`, if it was computed.
    pub fn get(&self, term: LossTerm) -> Option<f32> {
        self.terms.iter().find(|(t, _)| *t == term).map(|(_, v)| *v)
    }
}

impl fmt::Display for LossBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loss={:.6}", self.total)?;
        for (term, value) in &self.terms {
            write!(f, " {}={:.4e}", term.as_str(), value)?;
        }
        Ok(())
    }
}

/// Sum weighted terms into one differentiable scalar and read back their values.
pub fn combine<B: Backend>(terms: Vec<(LossTerm, Tensor<B, 1>)>) -> Result<(Tensor<B, 1>, LossBreakdown)> {
    let mut breakdown = LossBreakdown::default();
    let mut total: Option<Tensor<B, 1>> = None;
    for (term, value) in terms {
        let scalar = to_vec(value.clone().detach())?.first().copied().unwrap_or(0.0);
        breakdown.terms.push((term, scalar));
        breakdown.total += scalar;
        total = Some(match total {
            Some(acc) => acc + value,
            None => value,
        });
    }
    let total = total.ok_or_else(|| NeuralAdvError::training("no loss terms"))?;
    Ok((total, breakdown))
}
