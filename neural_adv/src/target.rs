//! Adversarial target selection.

use std::fmt;
use std::str::FromStr;

use adv_io::{LabelTable, IMAGENET_CLASSES};
use rand::Rng;

use crate::error::{NeuralAdvError, Result};

/// Largest valid target index.
pub const MAX_TARGET: usize = IMAGENET_CLASSES - 1;

/// Parsed `--target_label`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSpec {
    /// Draw the target uniformly from `[0, MAX_TARGET]`.
    Random,
    /// A fixed class index.
    Fixed(usize),
}

impl FromStr for TargetSpec {
    type Err = NeuralAdvError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("random") {
            return Ok(TargetSpec::Random);
        }
        let invalid = || NeuralAdvError::InvalidTargetLabel {
            input: s.to_string(),
        };
        let value: i64 = trimmed.parse().map_err(|_| invalid())?;
        if !(0..=MAX_TARGET as i64).contains(&value) {
            return Err(invalid());
        }
        Ok(TargetSpec::Fixed(value as usize))
    }
}

impl TargetSpec {
    /// Turn the parsed label into a class index, drawing from `rng` if random.
    pub fn resolve<R: Rng + ?Sized>(self, rng: &mut R) -> usize {
        match self {
            TargetSpec::Random => rng.gen_range(0..=MAX_TARGET),
            TargetSpec::Fixed(index) => index,
        }
    }

    /// Resolve the index and look its class name up in `labels`.
    pub fn select<R: Rng + ?Sized>(self, rng: &mut R, labels: &LabelTable) -> Result<TargetClass> {
        let index = self.resolve(rng);
        let label = labels
            .get(index)
            .ok_or_else(|| NeuralAdvError::InvalidTargetLabel {
                input: index.to_string(),
            })?
            .to_string();
        Ok(TargetClass { index, label })
    }
}

/// The class the attack steers the surrogate towards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetClass {
    /// Class index in `[0, MAX_TARGET]`.
    pub index: usize,
    /// Human-readable class name.
    pub label: String,
}

impl TargetClass {
    /// The class actually scored by a surrogate with `num_classes` outputs.
    ///
    /// Detectors carry fewer classes than the ImageNet table, so an index past
    /// the head wraps modulo `num_classes` and loses its ImageNet name.
    pub fn scored_by(self, num_classes: usize) -> Self {
        if num_classes == 0 || self.index < num_classes {
            return self;
        }
        let index = self.index % num_classes;
        log::warn!(
            "Target {} is outside the surrogate's {} classes, attacking class {} instead",
            self,
            num_classes,
            index
        );
        TargetClass {
            index,
            label: format!("class {}", index),
        }
    }
}

impl fmt::Display for TargetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.label)
    }
}

/// Parse `input`, draw if random, and look the class name up in `labels`.
pub fn resolve_target<R: Rng + ?Sized>(
    input: &str,
    rng: &mut R,
    labels: &LabelTable,
) -> Result<TargetClass> {
    input
        .parse::<TargetSpec>()?
        .select(rng, labels)
        .map_err(|_| NeuralAdvError::InvalidTargetLabel {
            input: input.to_string(),
        })
}
