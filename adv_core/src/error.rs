//! Error types for adv_core operations.
//!
//! Provides a simple error enum with no external dependencies for no_std compatibility.

use core::fmt;

/// Error types that can occur during adv_core operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdvCoreError {
    /// A grid or lattice resolution was too small to be usable.
    InvalidResolution {
        /// The resolution that was requested.
        resolution: usize,
        /// The smallest resolution accepted.
        min: usize,
    },
    /// A scene bound was zero, negative or not finite.
    InvalidBound {
        /// The rejected bound.
        bound: f32,
    },
    /// The iteration budget was zero.
    ZeroIterations,
    /// An epoch had no batches, so no cadence can be derived from it.
    EmptyEpoch,
    /// Two buffers that must have matching lengths did not.
    LengthMismatch {
        /// The expected number of elements.
        expected: usize,
        /// The number of elements provided.
        got: usize,
    },
}

impl fmt::Display for AdvCoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvCoreError::InvalidResolution { resolution, min } => {
                write!(f, "resolution {} is below the minimum of {}", resolution, min)
            }
            AdvCoreError::InvalidBound { bound } => {
                write!(f, "scene bound {} must be positive and finite", bound)
            }
            AdvCoreError::ZeroIterations => write!(f, "iteration budget must be positive"),
            AdvCoreError::EmptyEpoch => write!(f, "an epoch must contain at least one batch"),
            AdvCoreError::LengthMismatch { expected, got } => {
                write!(f, "length mismatch: expected {}, got {}", expected, got)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AdvCoreError {}
