//! Error types for neural_adv.

use thiserror::Error;

/// Errors that can occur while preparing or running an attack.
#[derive(Error, Debug)]
pub enum NeuralAdvError {
    /// Inconsistent or out-of-range options.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// The target label is neither `random` nor an integer in [0, 999].
    #[error("invalid target label '{input}': expected 'random' or an integer in [0, 999]")]
    InvalidTargetLabel {
        /// The rejected input.
        input: String,
    },

    /// Surrogate model name not recognized.
    #[error("unsupported surrogate model '{name}': expected one of resnet, densenet, yolov8")]
    UnsupportedSurrogate {
        /// The rejected name.
        name: String,
    },

    /// A required resource (weights, checkpoint, label file) could not be loaded.
    #[error("failed to load {resource}: {message}")]
    ResourceLoad {
        /// What was being loaded.
        resource: String,
        /// Why it failed.
        message: String,
    },

    /// Training failed.
    #[error("training error: {message}")]
    Training {
        /// Description of the error.
        message: String,
    },

    /// Export error.
    #[error("export error: {message}")]
    Export {
        /// Description of the error.
        message: String,
    },

    /// I/O error from adv_io.
    #[error("I/O error: {0}")]
    Io(#[from] adv_io::AdvIoError),
}

impl NeuralAdvError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        NeuralAdvError::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for a training error.
    pub fn training(message: impl Into<String>) -> Self {
        NeuralAdvError::Training {
            message: message.into(),
        }
    }

    /// Shorthand for a resource-load error.
    pub fn resource(resource: impl Into<String>, message: impl ToString) -> Self {
        NeuralAdvError::ResourceLoad {
            resource: resource.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code reported by the `nerf-adv` binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            NeuralAdvError::InvalidTargetLabel { .. } => 1,
            NeuralAdvError::Configuration { .. } | NeuralAdvError::UnsupportedSurrogate { .. } => 2,
            NeuralAdvError::ResourceLoad { .. } | NeuralAdvError::Io(_) => 3,
            NeuralAdvError::Training { .. } | NeuralAdvError::Export { .. } => 4,
        }
    }
}

impl From<adv_core::AdvCoreError> for NeuralAdvError {
    fn from(err: adv_core::AdvCoreError) -> Self {
        match err {
            adv_core::AdvCoreError::LengthMismatch { .. } => NeuralAdvError::training(err.to_string()),
            _ => NeuralAdvError::config(err.to_string()),
        }
    }
}

impl From<std::io::Error> for NeuralAdvError {
    fn from(err: std::io::Error) -> Self {
        NeuralAdvError::Io(err.into())
    }
}

/// Result type for neural_adv operations.
pub type Result<T> = std::result::Result<T, NeuralAdvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let err = NeuralAdvError::InvalidTargetLabel {
            input: "abc".to_string(),
        };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(NeuralAdvError::config("bad").exit_code(), 2);
        assert_eq!(NeuralAdvError::resource("labels", "missing").exit_code(), 3);
        assert_eq!(NeuralAdvError::training("nan").exit_code(), 4);
    }

    #[test]
    fn test_messages() {
        let err = NeuralAdvError::UnsupportedSurrogate {
            name: "vgg".to_string(),
        };
        assert!(err.to_string().contains("vgg"));

        let err: NeuralAdvError = adv_io::AdvIoError::MissingFile {
            path: "x.json".to_string(),
        }
        .into();
        assert!(err.to_string().contains("x.json"));
    }
}
