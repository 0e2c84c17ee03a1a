//! Error types for adv_io operations.
//!
//! Provides specific error variants for label tables, manifests, images and mesh export.

use core::fmt;

/// Errors that can occur during adv_io operations.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvIoError {
    /// I/O error while reading or writing a file.
    Io(String),

    /// Malformed JSON.
    Json(String),

    /// Image decoding or encoding failure.
    Image(String),

    /// A required file does not exist.
    MissingFile {
        /// Path that was looked up.
        path: String,
    },

    /// Label table has the wrong number of entries.
    LabelCount {
        /// Expected number of labels.
        expected: usize,
        /// Number of labels found.
        got: usize,
    },

    /// Manifest content is unusable.
    InvalidManifest {
        /// Description of the problem.
        message: String,
    },

    /// Mesh data is inconsistent.
    InvalidMesh {
        /// Description of the problem.
        message: String,
    },

    /// A split produced no frames.
    EmptySplit {
        /// Split name.
        split: String,
    },

    /// Image or buffer sizes disagree.
    DimensionMismatch {
        /// Expected (width, height).
        expected: (u32, u32),
        /// Actual (width, height).
        got: (u32, u32),
    },
}

impl fmt::Display for AdvIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvIoError::Io(msg) => write!(f, "I/O error: {}", msg),
            AdvIoError::Json(msg) => write!(f, "JSON error: {}", msg),
            AdvIoError::Image(msg) => write!(f, "image error: {}", msg),
            AdvIoError::MissingFile { path } => write!(f, "file not found: {}", path),
            AdvIoError::LabelCount { expected, got } => {
                write!(
                    f,
                    "label table must have {} entries, found {}",
                    expected, got
                )
            }
            AdvIoError::InvalidManifest { message } => {
                write!(f, "invalid manifest: {}", message)
            }
            AdvIoError::InvalidMesh { message } => write!(f, "invalid mesh: {}", message),
            AdvIoError::EmptySplit { split } => write!(f, "split '{}' has no frames", split),
            AdvIoError::DimensionMismatch { expected, got } => {
                write!(
                    f,
                    "dimension mismatch: expected {}x{}, got {}x{}",
                    expected.0, expected.1, got.0, got.1
                )
            }
        }
    }
}

impl std::error::Error for AdvIoError {}

impl From<std::io::Error> for AdvIoError {
    fn from(err: std::io::Error) -> Self {
        AdvIoError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AdvIoError {
    fn from(err: serde_json::Error) -> Self {
        AdvIoError::Json(err.to_string())
    }
}

impl From<image::ImageError> for AdvIoError {
    fn from(err: image::ImageError) -> Self {
        AdvIoError::Image(err.to_string())
    }
}

/// Result type alias for adv_io operations.
pub type Result<T> = core::result::Result<T, AdvIoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AdvIoError::LabelCount {
            expected: 1000,
            got: 999,
        };
        assert_eq!(format!("{}", err), "label table must have 1000 entries, found 999");

        let err = AdvIoError::DimensionMismatch {
            expected: (4, 4),
            got: (2, 3),
        };
        assert!(format!("{}", err).contains("2x3"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AdvIoError = io.into();
        assert!(matches!(err, AdvIoError::Io(ref m) if m.contains("gone")));
    }

    #[test]
    fn test_from_json_error() {
        let bad = serde_json::from_str::<Vec<String>>("[1,").unwrap_err();
        assert!(matches!(AdvIoError::from(bad), AdvIoError::Json(_)));
    }
}
