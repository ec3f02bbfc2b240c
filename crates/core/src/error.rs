//! Error types shared across Curricula crates

use std::path::PathBuf;

/// Result type alias for Curricula operations
pub type Result<T> = std::result::Result<T, CurriculaError>;

#[derive(Debug, thiserror::Error)]
pub enum CurriculaError {
    /// A required data file or trained artifact is absent
    #[error("Missing input: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        key: Option<String>,
    },

    /// Input data is structurally unusable (missing columns, duplicate keys)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// A persisted artifact could not be decoded or has inconsistent shapes
    #[error("Malformed artifact '{artifact}': {message}")]
    MalformedArtifact { artifact: String, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CurriculaError {
    pub fn invalid_data(message: impl Into<String>) -> Self {
        CurriculaError::InvalidData {
            message: message.into(),
        }
    }

    pub fn malformed(artifact: impl Into<String>, message: impl Into<String>) -> Self {
        CurriculaError::MalformedArtifact {
            artifact: artifact.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>, key: &str) -> Self {
        CurriculaError::ConfigurationError {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// True for errors that mean "nothing to serve yet" rather than a bug
    pub fn is_missing_input(&self) -> bool {
        matches!(self, CurriculaError::MissingInput { .. })
    }
}
