//! # Validation Error Types

use crate::error::RegistryError;

/// Error types for validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Input too long: {actual} exceeds maximum {max}")]
    TooLong { actual: usize, max: usize },

    #[error("Input must not be empty")]
    Empty,

    #[error("Invalid characters in input: {input}")]
    InvalidCharacters { input: String },

    #[error("Path traversal detected: {path}")]
    PathTraversal { path: String },

    #[error("File size exceeds limit: {actual} > {max}")]
    FileTooLarge { actual: u64, max: u64 },

    #[error("Invalid format: {reason}")]
    InvalidFormat { reason: String },

    #[error("Contains control characters")]
    ControlCharacters,
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

impl From<ValidationError> for RegistryError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::FileTooLarge { actual, max } => {
                RegistryError::UploadTooLarge { actual, max }
            }
            other => RegistryError::InvalidInput(other.to_string()),
        }
    }
}
