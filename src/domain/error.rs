use thiserror::Error;

use crate::domain::path::PathError;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("content `{id}` not found")]
    NotFound { id: i32 },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("domain invariant violated: {message}")]
    Invariant { message: String },
    #[error(transparent)]
    Path(#[from] PathError),
}

impl DomainError {
    pub fn not_found(id: i32) -> Self {
        Self::NotFound { id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
