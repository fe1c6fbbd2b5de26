use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::publishing::ContentServiceError,
    cache::CacheError,
    config::LoadError,
    domain::error::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Content(#[from] ContentServiceError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Process exit code reported by the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::NotFound
            | AppError::Domain(DomainError::NotFound { .. })
            | AppError::Content(ContentServiceError::Domain(DomainError::NotFound { .. })) => 3,
            AppError::Validation(_)
            | AppError::Config(_)
            | AppError::Domain(DomainError::Validation { .. })
            | AppError::Content(ContentServiceError::Domain(DomainError::Validation { .. })) => 2,
            _ => 1,
        }
    }

    /// The error followed by each of its sources.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = StdError::source(self);
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages
    }
}
