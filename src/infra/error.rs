use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("invalid seed file `{path}`: {message}")]
    Seed { path: PathBuf, message: String },
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn seed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Seed {
            path: path.into(),
            message: message.into(),
        }
    }
}
