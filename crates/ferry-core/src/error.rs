//! Error types for Ferry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("build configuration not found: {0}")]
    ConfigNotFound(String),

    #[error("could not decode build configuration: {0}")]
    ConfigDecode(String),

    #[error("could not parse build configuration: {0}")]
    ConfigParse(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("build failed")]
    BuildFailed,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
