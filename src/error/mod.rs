//! Error types for gatehouse.

pub mod classify;
pub mod unified;

pub use classify::{classify, SendContext};
pub use unified::{ErrorCode, ErrorKind, NormalizedError};

use thiserror::Error;

/// Primary error type for all gatehouse operations.
#[derive(Error, Debug)]
pub enum GatehouseError {
    #[error(transparent)]
    Request(#[from] NormalizedError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatehouseError {
    /// The classified kind, for errors that came from a request attempt.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Request(error) => Some(error.kind),
            _ => None,
        }
    }

    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request(error) => error.status,
            _ => None,
        }
    }

    /// Whether a later manual retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            Some(ErrorKind::NetworkTransient | ErrorKind::ServerTransient)
        )
    }

    /// Uniform `{message, status, data, code}` view of any error.
    pub fn to_normalized(&self) -> NormalizedError {
        match self {
            Self::Request(error) => error.clone(),
            Self::Serialization(e) => NormalizedError::new(
                ErrorKind::Rejected,
                ErrorCode::InvalidResponse,
                e.to_string(),
            ),
            other => NormalizedError::new(ErrorKind::Rejected, ErrorCode::Unknown, other.to_string()),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, GatehouseError>;
