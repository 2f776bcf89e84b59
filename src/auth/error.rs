use thiserror::Error;

use crate::error::GatehouseError;

/// Credential storage errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Empty token rejected")]
    EmptyToken,
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<AuthError> for GatehouseError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::EmptyToken => GatehouseError::InvalidArgument(error.to_string()),
            other => GatehouseError::Configuration(other.to_string()),
        }
    }
}
