//! Unified error classification and normalization.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::transport::{HttpResponse, TransportFailure};

/// Classified outcome of a failed request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// No response, transport timeout, or status 0.
    NetworkTransient,
    /// 401 while the token attached at send time was already expired.
    AuthExpired,
    /// 401 for a live token, a missing token, or a rejected refresh.
    AuthInvalid,
    /// 5xx from the refresh endpoint.
    ServerTransient,
    /// Any other error status.
    Rejected,
}

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    NetworkError,
    Timeout,
    SessionExpired,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    RateLimited,
    BadRequest,
    ServerError,
    ServiceUnavailable,
    InvalidResponse,
    Unknown,
}

impl ErrorCode {
    /// Map an HTTP status onto a code.
    pub fn from_status(status: u16) -> Self {
        match status {
            0 => Self::NetworkError,
            400 | 422 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            429 => Self::RateLimited,
            502..=504 => Self::ServiceUnavailable,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

/// Uniform error shape handed to callers.
///
/// Consumers branch on `kind` or `code`; they never need to look at transport
/// specific failures. `Clone` so a single refresh failure can be delivered to
/// every queued waiter.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct NormalizedError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub data: Option<serde_json::Value>,
    pub code: ErrorCode,
}

impl NormalizedError {
    pub fn new(kind: ErrorKind, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            data: None,
            code,
        }
    }

    /// Normalize a raw transport failure that has already been classified.
    pub fn from_failure(kind: ErrorKind, failure: &TransportFailure) -> Self {
        match failure {
            TransportFailure::NoResponse { message } => Self {
                kind,
                message: format!("Network error: {message}"),
                status: None,
                data: None,
                code: ErrorCode::NetworkError,
            },
            TransportFailure::Timeout { after } => Self {
                kind,
                message: format!("Request timed out after {}ms", after.as_millis()),
                status: None,
                data: None,
                code: ErrorCode::Timeout,
            },
            TransportFailure::Status(response) => Self::from_response(kind, response),
        }
    }

    fn from_response(kind: ErrorKind, response: &HttpResponse) -> Self {
        let data = response.json_body();
        let code = match kind {
            ErrorKind::AuthExpired => ErrorCode::SessionExpired,
            _ => ErrorCode::from_status(response.status),
        };
        let message = data
            .as_ref()
            .and_then(extract_message)
            .unwrap_or_else(|| default_message(kind, response.status));
        Self {
            kind,
            message,
            status: Some(response.status),
            data,
            code,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self.kind, ErrorKind::AuthExpired | ErrorKind::AuthInvalid)
    }
}

fn extract_message(body: &serde_json::Value) -> Option<String> {
    if let Some(message) = body.get("message").and_then(|m| m.as_str()) {
        return Some(message.to_string());
    }
    match body.get("error")? {
        serde_json::Value::String(message) => Some(message.clone()),
        nested => nested
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
    }
}

fn default_message(kind: ErrorKind, status: u16) -> String {
    match kind {
        ErrorKind::NetworkTransient => "Network error, please check your connection".to_string(),
        ErrorKind::AuthExpired => "Session expired".to_string(),
        ErrorKind::AuthInvalid => "Session is no longer valid, please sign in again".to_string(),
        ErrorKind::ServerTransient => {
            format!("Authentication service unavailable (status {status})")
        }
        ErrorKind::Rejected => format!("Request failed with status {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status_failure(status: u16, body: &str) -> TransportFailure {
        TransportFailure::Status(HttpResponse::new(status, body))
    }

    #[test]
    fn message_prefers_body_message_field() {
        let failure = status_failure(422, r#"{"message":"email already taken","field":"email"}"#);
        let error = NormalizedError::from_failure(ErrorKind::Rejected, &failure);
        assert_eq!(error.message, "email already taken");
        assert_eq!(error.status, Some(422));
        assert_eq!(error.code, ErrorCode::BadRequest);
        assert_eq!(
            error.data.as_ref().and_then(|d| d.get("field")).and_then(|f| f.as_str()),
            Some("email")
        );
    }

    #[test]
    fn message_falls_back_to_nested_error_object() {
        let failure = status_failure(403, r#"{"error":{"message":"not a member"}}"#);
        let error = NormalizedError::from_failure(ErrorKind::Rejected, &failure);
        assert_eq!(error.message, "not a member");
        assert_eq!(error.code, ErrorCode::Forbidden);
    }

    #[test]
    fn plain_text_body_uses_default_message() {
        let failure = status_failure(500, "upstream exploded");
        let error = NormalizedError::from_failure(ErrorKind::ServerTransient, &failure);
        assert_eq!(error.message, "Authentication service unavailable (status 500)");
        assert!(error.data.is_none());
        assert_eq!(error.code, ErrorCode::ServerError);
    }

    #[test]
    fn timeout_maps_to_timeout_code() {
        let failure = TransportFailure::Timeout {
            after: Duration::from_millis(250),
        };
        let error = NormalizedError::from_failure(ErrorKind::NetworkTransient, &failure);
        assert_eq!(error.code, ErrorCode::Timeout);
        assert_eq!(error.status, None);
        assert!(error.message.contains("250ms"));
    }

    #[test]
    fn expired_auth_is_reported_as_session_expired() {
        let failure = status_failure(401, "");
        let error = NormalizedError::from_failure(ErrorKind::AuthExpired, &failure);
        assert_eq!(error.code, ErrorCode::SessionExpired);
        assert!(error.is_auth());
    }

    #[test]
    fn kinds_render_as_snake_case() {
        assert_eq!(ErrorKind::NetworkTransient.to_string(), "network_transient");
        assert_eq!("server_transient".parse::<ErrorKind>().ok(), Some(ErrorKind::ServerTransient));
        assert_eq!(ErrorCode::ServiceUnavailable.to_string(), "service_unavailable");
    }
}
