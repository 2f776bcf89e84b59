//! Maps raw request failures onto [`ErrorKind`].
//!
//! Classification happens exactly once per failed attempt; everything
//! downstream matches on the resulting kind.

use super::unified::ErrorKind;
use crate::transport::TransportFailure;

/// Facts about the attempt that are known at send time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendContext {
    /// A bearer token was attached.
    pub had_token: bool,
    /// The attached token was expired according to the local codec.
    pub token_expired: bool,
    /// The request targeted the refresh endpoint.
    pub is_refresh_call: bool,
    /// The request targeted an anonymous path (login, register).
    pub is_anonymous: bool,
}

/// Classify a failed attempt.
pub fn classify(failure: &TransportFailure, ctx: &SendContext) -> ErrorKind {
    let status = match failure {
        TransportFailure::NoResponse { .. } | TransportFailure::Timeout { .. } => {
            return ErrorKind::NetworkTransient;
        }
        TransportFailure::Status(response) => response.status,
    };

    if status == 0 {
        return ErrorKind::NetworkTransient;
    }

    if ctx.is_refresh_call {
        return match status {
            500..=599 => ErrorKind::ServerTransient,
            400..=499 => ErrorKind::AuthInvalid,
            _ => ErrorKind::Rejected,
        };
    }

    if status == 401 && !ctx.is_anonymous {
        if !ctx.had_token {
            return ErrorKind::AuthInvalid;
        }
        return if ctx.token_expired {
            ErrorKind::AuthExpired
        } else {
            ErrorKind::AuthInvalid
        };
    }

    ErrorKind::Rejected
}
