//! Bearer token decoding.
//!
//! Tokens are JWT-shaped (`header.payload.signature`). Only the payload is
//! read and the signature is never verified; the server stays the authority
//! on validity. Local decoding exists to decide whether a 401 means "expired,
//! try a refresh" or "rejected, end the session".

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::clock::{Clock, SystemClock};

/// Claims read from a token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub expires_at: Option<DateTime<Utc>>,
    pub subject_id: Option<String>,
    pub kind: Option<String>,
}

/// Why a token could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Malformed {
    #[error("token is empty")]
    Empty,
    #[error("token is not a three-part JWT")]
    Shape,
    #[error("token payload is not base64url")]
    Encoding,
    #[error("token payload is not a JSON object")]
    Payload,
}

/// Decodes tokens and answers expiry questions against an injectable clock.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    clock: Arc<dyn Clock>,
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl TokenCodec {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Parse the payload segment. Never panics.
    pub fn decode(token: &str) -> Result<Claims, Malformed> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Malformed::Empty);
        }
        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Malformed::Shape);
        };

        let decoded = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| Malformed::Encoding)?;
        let value: serde_json::Value =
            serde_json::from_slice(&decoded).map_err(|_| Malformed::Payload)?;
        let object = value.as_object().ok_or(Malformed::Payload)?;

        let expires_at = object
            .get("exp")
            .and_then(|exp| exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64)))
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        let subject_id = ["sub", "id", "userId", "user_id"]
            .iter()
            .find_map(|key| object.get(*key).and_then(scalar_to_string));
        let kind = ["type", "kind", "role"]
            .iter()
            .find_map(|key| object.get(*key).and_then(scalar_to_string));

        Ok(Claims {
            expires_at,
            subject_id,
            kind,
        })
    }

    /// True when the token is absent, malformed, carries no expiry, or has
    /// `exp <= now`.
    pub fn is_expired(&self, token: Option<&str>) -> bool {
        let Some(token) = token else {
            return true;
        };
        match Self::decode(token) {
            Ok(Claims {
                expires_at: Some(expires_at),
                ..
            }) => expires_at <= self.clock.now(),
            _ => true,
        }
    }

    /// Time left before expiry; `None` when unknown or already past.
    pub fn time_remaining(&self, token: &str) -> Option<chrono::Duration> {
        let expires_at = Self::decode(token).ok()?.expires_at?;
        let remaining = expires_at - self.clock.now();
        (remaining > chrono::Duration::zero()).then_some(remaining)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
