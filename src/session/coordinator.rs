//! Single-flight token refresh.
//!
//! The coordinator is either `Idle` or `Refreshing`. The first caller that
//! finds it `Idle` flips it to `Refreshing` inside one critical section and
//! becomes the leader; it performs the only refresh call. Everyone arriving
//! while `Refreshing` parks on a one-shot channel and is released, in arrival
//! order, with the leader's outcome.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::oneshot;

use crate::auth::{SessionStore, TokenCodec};
use crate::error::{classify, ErrorCode, ErrorKind, NormalizedError, SendContext};
use crate::session::terminator::SessionTerminator;
use crate::transport::{HttpRequest, Method, Transport};
use crate::util::timeout::with_timeout;

/// Result handed to the leader and every waiter.
pub type RefreshResult = Result<String, NormalizedError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Refreshing,
}

struct CoordinatorState {
    phase: Phase,
    waiters: VecDeque<oneshot::Sender<RefreshResult>>,
}

enum Role {
    Leader,
    Waiter(oneshot::Receiver<RefreshResult>),
    AlreadyRefreshed(String),
}

#[derive(Debug, Deserialize)]
struct RefreshGrant {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<serde_json::Value>,
}

/// Serializes token refresh across every request of one client.
pub struct RefreshCoordinator {
    state: Mutex<CoordinatorState>,
    transport: Arc<dyn Transport>,
    session: SessionStore,
    codec: TokenCodec,
    terminator: Arc<SessionTerminator>,
    refresh_path: String,
    timeout: Duration,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("phase", &self.phase())
            .field("waiting", &self.waiting())
            .field("refresh_path", &self.refresh_path)
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: SessionStore,
        codec: TokenCodec,
        terminator: Arc<SessionTerminator>,
        refresh_path: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                phase: Phase::Idle,
                waiters: VecDeque::new(),
            }),
            transport,
            session,
            codec,
            terminator,
            refresh_path: refresh_path.into(),
            timeout,
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Number of callers parked behind the in-flight refresh.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn refresh_path(&self) -> &str {
        &self.refresh_path
    }

    /// Obtain a token to replace `stale`, which the server just refused as
    /// expired.
    ///
    /// At most one refresh call is in flight at any time. If a refresh already
    /// finished and stored a live token different from `stale`, that token is
    /// returned without calling the server again.
    pub async fn fresh_token(&self, stale: &str) -> RefreshResult {
        let role = {
            let mut state = self.lock();
            match state.phase {
                Phase::Refreshing => {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    Role::Waiter(rx)
                }
                Phase::Idle => match self
                    .session
                    .token()
                    .filter(|current| current != stale && !self.codec.is_expired(Some(current)))
                {
                    Some(current) => Role::AlreadyRefreshed(current),
                    None => {
                        state.phase = Phase::Refreshing;
                        Role::Leader
                    }
                },
            }
        };

        match role {
            Role::AlreadyRefreshed(token) => {
                tracing::debug!("Stored token already replaced, skipping refresh");
                Ok(token)
            }
            Role::Waiter(rx) => {
                tracing::debug!("Waiting for in-flight token refresh");
                rx.await.unwrap_or_else(|_| Err(abandoned()))
            }
            Role::Leader => self.lead(stale).await,
        }
    }

    async fn lead(&self, stale: &str) -> RefreshResult {
        let mut guard = SettleGuard {
            coordinator: self,
            settled: false,
        };
        tracing::info!(path = %self.refresh_path, "Refreshing access token");

        let outcome = match self.call_refresh(stale).await {
            Ok(grant) => {
                if !self.session.set_token(&grant.token) {
                    tracing::warn!("Refreshed token could not be persisted; using it for this process only");
                }
                if let Some(user) = &grant.user {
                    self.session.set_user(user);
                }
                self.terminator.rearm();
                if self.codec.is_expired(Some(&grant.token)) {
                    tracing::warn!("Refresh returned a token that already looks expired");
                }
                tracing::info!("Access token refreshed");
                Ok(grant.token)
            }
            Err(error) => {
                tracing::warn!(kind = %error.kind, status = ?error.status, error = %error, "Token refresh failed");
                if error.kind == ErrorKind::AuthInvalid {
                    self.terminator.terminate();
                }
                Err(error)
            }
        };

        guard.settle(outcome.clone());
        outcome
    }

    async fn call_refresh(&self, stale: &str) -> Result<Grant, NormalizedError> {
        let request = HttpRequest::new(Method::Post, self.refresh_path.as_str()).authorized(Some(stale));
        let ctx = SendContext {
            had_token: true,
            token_expired: true,
            is_refresh_call: true,
            is_anonymous: false,
        };

        let response = with_timeout(self.timeout, self.transport.send(&request, self.timeout))
            .await
            .map_err(|failure| NormalizedError::from_failure(classify(&failure, &ctx), &failure))?;

        let grant: RefreshGrant = response.json().map_err(|_| invalid_grant())?;
        match grant.token.filter(|t| !t.trim().is_empty()) {
            Some(token) => Ok(Grant {
                token,
                user: grant.user,
            }),
            None => Err(invalid_grant()),
        }
    }

    /// Return to `Idle` and release every waiter, oldest first.
    fn settle(&self, outcome: RefreshResult) {
        let waiters = {
            let mut state = self.lock();
            state.phase = Phase::Idle;
            std::mem::take(&mut state.waiters)
        };
        tracing::debug!(waiters = waiters.len(), ok = outcome.is_ok(), "Refresh settled");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct Grant {
    token: String,
    user: Option<serde_json::Value>,
}

/// Settles the coordinator even if the leader's future is dropped mid-refresh.
struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl SettleGuard<'_> {
    fn settle(&mut self, outcome: RefreshResult) {
        self.settled = true;
        self.coordinator.settle(outcome);
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("Token refresh abandoned before completion");
            self.coordinator.settle(Err(abandoned()));
        }
    }
}

fn abandoned() -> NormalizedError {
    NormalizedError::new(
        ErrorKind::NetworkTransient,
        ErrorCode::NetworkError,
        "Token refresh was abandoned before completing",
    )
}

fn invalid_grant() -> NormalizedError {
    NormalizedError::new(
        ErrorKind::AuthInvalid,
        ErrorCode::InvalidResponse,
        "Refresh response did not contain a token",
    )
}
