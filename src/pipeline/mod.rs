//! Request pipeline: attach the session token, classify failures, retry,
//! refresh and replay.

mod context;

pub use context::RequestContext;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::Instrument;

use crate::auth::{SessionStore, TokenCodec, TokenStore};
use crate::config::ClientConfig;
use crate::error::{classify, ErrorKind, GatehouseError, NormalizedError, Result, SendContext};
use crate::session::{Navigator, RefreshCoordinator, SessionTerminator, Termination};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};
use crate::util::clock::{Clock, SystemClock};
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;

/// Authenticated HTTP client.
///
/// Cheap to clone; clones share the session, the refresh coordinator and the
/// transport.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use gatehouse::prelude::*;
///
/// # async fn example() -> gatehouse::error::Result<()> {
/// let config = ClientConfig::builder().base_url("https://api.example.com").build();
/// let pipeline = RequestPipeline::builder(config)
///     .transport(Arc::new(ReqwestTransport::new("https://api.example.com")?))
///     .store(Arc::new(MemoryTokenStore::new()))
///     .navigator(Arc::new(HeadlessNavigator::at("/")))
///     .build()?;
/// let courses: serde_json::Value = pipeline.get_json("/courses").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct RequestPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    session: SessionStore,
    codec: TokenCodec,
    retry: RetryPolicy,
    coordinator: RefreshCoordinator,
    terminator: Arc<SessionTerminator>,
}

impl std::fmt::Debug for PipelineInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineInner")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RequestPipeline`].
pub struct PipelineBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn TokenStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    clock: Arc<dyn Clock>,
}

impl PipelineBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Assemble the pipeline.
    ///
    /// Without an explicit transport a [`crate::transport::ReqwestTransport`]
    /// for `config.base_url` is created; without a store the file store from
    /// the config is used; without a navigator a headless one starting at `/`.
    pub fn build(self) -> Result<RequestPipeline> {
        self.config.validate()?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(crate::transport::ReqwestTransport::new(
                self.config.base_url.clone(),
            )?),
        };
        let store: Arc<dyn TokenStore> = match self.store {
            Some(store) => store,
            None => Arc::new(crate::auth::FileTokenStore::new(
                self.config.token_store_config(),
            )),
        };
        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(crate::session::HeadlessNavigator::at("/")));

        let session = SessionStore::new(store);
        let codec = TokenCodec::new(self.clock);
        let terminator = Arc::new(SessionTerminator::new(
            session.clone(),
            navigator,
            self.config.login_path.clone(),
            self.config.public_paths.clone(),
        ));
        let coordinator = RefreshCoordinator::new(
            transport.clone(),
            session.clone(),
            codec.clone(),
            terminator.clone(),
            self.config.refresh_path.clone(),
            self.config.timeout,
        );

        Ok(RequestPipeline {
            inner: Arc::new(PipelineInner {
                retry: self.config.retry_policy(),
                config: self.config,
                transport,
                session,
                codec,
                coordinator,
                terminator,
            }),
        })
    }
}

impl RequestPipeline {
    pub fn builder(config: ClientConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            transport: None,
            store: None,
            navigator: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.inner.codec
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    /// Store the token (and optional user context) returned by a login.
    pub fn establish_session(&self, token: &str, user: Option<&serde_json::Value>) -> Result<()> {
        if !self.inner.session.set_token(token) {
            return Err(GatehouseError::InvalidArgument(
                "access token could not be stored".into(),
            ));
        }
        if let Some(user) = user {
            self.inner.session.set_user(user);
        }
        self.inner.terminator.rearm();
        tracing::info!("Session established");
        Ok(())
    }

    pub fn current_token(&self) -> Option<String> {
        self.inner.session.token()
    }

    pub fn user_context(&self) -> Option<serde_json::Value> {
        self.inner.session.user()
    }

    /// End the session locally, redirecting to login when appropriate.
    pub fn logout(&self) -> Termination {
        self.inner.terminator.terminate()
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse> {
        self.send(HttpRequest::get(path)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get(path).await?.json()
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<HttpResponse> {
        self.send(HttpRequest::post(path).with_json(body)).await
    }

    pub async fn put_json(&self, path: &str, body: serde_json::Value) -> Result<HttpResponse> {
        self.send(HttpRequest::new(Method::Put, path).with_json(body))
            .await
    }

    pub async fn patch_json(&self, path: &str, body: serde_json::Value) -> Result<HttpResponse> {
        self.send(HttpRequest::new(Method::Patch, path).with_json(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<HttpResponse> {
        self.send(HttpRequest::new(Method::Delete, path)).await
    }

    /// Dispatch one logical request, retrying and refreshing as needed.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let ctx = RequestContext::new();
        let span = tracing::info_span!(
            "request",
            request_id = %ctx.id,
            method = %request.method,
            path = %request.route()
        );
        self.dispatch(request, ctx)
            .instrument(span)
            .await
            .map_err(GatehouseError::from)
    }

    async fn dispatch(
        &self,
        request: HttpRequest,
        mut ctx: RequestContext,
    ) -> std::result::Result<HttpResponse, NormalizedError> {
        let inner = &self.inner;
        let route = request.route().to_string();
        let is_refresh_call = inner.config.is_refresh_route(&route);
        let is_anonymous = inner.config.is_anonymous_route(&route);
        // Set after a refresh so the replay carries exactly the token the
        // coordinator produced, whatever the store holds by then.
        let mut replay_token: Option<String> = None;

        loop {
            let token = if is_anonymous {
                None
            } else {
                replay_token.take().or_else(|| inner.session.token())
            };
            let send_ctx = SendContext {
                had_token: token.is_some(),
                token_expired: token.is_some() && inner.codec.is_expired(token.as_deref()),
                is_refresh_call,
                is_anonymous,
            };
            let outgoing = request.authorized(token.as_deref());

            let failure = match with_timeout(
                inner.config.timeout,
                inner.transport.send(&outgoing, inner.config.timeout),
            )
            .await
            {
                Ok(response) => {
                    tracing::debug!(status = response.status, "Request succeeded");
                    return Ok(response);
                }
                Err(failure) => failure,
            };

            let kind = classify(&failure, &send_ctx);
            let error = NormalizedError::from_failure(kind, &failure);
            tracing::debug!(kind = %kind, status = ?failure.status(), "Request failed");

            match kind {
                ErrorKind::NetworkTransient => {
                    match inner
                        .retry
                        .next_delay(kind, request.method, is_refresh_call, &mut ctx)
                    {
                        Some(delay) => {
                            sleep(delay).await;
                            continue;
                        }
                        None => return Err(error),
                    }
                }
                ErrorKind::AuthExpired if !ctx.refresh_attempted => {
                    ctx.refresh_attempted = true;
                    let Some(stale) = token else {
                        return Err(error);
                    };
                    let fresh = inner.coordinator.fresh_token(&stale).await?;
                    tracing::debug!("Replaying request with refreshed token");
                    replay_token = Some(fresh);
                }
                ErrorKind::AuthInvalid => {
                    if !send_ctx.had_token {
                        tracing::info!("Unauthorized without a session, terminating");
                    }
                    inner.terminator.terminate();
                    return Err(error);
                }
                _ => return Err(error),
            }
        }
    }
}

async fn sleep(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
