//! Shared test helpers: token minting, a scripted transport and a store that
//! counts bulk clears.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use gatehouse::auth::{AuthError, CredentialKey, MemoryTokenStore, TokenStore};
use gatehouse::config::ClientConfig;
use gatehouse::pipeline::RequestPipeline;
use gatehouse::session::HeadlessNavigator;
use gatehouse::transport::{HttpRequest, HttpResponse, Method, Transport, TransportFailure};

/// Unsigned JWT expiring `offset_secs` from now (negative = already expired).
pub fn jwt(subject: &str, offset_secs: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + offset_secs;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({"sub": subject, "exp": exp, "type": "access"}).to_string(),
    );
    format!("{header}.{payload}.sig")
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Memory store that counts `clear_all` calls.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryTokenStore,
    pub clears: AtomicUsize,
}

impl CountingStore {
    pub fn with_token(token: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryTokenStore::with_token(token),
            clears: AtomicUsize::new(0),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> Option<String> {
        self.inner.load(CredentialKey::AccessToken).unwrap()
    }
}

impl TokenStore for CountingStore {
    fn load(&self, key: CredentialKey) -> Result<Option<String>, AuthError> {
        self.inner.load(key)
    }

    fn save(&self, key: CredentialKey, value: &str) -> Result<(), AuthError> {
        self.inner.save(key, value)
    }

    fn clear(&self, key: CredentialKey) -> Result<(), AuthError> {
        self.inner.clear(key)
    }

    fn clear_all(&self) -> Result<(), AuthError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear_all()
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub at: tokio::time::Instant,
}

/// Transport replaying a fixed script, then a fallback reply forever.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportFailure>>>,
    fallback: Result<HttpResponse, TransportFailure>,
    hang: bool,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new(
        script: Vec<Result<HttpResponse, TransportFailure>>,
        fallback: Result<HttpResponse, TransportFailure>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            hang: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn always_unreachable() -> Arc<Self> {
        Self::new(Vec::new(), Err(unreachable_failure()))
    }

    /// Never answers; only the pipeline timeout ends an attempt.
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(HttpResponse::new(200, "")),
            hang: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &HttpRequest,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportFailure> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method,
            path: request.path.clone(),
            authorization: request
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            at: tokio::time::Instant::now(),
        });
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn unreachable_failure() -> TransportFailure {
    TransportFailure::NoResponse {
        message: "connection refused".to_string(),
    }
}

pub fn test_config(base_url: &str) -> ClientConfig {
    ClientConfig::builder()
        .base_url(base_url)
        .retry_delay(Duration::from_millis(1000))
        .timeout(Duration::from_secs(5))
        .build()
}

/// Pipeline over `transport` with the given store and a navigator at `location`.
pub fn pipeline_with(
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    location: &str,
) -> (RequestPipeline, Arc<HeadlessNavigator>) {
    let navigator = Arc::new(HeadlessNavigator::at(location));
    let pipeline = RequestPipeline::builder(config)
        .transport(transport)
        .store(store)
        .navigator(navigator.clone())
        .build()
        .expect("pipeline");
    (pipeline, navigator)
}
