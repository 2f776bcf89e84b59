//! reqwest-backed transport.

use std::time::Duration;

use async_trait::async_trait;

use super::{HttpRequest, HttpResponse, Transport, TransportFailure};
use crate::error::GatehouseError;

/// [`Transport`] over a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GatehouseError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| GatehouseError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportFailure> {
        let url = self.url(&request.path);
        tracing::debug!(method = %request.method, url = %url, "sending request");

        let mut builder = self
            .client
            .request(request.method.into(), &url)
            .headers(request.headers.clone())
            .timeout(timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let response = HttpResponse {
            status,
            headers,
            body,
        };
        if response.is_success() {
            Ok(response)
        } else {
            Err(TransportFailure::Status(response))
        }
    }
}

fn map_reqwest_error(error: reqwest::Error, timeout: Duration) -> TransportFailure {
    if error.is_timeout() {
        TransportFailure::Timeout { after: timeout }
    } else {
        TransportFailure::NoResponse {
            message: error.to_string(),
        }
    }
}
