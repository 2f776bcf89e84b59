//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::transport::TransportFailure;

/// Bound a transport future, reporting expiry as [`TransportFailure::Timeout`].
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, TransportFailure>>,
) -> Result<T, TransportFailure> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(TransportFailure::Timeout { after: duration }),
    }
}
