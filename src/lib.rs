//! gatehouse: token-aware HTTP access layer.
//!
//! Attaches the stored bearer token to every request, refreshes an expired
//! session exactly once no matter how many requests hit the 401 at the same
//! time, retries idempotent requests on network failures, and ends the
//! session only when the server clearly rejects the credential.
//!
//! # Quick Start
//!
//! ```no_run
//! use gatehouse::prelude::*;
//!
//! # async fn example() -> gatehouse::error::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let pipeline = RequestPipeline::builder(config).build()?;
//! let me: serde_json::Value = pipeline.get_json("/users/me").await?;
//! println!("{me}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prelude;
pub mod session;
pub mod transport;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
