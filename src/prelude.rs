//! Convenience re-exports for common use.

pub use crate::auth::{FileTokenStore, MemoryTokenStore, SessionStore, TokenCodec, TokenStore};
pub use crate::config::ClientConfig;
pub use crate::error::{ErrorCode, ErrorKind, GatehouseError, NormalizedError, Result};
pub use crate::pipeline::RequestPipeline;
pub use crate::session::{HeadlessNavigator, Navigator, Termination};
pub use crate::transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
