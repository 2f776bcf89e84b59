//! Bearer token decoding and credential storage.

pub mod error;
pub mod store;
pub mod token;

pub use error::AuthError;
pub use store::{
    CredentialKey, FileTokenStore, MemoryTokenStore, SessionStore, TokenStore, TokenStoreConfig,
};
pub use token::{Claims, Malformed, TokenCodec};
