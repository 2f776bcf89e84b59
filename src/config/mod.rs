//! Configuration (layered: code > env > config file > defaults).

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

use crate::auth::TokenStoreConfig;
use crate::error::{GatehouseError, Result};
use crate::util::retry::RetryPolicy;

/// Re-issues allowed after a network failure on an idempotent request.
pub const RETRY_MAX: u32 = 2;
/// Base retry delay; the n-th retry waits `n * RETRY_DELAY_MS`.
pub const RETRY_DELAY_MS: u64 = 1000;
/// Per-request transport timeout.
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";
pub const DEFAULT_LOGIN_PATH: &str = "/login";

fn default_public_paths() -> Vec<String> {
    ["/login", "/register", "/forgot-password", "/reset-password"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_anonymous_paths() -> Vec<String> {
    ["/auth/login", "/auth/register"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Client configuration.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use gatehouse::config::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .base_url("https://api.example.com")
///     .timeout(Duration::from_secs(10))
///     .build();
/// assert_eq!(config.refresh_path, "/auth/refresh");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct ClientConfig {
    #[builder(into, default = DEFAULT_BASE_URL.to_string())]
    pub base_url: String,
    #[builder(into, default = DEFAULT_REFRESH_PATH.to_string())]
    pub refresh_path: String,
    /// Route the user is sent to when the session ends.
    #[builder(into, default = DEFAULT_LOGIN_PATH.to_string())]
    pub login_path: String,
    /// Routes on which a terminated session does not redirect.
    #[builder(default = default_public_paths())]
    pub public_paths: Vec<String>,
    /// API paths called without a bearer token; a 401 there is an ordinary
    /// rejection (e.g. wrong password), not a dead session.
    #[builder(default = default_anonymous_paths())]
    pub anonymous_paths: Vec<String>,
    #[builder(default = RETRY_MAX)]
    pub retry_max: u32,
    #[builder(default = Duration::from_millis(RETRY_DELAY_MS))]
    pub retry_delay: Duration,
    #[builder(default = Duration::from_millis(REQUEST_TIMEOUT_MS))]
    pub timeout: Duration,
    /// Directory for the file token store; `~/.gatehouse` when unset.
    #[builder(into)]
    pub token_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    refresh_path: Option<String>,
    login_path: Option<String>,
    public_paths: Option<Vec<String>>,
    anonymous_paths: Option<Vec<String>>,
    retry_max: Option<u32>,
    retry_delay_ms: Option<u64>,
    timeout_ms: Option<u64>,
    token_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Defaults overlaid with a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(raw)
            .map_err(|e| GatehouseError::Configuration(format!("invalid config file: {e}")))?;
        let mut config = Self::default();
        if let Some(v) = file.base_url {
            config.base_url = v;
        }
        if let Some(v) = file.refresh_path {
            config.refresh_path = v;
        }
        if let Some(v) = file.login_path {
            config.login_path = v;
        }
        if let Some(v) = file.public_paths {
            config.public_paths = v;
        }
        if let Some(v) = file.anonymous_paths {
            config.anonymous_paths = v;
        }
        if let Some(v) = file.retry_max {
            config.retry_max = v;
        }
        if let Some(v) = file.retry_delay_ms {
            config.retry_delay = Duration::from_millis(v);
        }
        if let Some(v) = file.timeout_ms {
            config.timeout = Duration::from_millis(v);
        }
        if file.token_dir.is_some() {
            config.token_dir = file.token_dir;
        }
        Ok(config)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overlaid with the environment (after loading `.env`), validated.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with variables read through `lookup`, validated.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self::default().apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Config file (if any), then environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let base = match path {
            Some(path) => Self::load_file(path)?,
            None => Self::default(),
        };
        let config = base.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `GATEHOUSE_*` variables read through `lookup`.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("GATEHOUSE_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("GATEHOUSE_REFRESH_PATH") {
            self.refresh_path = v;
        }
        if let Some(v) = lookup("GATEHOUSE_LOGIN_PATH") {
            self.login_path = v;
        }
        if let Some(v) = lookup("GATEHOUSE_TIMEOUT_MS") {
            let ms: u64 = v.trim().parse().map_err(|_| {
                GatehouseError::Configuration(format!("GATEHOUSE_TIMEOUT_MS is not a number: {v}"))
            })?;
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(v) = lookup("GATEHOUSE_TOKEN_DIR") {
            self.token_dir = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(GatehouseError::Configuration("base_url is empty".into()));
        }
        if !self.refresh_path.starts_with('/') {
            return Err(GatehouseError::Configuration(format!(
                "refresh_path must start with '/': {}",
                self.refresh_path
            )));
        }
        if self.timeout.is_zero() {
            return Err(GatehouseError::Configuration("timeout must be non-zero".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max, self.retry_delay)
    }

    pub fn token_store_config(&self) -> TokenStoreConfig {
        TokenStoreConfig::new(
            self.token_dir
                .clone()
                .unwrap_or_else(TokenStoreConfig::default_dir),
        )
    }

    /// Whether `route` is the refresh endpoint.
    pub fn is_refresh_route(&self, route: &str) -> bool {
        route.trim_end_matches('/') == self.refresh_path.trim_end_matches('/')
    }

    pub fn is_anonymous_route(&self, route: &str) -> bool {
        let route = route.trim_end_matches('/');
        self.anonymous_paths
            .iter()
            .any(|path| path.trim_end_matches('/') == route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn defaults_use_constants() {
        let config = ClientConfig::default();
        assert_eq!(config.retry_max, 2);
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert_eq!(config.timeout, Duration::from_millis(30_000));
        assert_eq!(config.refresh_path, "/auth/refresh");
        assert_eq!(config.login_path, "/login");
        assert!(config.token_dir.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn toml_overrides_only_given_fields() {
        let config = ClientConfig::from_toml_str(
            r#"
            base_url = "https://lms.example.com/api"
            timeout_ms = 5000
            public_paths = ["/login", "/catalog"]
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://lms.example.com/api");
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert_eq!(config.public_paths, vec!["/login".to_string(), "/catalog".to_string()]);
        assert_eq!(config.refresh_path, DEFAULT_REFRESH_PATH);
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let err = ClientConfig::from_toml_str("retries = 5").unwrap_err();
        assert!(matches!(err, GatehouseError::Configuration(_)));
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("GATEHOUSE_BASE_URL", "http://env.test"),
            ("GATEHOUSE_TIMEOUT_MS", "1500"),
            ("GATEHOUSE_TOKEN_DIR", "/tmp/gh"),
        ]
        .into_iter()
        .collect();

        let config = ClientConfig::from_toml_str(r#"base_url = "http://file.test""#)
            .unwrap()
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.base_url, "http://env.test");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.token_dir, Some(PathBuf::from("/tmp/gh")));
    }

    #[test]
    fn env_rejects_non_numeric_timeout() {
        let err = ClientConfig::default()
            .apply_env(|key| (key == "GATEHOUSE_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("GATEHOUSE_TIMEOUT_MS"));
    }

    #[test]
    fn environment_only_config_is_validated() {
        let err = ClientConfig::from_lookup(|key| {
            (key == "GATEHOUSE_REFRESH_PATH").then(|| "auth/refresh".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, GatehouseError::Configuration(_)));

        let err = ClientConfig::from_lookup(|key| {
            (key == "GATEHOUSE_TIMEOUT_MS").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("timeout"));

        let config = ClientConfig::from_lookup(|key| {
            (key == "GATEHOUSE_BASE_URL").then(|| "http://env.test".to_string())
        })
        .unwrap();
        assert_eq!(config.base_url, "http://env.test");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = ClientConfig::builder().refresh_path("auth/refresh").build();
        assert!(config.validate().is_err());
        let config = ClientConfig::builder().timeout(Duration::ZERO).build();
        assert!(config.validate().is_err());
        let config = ClientConfig::builder().base_url(" ").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn route_helpers() {
        let config = ClientConfig::default();
        assert!(config.is_refresh_route("/auth/refresh"));
        assert!(config.is_refresh_route("/auth/refresh/"));
        assert!(!config.is_refresh_route("/auth/refresh-all"));
        assert!(config.is_anonymous_route("/auth/login"));
        assert!(!config.is_anonymous_route("/courses"));
    }
}
