use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::error::AuthError;

/// Keys a session is made of.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CredentialKey {
    AccessToken,
    User,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 2] = [CredentialKey::AccessToken, CredentialKey::User];
}

/// Storage abstraction for persisted credentials.
pub trait TokenStore: Send + Sync {
    fn load(&self, key: CredentialKey) -> Result<Option<String>, AuthError>;
    fn save(&self, key: CredentialKey, value: &str) -> Result<(), AuthError>;
    fn clear(&self, key: CredentialKey) -> Result<(), AuthError>;
    /// Remove every credential in as few steps as the backend allows.
    fn clear_all(&self) -> Result<(), AuthError>;
}

/// Configuration for file-backed token storage.
#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    pub base_dir: PathBuf,
}

impl TokenStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_dir() -> PathBuf {
        default_gatehouse_dir()
    }
}

/// File-backed store keeping the whole session in one TOML file.
///
/// # Example
/// ```no_run
/// use gatehouse::auth::{CredentialKey, FileTokenStore, TokenStore};
///
/// let store = FileTokenStore::new_default();
/// store.save(CredentialKey::AccessToken, "header.payload.signature")?;
/// # Ok::<(), gatehouse::auth::AuthError>(())
/// ```
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    lock: RwLock<()>,
}

const SESSION_FILE: &str = "session.toml";
const SESSION_FILE_VERSION: u32 = 1;

impl FileTokenStore {
    pub fn new(config: TokenStoreConfig) -> Self {
        Self {
            path: config.base_dir.join(SESSION_FILE),
            lock: RwLock::new(()),
        }
    }

    pub fn new_default() -> Self {
        Self::new(TokenStoreConfig::new(default_gatehouse_dir()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<Option<SessionFile>, AuthError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        Ok(Some(toml::from_str(&raw)?))
    }

    fn write_file(&self, entries: BTreeMap<String, String>) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = SessionFile {
            version: SESSION_FILE_VERSION,
            saved_at: Utc::now(),
            entries,
        };
        let contents = toml::to_string(&file)?;

        // Readers must only ever see a complete file: write a sibling and
        // rename it into place.
        let tmp = self.path.with_extension(format!("toml.{}.tmp", std::process::id()));
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let written = options.open(&tmp).and_then(|mut out| {
            out.write_all(contents.as_bytes())?;
            out.sync_all()
        });
        if let Err(err) = written.and_then(|()| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), AuthError> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_file()?.map(|f| f.entries).unwrap_or_default();
        apply(&mut entries);
        self.write_file(entries)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, key: CredentialKey) -> Result<Option<String>, AuthError> {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        Ok(self
            .read_file()?
            .and_then(|mut file| file.entries.remove(&key.to_string())))
    }

    fn save(&self, key: CredentialKey, value: &str) -> Result<(), AuthError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn clear(&self, key: CredentialKey) -> Result<(), AuthError> {
        self.update(|entries| {
            entries.remove(&key.to_string());
        })
    }

    fn clear_all(&self) -> Result<(), AuthError> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    saved_at: DateTime<Utc>,
    entries: BTreeMap<String, String>,
}

fn default_gatehouse_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".gatehouse"))
        .unwrap_or_else(|| PathBuf::from(".gatehouse"))
}

/// In-memory store for tests and short-lived processes.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<CredentialKey, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::default();
        store
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(CredentialKey::AccessToken, token.into());
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, key: CredentialKey) -> Result<Option<String>, AuthError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned())
    }

    fn save(&self, key: CredentialKey, value: &str) -> Result<(), AuthError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value.to_string());
        Ok(())
    }

    fn clear(&self, key: CredentialKey) -> Result<(), AuthError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
        Ok(())
    }

    fn clear_all(&self) -> Result<(), AuthError> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }
}

/// Session view over a [`TokenStore`].
///
/// Storage failures are logged and reported as `false`/`None`; they never
/// reach the caller as errors.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn TokenStore>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(backend: Arc<dyn TokenStore>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn TokenStore> {
        &self.backend
    }

    /// Current access token; empty values count as absent.
    pub fn token(&self) -> Option<String> {
        match self.backend.load(CredentialKey::AccessToken) {
            Ok(token) => token.filter(|t| !t.trim().is_empty()),
            Err(error) => {
                tracing::warn!(%error, "Failed to read access token");
                None
            }
        }
    }

    /// Store a new access token. Empty tokens are refused so a bad response
    /// cannot silently wipe a valid session.
    pub fn set_token(&self, token: &str) -> bool {
        if token.trim().is_empty() {
            tracing::warn!(error = %AuthError::EmptyToken, "Refusing to store access token");
            return false;
        }
        match self.backend.save(CredentialKey::AccessToken, token) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "Failed to store access token");
                false
            }
        }
    }

    pub fn remove_token(&self) -> bool {
        match self.backend.clear(CredentialKey::AccessToken) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "Failed to remove access token");
                false
            }
        }
    }

    /// Cached user context, if any was stored.
    pub fn user(&self) -> Option<serde_json::Value> {
        let raw = match self.backend.load(CredentialKey::User) {
            Ok(raw) => raw?,
            Err(error) => {
                tracing::warn!(%error, "Failed to read user context");
                return None;
            }
        };
        serde_json::from_str(&raw)
            .map_err(|error| tracing::warn!(%error, "Discarding unreadable user context"))
            .ok()
    }

    pub fn set_user(&self, user: &serde_json::Value) -> bool {
        match self.backend.save(CredentialKey::User, &user.to_string()) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "Failed to store user context");
                false
            }
        }
    }

    /// Drop every credential and user-context key.
    pub fn clear_session(&self) -> bool {
        match self.backend.clear_all() {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "Bulk clear failed, clearing keys one by one");
                CredentialKey::ALL
                    .iter()
                    .fold(true, |ok, key| self.backend.clear(*key).is_ok() && ok)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, FileTokenStore) {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(TokenStoreConfig::new(dir.path().to_path_buf()));
        (dir, store)
    }

    struct BrokenStore;

    impl TokenStore for BrokenStore {
        fn load(&self, _key: CredentialKey) -> Result<Option<String>, AuthError> {
            Err(AuthError::Unavailable("disk gone".into()))
        }
        fn save(&self, _key: CredentialKey, _value: &str) -> Result<(), AuthError> {
            Err(AuthError::Unavailable("disk gone".into()))
        }
        fn clear(&self, _key: CredentialKey) -> Result<(), AuthError> {
            Err(AuthError::Unavailable("disk gone".into()))
        }
        fn clear_all(&self) -> Result<(), AuthError> {
            Err(AuthError::Unavailable("disk gone".into()))
        }
    }

    #[test]
    fn file_store_keeps_entries_side_by_side() {
        let (_dir, store) = temp_store();
        store.save(CredentialKey::AccessToken, "tok").unwrap();
        store.save(CredentialKey::User, r#"{"id":1}"#).unwrap();

        assert_eq!(store.load(CredentialKey::AccessToken).unwrap().as_deref(), Some("tok"));
        assert_eq!(store.load(CredentialKey::User).unwrap().as_deref(), Some(r#"{"id":1}"#));

        store.clear(CredentialKey::User).unwrap();
        assert!(store.load(CredentialKey::User).unwrap().is_none());
        assert!(store.load(CredentialKey::AccessToken).unwrap().is_some());
    }

    #[test]
    fn file_store_clear_all_removes_file() {
        let (_dir, store) = temp_store();
        store.save(CredentialKey::AccessToken, "tok").unwrap();
        assert!(store.path().exists());

        store.clear_all().unwrap();
        assert!(!store.path().exists());
        assert!(store.load(CredentialKey::AccessToken).unwrap().is_none());
        store.clear_all().unwrap();
    }

    #[test]
    fn file_store_reads_never_observe_partial_writes() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (dir, writer) = temp_store();
        // A second handle on the same file shares no lock with the writer,
        // like another client process would.
        let reader = FileTokenStore::new(TokenStoreConfig::new(dir.path().to_path_buf()));
        writer.save(CredentialKey::AccessToken, "live-token").unwrap();
        let session = SessionStore::new(Arc::new(reader));
        let done = AtomicBool::new(false);

        let mut misses = 0;
        std::thread::scope(|scope| {
            scope.spawn(|| {
                while !done.load(Ordering::Relaxed) {
                    writer.save(CredentialKey::AccessToken, "live-token").unwrap();
                    writer.save(CredentialKey::User, r#"{"id":1}"#).unwrap();
                }
            });
            for _ in 0..2_000 {
                if session.token().as_deref() != Some("live-token") {
                    misses += 1;
                }
                if !matches!(writer.load(CredentialKey::AccessToken), Ok(Some(_))) {
                    misses += 1;
                }
            }
            done.store(true, Ordering::Relaxed);
        });
        assert_eq!(misses, 0);

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name.to_str() != Some(SESSION_FILE))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn file_store_reports_corrupt_file() {
        let (_dir, store) = temp_store();
        fs::write(store.path(), "not = [valid").unwrap();
        assert!(matches!(
            store.load(CredentialKey::AccessToken),
            Err(AuthError::Serialization(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = temp_store();
        store.save(CredentialKey::AccessToken, "tok").unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn session_store_refuses_empty_token() {
        let session = SessionStore::new(Arc::new(MemoryTokenStore::with_token("valid")));
        assert!(!session.set_token(""));
        assert!(!session.set_token("   "));
        assert_eq!(session.token().as_deref(), Some("valid"));
    }

    #[test]
    fn session_store_degrades_on_backend_failure() {
        let session = SessionStore::new(Arc::new(BrokenStore));
        assert_eq!(session.token(), None);
        assert!(!session.set_token("tok"));
        assert!(!session.remove_token());
        assert!(session.user().is_none());
        assert!(!session.clear_session());
    }

    #[test]
    fn session_store_round_trips_user_context() {
        let session = SessionStore::new(Arc::new(MemoryTokenStore::new()));
        let user = serde_json::json!({"id": 3, "name": "Ada"});
        assert!(session.set_user(&user));
        assert_eq!(session.user(), Some(user));
    }

    #[test]
    fn clear_session_drops_everything() {
        let session = SessionStore::new(Arc::new(MemoryTokenStore::with_token("tok")));
        session.set_user(&serde_json::json!({"id": 1}));
        assert!(session.clear_session());
        assert!(session.token().is_none());
        assert!(session.user().is_none());
    }
}
