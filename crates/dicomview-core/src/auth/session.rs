use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::api::{AuthResponse, UserInfo};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Persisted session record. Every field is independently optional;
/// an absent access token means "not logged in".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl SessionState {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&AuthResponse> for SessionState {
    fn from(auth: &AuthResponse) -> Self {
        Self {
            access_token: Some(auth.access_token.clone()),
            refresh_token: Some(auth.refresh_token.clone()),
            username: Some(auth.username.clone()),
            display_name: Some(auth.display_name.clone()),
        }
    }
}

/// Where a `Session` persists its state.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<SessionState>;
    fn save(&self, state: &SessionState) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// JSON file in the cache directory.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            path: cache_dir.as_ref().join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<SessionState> {
        if !self.path.exists() {
            return Ok(SessionState::default());
        }
        let contents = std::fs::read_to_string(&self.path)
            .context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    fn save(&self, state: &SessionState) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).context("Failed to create session directory")?;
        let contents = serde_json::to_string_pretty(state)?;
        // Write beside the target and rename so a crash never leaves a torn file
        let mut tmp = NamedTempFile::new_in(dir)
            .context("Failed to create temporary session file")?;
        tmp.write_all(contents.as_bytes())
            .context("Failed to write session file")?;
        tmp.persist(&self.path)
            .context("Failed to replace session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// In-memory store. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<SessionState>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SessionState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// What was last persisted.
    pub fn persisted(&self) -> SessionState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<SessionState> {
        Ok(self.persisted())
    }

    fn save(&self, state: &SessionState) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = state.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = SessionState::default();
        Ok(())
    }
}

/// The one session owned by an `AuthSession`.
///
/// Reads return snapshots; every write goes through to the store. A store
/// failure is logged and the in-memory state stays authoritative.
pub struct Session {
    state: RwLock<SessionState>,
    store: Box<dyn SessionStore>,
}

impl Session {
    /// Create a session, loading any previously persisted state.
    pub fn new(store: impl SessionStore + 'static) -> Self {
        let state = match store.load() {
            Ok(state) => {
                debug!(authenticated = state.access_token.is_some(), "Session loaded");
                state
            }
            Err(e) => {
                warn!(error = %e, "Failed to load session, starting logged out");
                SessionState::default()
            }
        };
        Self {
            state: RwLock::new(state),
            store: Box::new(store),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> SessionState {
        self.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().access_token.is_some()
    }

    pub fn user(&self) -> UserInfo {
        let state = self.read();
        UserInfo {
            username: state.username.clone(),
            display_name: state.display_name.clone(),
        }
    }

    /// Overwrite the whole record.
    pub fn replace(&self, state: SessionState) {
        let mut guard = self.write();
        *guard = state;
        self.persist(&guard);
    }

    /// Overwrite only the token pair, keeping the user identity.
    pub fn update_tokens(&self, access_token: String, refresh_token: String) {
        let mut guard = self.write();
        guard.access_token = Some(access_token);
        guard.refresh_token = Some(refresh_token);
        self.persist(&guard);
    }

    /// Remove all four fields.
    pub fn clear(&self) {
        let mut guard = self.write();
        *guard = SessionState::default();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
    }

    fn persist(&self, state: &SessionState) {
        if let Err(e) = self.store.save(state) {
            warn!(error = %e, "Failed to save session");
        }
    }
}
