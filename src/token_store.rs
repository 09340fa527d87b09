//! Durable storage for the session token.
//!
//! The session survives process restarts until an explicit logout. The token is
//! written as a small TOML file:
//!
//! ```toml
//! token = "eyJhbGciOi..."
//! user_id = 1
//! username = "admin"
//! role = "admin"
//! issued_at = "2025-01-01T00:00:00Z"
//! ```
//!
//! On Unix the file is created with mode 0600.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;
use crate::principal::{Role, UserId};

/// The persisted form of a session.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Bearer token
    pub token: String,
    /// Principal id
    pub user_id: UserId,
    /// Principal username
    pub username: String,
    /// Principal role
    pub role: Role,
    /// When the session was created
    pub issued_at: DateTime<Utc>,
}

impl fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSession")
            .field("token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("role", &self.role)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Storage backend for the current session token.
///
/// Implementations hold at most one session; `save` replaces whatever was
/// stored before.
pub trait TokenStore: Send + Sync {
    /// Returns the stored session, or `None` when nothing is stored.
    fn load(&self) -> Result<Option<StoredSession>, StorageError>;

    /// Persists `session`, replacing any previous one.
    fn save(&self, session: &StoredSession) -> Result<(), StorageError>;

    /// Removes the stored session. Removing nothing is not an error.
    fn clear(&self) -> Result<(), StorageError>;
}

/// Keeps the session in memory only. Used by tests and ephemeral clients.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<StoredSession>>,
}

impl MemoryTokenStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `session`, as if written by a previous run.
    pub fn with_session(session: StoredSession) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<StoredSession>, StorageError> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, session: &StoredSession) -> Result<(), StorageError> {
        *self.slot.lock() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.slot.lock() = None;
        Ok(())
    }
}

/// Stores the session in a TOML file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Uses `path` as the token file. The file is created lazily on `save`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Platform config directory, e.g. `~/.config/console-access/session.toml`.
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "console-access")
            .map(|dirs| dirs.config_dir().join("session.toml"))
            .unwrap_or_else(|| PathBuf::from(".console-access").join("session.toml"))
    }

    /// The token file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn write_private(&self, path: &Path, contents: &str) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;

            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        }

        #[cfg(not(unix))]
        {
            fs::write(path, contents)
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<StoredSession>, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }

        toml::from_str(&contents)
            .map(Some)
            .map_err(|e| StorageError::Corrupted {
                path: self.path.clone(),
                message: e.message().to_string(),
            })
    }

    fn save(&self, session: &StoredSession) -> Result<(), StorageError> {
        let contents =
            toml::to_string_pretty(session).map_err(|e| StorageError::Serialize(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let staging = self.path.with_extension("toml.tmp");
        self.write_private(&staging, &contents)
            .and_then(|()| fs::rename(&staging, &self.path))
            .map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), "session token persisted");
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "session token removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredSession {
        StoredSession {
            token: "tok-abc".to_string(),
            user_id: 1,
            username: "admin".to_string(),
            role: Role::Admin,
            issued_at: "2024-05-01T12:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.load().unwrap(), None);

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));

        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.toml");

        FileTokenStore::new(&path).save(&sample()).unwrap();
        let reopened = FileTokenStore::new(&path);

        assert_eq!(reopened.load().unwrap(), Some(sample()));
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn missing_file_loads_as_none_and_clears_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("absent.toml"));

        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn corrupted_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, "token = ").unwrap();

        let err = FileTokenStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        FileTokenStore::new(&path).save(&sample()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn debug_redacts_token() {
        let output = format!("{:?}", sample());
        assert!(!output.contains("tok-abc"));
        assert!(output.contains("admin"));
    }
}
