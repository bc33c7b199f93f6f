//! Bearer token storage.
//!
//! The upload flow only reads the token and clears it when the backend
//! reports the login as missing or expired. Obtaining a token is out of
//! scope; the CLI's `login` command stores one handed to it.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors from credential persistence.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Source of the bearer token sent with every upload call.
pub trait CredentialStore: Send + Sync {
    /// Returns the current token, if logged in.
    fn token(&self) -> Option<String>;

    fn set_token(&self, token: &str) -> Result<(), CredentialError>;

    /// Forgets the token.
    fn clear(&self) -> Result<(), CredentialError>;
}

/// Token held in memory only.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: &str) -> Result<(), CredentialError> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct CredentialFile {
    token: String,
}

/// Token cached in memory and persisted to a JSON file (mode 0600 on Unix).
pub struct FileCredentialStore {
    path: PathBuf,
    token: RwLock<Option<String>>,
}

impl FileCredentialStore {
    /// Opens the store, loading an existing token from disk.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, CredentialError> {
        let path = path.into();
        let token = load_token(&path)?;
        Ok(Self {
            path,
            token: RwLock::new(token),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: &str) -> Result<(), CredentialError> {
        let json = serde_json::to_string_pretty(&CredentialFile {
            token: token.to_string(),
        })?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        set_permissions_0600(&self.path);

        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        debug!(path = %self.path.display(), "credentials saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "credentials cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn load_token(path: &Path) -> Result<Option<String>, CredentialError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let file: CredentialFile = serde_json::from_str(&data)?;
    Ok(Some(file.token).filter(|t| !t.is_empty()))
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryCredentialStore::new();
        assert!(store.token().is_none());
        store.set_token("abc").unwrap();
        assert_eq!(store.token().as_deref(), Some("abc"));
        store.clear().unwrap();
        assert!(store.token().is_none());
    }

    #[test]
    fn file_store_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("credentials.json");
        {
            let store = FileCredentialStore::new(&path).unwrap();
            assert!(store.token().is_none());
            store.set_token("secret").unwrap();
        }
        let store = FileCredentialStore::new(&path).unwrap();
        assert_eq!(store.token().as_deref(), Some("secret"));
    }

    #[test]
    fn file_store_clear_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("credentials.json");
        let store = FileCredentialStore::new(&path).unwrap();
        store.set_token("secret").unwrap();
        store.clear().unwrap();
        assert!(store.token().is_none());
        assert!(!path.exists());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("credentials.json");
        FileCredentialStore::new(&path).unwrap().set_token("x").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("credentials.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileCredentialStore::new(&path),
            Err(CredentialError::Json(_))
        ));
    }
}
