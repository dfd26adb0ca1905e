//! The single persistent slot holding the raw bearer token.
//!
//! Only the raw token string is persisted; the user profile is always
//! refetched on restore.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kin_config::{StorageBackend, StorageConfig};
use parking_lot::Mutex;

use crate::error::AuthError;

/// Synchronous key-value slot for the bearer token.
pub trait TokenSlot: Send + Sync {
    /// Read the persisted token. Missing or empty content is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StorageUnavailable` if the backing store cannot be read.
    fn read(&self) -> Result<Option<String>, AuthError>;

    /// Replace the persisted token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StorageUnavailable` if the backing store cannot be written.
    fn write(&self, token: &str) -> Result<(), AuthError>;

    /// Delete the persisted token. Removing an absent token succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StorageUnavailable` if the backing store cannot be written.
    fn remove(&self) -> Result<(), AuthError>;

    /// Short name for status display.
    fn kind(&self) -> &'static str;
}

/// Build the slot selected by configuration.
#[must_use]
pub fn slot_from_config(config: &StorageConfig) -> Box<dyn TokenSlot> {
    let file = config.resolved_file_path().map(FileSlot::new);
    match (config.backend, file) {
        (StorageBackend::Keyring, file) => Box::new(KeyringSlot::new(
            &config.keyring_service,
            &config.key,
            file,
        )),
        (StorageBackend::File, Some(file)) => Box::new(file),
        (StorageBackend::File, None) => {
            tracing::warn!("home directory not found; token will not survive this process");
            Box::new(MemorySlot::default())
        }
        (StorageBackend::Memory, _) => Box::new(MemorySlot::default()),
    }
}

/// OS keychain entry, falling back to a file when the keychain is unavailable.
pub struct KeyringSlot {
    service: String,
    key: String,
    fallback: Option<FileSlot>,
}

impl KeyringSlot {
    #[must_use]
    pub fn new(service: &str, key: &str, fallback: Option<FileSlot>) -> Self {
        Self {
            service: service.to_string(),
            key: key.to_string(),
            fallback,
        }
    }

    fn entry(&self) -> Result<keyring::Entry, keyring::Error> {
        keyring::Entry::new(&self.service, &self.key)
    }

    fn fallback(&self) -> Result<&FileSlot, AuthError> {
        self.fallback.as_ref().ok_or_else(|| {
            AuthError::StorageUnavailable("keyring unavailable and no fallback file".into())
        })
    }
}

impl TokenSlot for KeyringSlot {
    fn read(&self) -> Result<Option<String>, AuthError> {
        if let Ok(entry) = self.entry()
            && let Ok(token) = entry.get_password()
            && !token.is_empty()
        {
            return Ok(Some(token));
        }
        match &self.fallback {
            Some(file) => file.read(),
            None => Ok(None),
        }
    }

    fn write(&self, token: &str) -> Result<(), AuthError> {
        match self.entry() {
            Ok(entry) => match entry.set_password(token) {
                Ok(()) => Ok(()),
                Err(error) => {
                    tracing::warn!(%error, "keyring store failed; falling back to file");
                    self.fallback()?.write(token)
                }
            },
            Err(error) => {
                tracing::warn!(%error, "keyring unavailable; falling back to file");
                self.fallback()?.write(token)
            }
        }
    }

    fn remove(&self) -> Result<(), AuthError> {
        // Both locations are cleared; a missing keyring entry is not an error.
        if let Ok(entry) = self.entry() {
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(error) => tracing::debug!(%error, "keyring delete failed"),
            }
        }
        match &self.fallback {
            Some(file) => file.remove(),
            None => Ok(()),
        }
    }

    fn kind(&self) -> &'static str {
        "keyring"
    }
}

/// Token stored in a single file (`0600`, parent `0700` on unix).
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenSlot for FileSlot {
    fn read(&self) -> Result<Option<String>, AuthError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuthError::StorageUnavailable(format!(
                "read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn write(&self, token: &str) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AuthError::StorageUnavailable(format!("mkdir {}: {e}", parent.display()))
            })?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(parent, fs::Permissions::from_mode(0o700)) {
                    tracing::warn!("failed to chmod 0700 {}: {e}", parent.display());
                }
            }
        }
        fs::write(&self.path, token).map_err(|e| {
            AuthError::StorageUnavailable(format!("write {}: {e}", self.path.display()))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600)).map_err(|e| {
                AuthError::StorageUnavailable(format!("chmod {}: {e}", self.path.display()))
            })?;
        }

        Ok(())
    }

    fn remove(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::StorageUnavailable(format!(
                "delete {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

/// In-process slot. Clones share the same value.
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    value: Arc<Mutex<Option<String>>>,
}

impl MemorySlot {
    #[must_use]
    pub fn with_token(token: &str) -> Self {
        Self {
            value: Arc::new(Mutex::new(Some(token.to_string()))),
        }
    }

    /// Current persisted value.
    #[must_use]
    pub fn peek(&self) -> Option<String> {
        self.value.lock().clone()
    }
}

impl TokenSlot for MemorySlot {
    fn read(&self) -> Result<Option<String>, AuthError> {
        Ok(self.peek())
    }

    fn write(&self, token: &str) -> Result<(), AuthError> {
        *self.value.lock() = Some(token.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<(), AuthError> {
        *self.value.lock() = None;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
