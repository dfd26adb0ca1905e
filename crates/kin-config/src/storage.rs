//! Token persistence configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// OS keychain, with a file fallback when the keychain is unavailable.
    #[default]
    Keyring,
    File,
    /// Nothing survives the process.
    Memory,
}

fn default_keyring_service() -> String {
    "kindred".into()
}

fn default_key() -> String {
    "access_token".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Keychain service name. Override in tests to avoid touching real credentials.
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,

    /// Name of the single storage slot holding the bearer token.
    #[serde(default = "default_key")]
    pub key: String,

    /// Explicit file location for the `file` backend and the keyring fallback.
    /// Defaults to `~/.kindred/<key>`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            keyring_service: default_keyring_service(),
            key: default_key(),
            file_path: None,
        }
    }
}

impl StorageConfig {
    /// Resolve the token file path, if a home directory exists.
    pub fn resolved_file_path(&self) -> Option<PathBuf> {
        self.file_path
            .clone()
            .or_else(|| dirs::home_dir().map(|h| h.join(".kindred").join(&self.key)))
    }
}
