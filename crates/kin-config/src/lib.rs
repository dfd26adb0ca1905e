//! # kin-config
//!
//! Layered configuration loading for Kindred using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`KINDRED_*` prefix, `__` as separator)
//! 2. Project-level `.kindred/config.toml`
//! 3. User-level `~/.config/kindred/config.toml`
//! 4. Built-in defaults
//!
//! Figment maps `KINDRED_API__BASE_URL` -> `api.base_url`,
//! `KINDRED_SESSION__EXPIRY_SKEW_SECS` -> `session.expiry_skew_secs`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use kin_config::KindredConfig;
//!
//! let config = KindredConfig::load_with_dotenv().expect("config");
//! if config.api.is_configured() {
//!     println!("exchange endpoint: {}", config.api.exchange_url());
//! }
//! ```

mod api;
mod error;
mod session;
mod storage;

pub use api::ApiConfig;
pub use error::ConfigError;
pub use session::SessionConfig;
pub use storage::{StorageBackend, StorageConfig};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KindredConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl KindredConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] for `.env` loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source fails to parse or a value is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(global_path));
        }

        let local_path = PathBuf::from(".kindred/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("KINDRED_").split("__"))
    }

    /// Reject values the session core cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.key".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "api.timeout_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.session.expiry_skew_secs < 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.expiry_skew_secs".into(),
                reason: "must not be negative".into(),
            });
        }
        Ok(())
    }

    /// Error unless the backend API section is usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotConfigured` when `api.base_url` is empty.
    pub fn require_api(&self) -> Result<&ApiConfig, ConfigError> {
        if self.api.is_configured() {
            Ok(&self.api)
        } else {
            Err(ConfigError::NotConfigured {
                section: "api".into(),
            })
        }
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kindred").join("config.toml"))
    }

    /// Walks up from `CARGO_MANIFEST_DIR` (if set) looking for `.env`, then
    /// falls back to the current directory. Missing files are ignored.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            // crate -> crates/ -> workspace root
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}
