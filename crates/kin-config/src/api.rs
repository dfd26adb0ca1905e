//! Backend API endpoints used by the session core.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_exchange_path() -> String {
    "/auth/exchange".into()
}

fn default_current_user_path() -> String {
    "/users/me".into()
}

/// Request timeout applied by the HTTP layer; the session core adds none.
const fn default_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Backend base URL (e.g., `https://api.example.com`).
    #[serde(default)]
    pub base_url: String,

    /// Path of the credential exchange endpoint.
    #[serde(default = "default_exchange_path")]
    pub exchange_path: String,

    /// Path of the current-user endpoint.
    #[serde(default = "default_current_user_path")]
    pub current_user_path: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            exchange_path: default_exchange_path(),
            current_user_path: default_current_user_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    pub fn exchange_url(&self) -> String {
        join_url(&self.base_url, &self.exchange_path)
    }

    pub fn current_user_url(&self) -> String {
        join_url(&self.base_url, &self.current_user_path)
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
