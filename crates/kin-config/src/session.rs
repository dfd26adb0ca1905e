//! Session lifecycle configuration.

use serde::{Deserialize, Serialize};

/// Default safety margin subtracted from a token's expiry.
const fn default_expiry_skew_secs() -> i64 {
    60
}

const fn default_restore_on_start() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Seconds before the `exp` claim at which a token is treated as expired.
    #[serde(default = "default_expiry_skew_secs")]
    pub expiry_skew_secs: i64,

    /// Whether `initialize()` restores a persisted token.
    #[serde(default = "default_restore_on_start")]
    pub restore_on_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_skew_secs: default_expiry_skew_secs(),
            restore_on_start: default_restore_on_start(),
        }
    }
}
