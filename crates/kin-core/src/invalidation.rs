use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Why a session is being torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    /// An API call was rejected with 401/403.
    Unauthorized,
    /// The backend reported the token as revoked.
    TokenRevoked,
    /// The user asked to sign out.
    UserRequested,
    Other(String),
}

impl InvalidationReason {
    /// Whether the user must be shown a "please sign in again" prompt.
    #[must_use]
    pub const fn requires_reauth(&self) -> bool {
        !matches!(self, Self::UserRequested)
    }
}

impl From<&str> for InvalidationReason {
    fn from(value: &str) -> Self {
        match value {
            "unauthorized" => Self::Unauthorized,
            "token_revoked" | "revoked" => Self::TokenRevoked,
            "user_requested" | "logout" => Self::UserRequested,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => f.write_str("unauthorized"),
            Self::TokenRevoked => f.write_str("token_revoked"),
            Self::UserRequested => f.write_str("user_requested"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}
