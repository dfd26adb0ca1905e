use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Session lifecycle states.
///
/// `Uninitialized → Restoring → {Authenticated, Anonymous}`, with
/// `Refreshing` entered from either settled state while an exchange is in
/// flight. Logout always lands in `Anonymous`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Uninitialized,
    Restoring,
    Authenticated,
    Anonymous,
    Refreshing,
}

impl SessionState {
    /// Whether the UI should show a loading indicator.
    #[must_use]
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Restoring | Self::Refreshing)
    }

    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Whether `self → to` is an allowed transition.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            // logout may happen from anywhere
            (_, Self::Anonymous) => true,
            (Self::Uninitialized, Self::Restoring)
            | (Self::Restoring, Self::Authenticated)
            | (
                Self::Uninitialized | Self::Restoring | Self::Authenticated | Self::Anonymous,
                Self::Refreshing,
            )
            | (Self::Refreshing | Self::Authenticated, Self::Authenticated) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Restoring => "restoring",
            Self::Authenticated => "authenticated",
            Self::Anonymous => "anonymous",
            Self::Refreshing => "refreshing",
        };
        f.write_str(s)
    }
}
