use thiserror::Error;

/// Failures of the session core.
///
/// `Clone` so one settled exchange can be handed to every caller that joined it.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No identity-provider session. Callers normally see this as `Ok(None)`.
    #[error("no identity credential available; sign in first")]
    CredentialUnavailable,

    #[error("credential exchange rejected: {0}")]
    ExchangeRejected(String),

    #[error("network error: {0}")]
    Network(String),

    /// A previously accepted token is no longer accepted by the backend.
    #[error("session no longer authorized: {0}")]
    Unauthorized(String),

    #[error("token storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("identity provider error: {0}")]
    IdentityProvider(String),

    #[error("{0}")]
    Other(String),
}

impl AuthError {
    /// Errors after which the session must be torn down and the user asked to
    /// sign in again.
    #[must_use]
    pub const fn forces_logout(&self) -> bool {
        matches!(self, Self::ExchangeRejected(_) | Self::Unauthorized(_))
    }

    /// Errors recovered locally and retried lazily by the next caller.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::StorageUnavailable(_))
    }
}
