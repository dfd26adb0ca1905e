//! Identity-provider seam.
//!
//! The provider (sign-in UI, password/Google/email flows) lives outside the
//! session core. The core only consumes raw credentials and state changes.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::AuthError;

/// Opaque identity-provider artifact, typically a short-lived provider ID token.
///
/// Borrowed by the session manager for the duration of one exchange; never
/// persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw value, for the exchange request only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Provider-side state changes.
#[derive(Debug, Clone)]
pub enum IdentityEvent {
    /// The provider holds a signed-in identity.
    SignedIn(Credential),
    SignedOut,
}

#[async_trait]
pub trait IdentityAdapter: Send + Sync {
    /// Subscribe to provider state changes.
    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent>;

    /// Current raw credential, `None` when no identity is signed in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::IdentityProvider` if the provider cannot be queried.
    async fn raw_credential(&self) -> Result<Option<Credential>, AuthError>;

    /// Sign out of the provider.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::IdentityProvider` on provider failure.
    async fn sign_out(&self) -> Result<(), AuthError>;
}
