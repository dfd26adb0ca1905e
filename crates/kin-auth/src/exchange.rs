//! Backend collaborators: credential exchange and current-user lookup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kin_core::UserProfile;
use serde::Deserialize;

use crate::error::AuthError;
use crate::identity::Credential;
use crate::token::Token;

/// Successful exchange response.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeGrant {
    pub token: String,
    /// Expiry reported by the backend. Informational: validity is always
    /// decided from the token's own `exp` claim.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Profile, when the backend returns it alongside the token.
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl ExchangeGrant {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
            user: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: UserProfile) -> Self {
        self.user = Some(user);
        self
    }
}

impl std::fmt::Debug for ExchangeGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeGrant")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Trade an identity credential for a backend bearer token.
    ///
    /// # Errors
    ///
    /// `AuthError::ExchangeRejected` for an invalid or expired credential,
    /// `AuthError::Network` for transport failures and timeouts.
    async fn exchange(&self, credential: &Credential) -> Result<ExchangeGrant, AuthError>;
}

#[async_trait]
pub trait CurrentUserClient: Send + Sync {
    /// Fetch the profile the token belongs to.
    ///
    /// # Errors
    ///
    /// `AuthError::Unauthorized` if the backend rejects the token,
    /// `AuthError::Network` for transport failures.
    async fn fetch(&self, token: &Token) -> Result<UserProfile, AuthError>;
}
