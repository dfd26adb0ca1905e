//! The session surface exposed to the rest of the application.

use async_trait::async_trait;
use kin_core::{InvalidationReason, SessionState, UserProfile};
use tokio::sync::watch;

use crate::error::AuthError;
use crate::identity::Credential;
use crate::session::SessionManager;
use crate::token::Token;

/// Point-in-time view of the session, published after every transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub user: Option<UserProfile>,
    pub token: Option<Token>,
    pub is_authenticated: bool,
    /// Set by a forced logout; cleared by the next successful exchange.
    pub reauth_required: bool,
    pub last_invalidation: Option<InvalidationReason>,
    /// `false` when the session only lives in memory.
    pub persistent: bool,
}

impl SessionSnapshot {
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.state.is_loading()
    }
}

/// What UI components depend on. Implemented by [`SessionManager`]; views can
/// be tested against a fake.
#[async_trait]
pub trait SessionConsumer: Send + Sync {
    fn user(&self) -> Option<UserProfile>;

    fn token(&self) -> Option<Token>;

    fn is_authenticated(&self) -> bool;

    fn is_loading(&self) -> bool;

    /// # Errors
    ///
    /// The exchange failure, if any.
    async fn login(&self, credential: Credential) -> Result<Option<Token>, AuthError>;

    fn logout(&self);

    /// # Errors
    ///
    /// The exchange failure, if a refresh was needed and failed.
    async fn get_valid_token(&self) -> Result<Option<Token>, AuthError>;

    fn subscribe(&self) -> watch::Receiver<SessionSnapshot>;
}

#[async_trait]
impl SessionConsumer for SessionManager {
    fn user(&self) -> Option<UserProfile> {
        Self::user(self)
    }

    fn token(&self) -> Option<Token> {
        Self::token(self)
    }

    fn is_authenticated(&self) -> bool {
        Self::is_authenticated(self)
    }

    fn is_loading(&self) -> bool {
        Self::is_loading(self)
    }

    async fn login(&self, credential: Credential) -> Result<Option<Token>, AuthError> {
        Self::login(self, credential).await
    }

    fn logout(&self) {
        Self::logout(self);
    }

    async fn get_valid_token(&self) -> Result<Option<Token>, AuthError> {
        Self::get_valid_token(self).await
    }

    fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        Self::subscribe(self)
    }
}
