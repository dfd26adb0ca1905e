use crate::error::AuthError;
use crate::slot::TokenSlot;
use crate::token::Token;

/// Holds the current bearer token and its persisted copy.
///
/// Storage failures never propagate: they are logged and the store drops to
/// memory-only mode, so the session stays usable for this process.
pub struct TokenStore {
    current: Option<Token>,
    slot: Box<dyn TokenSlot>,
    persistent: bool,
}

impl TokenStore {
    #[must_use]
    pub fn new(slot: Box<dyn TokenSlot>) -> Self {
        Self {
            current: None,
            slot,
            persistent: true,
        }
    }

    #[must_use]
    pub const fn get(&self) -> Option<&Token> {
        self.current.as_ref()
    }

    pub fn set(&mut self, token: Token) {
        if let Err(error) = self.slot.write(token.as_str()) {
            self.degrade(&error);
        }
        self.current = Some(token);
    }

    pub fn clear(&mut self) {
        self.current = None;
        if let Err(error) = self.slot.remove() {
            self.degrade(&error);
        }
    }

    /// Load the persisted token into memory, replacing whatever was held.
    pub fn restore(&mut self) -> Option<&Token> {
        self.current = match self.slot.read() {
            Ok(raw) => raw.map(Token::new),
            Err(error) => {
                self.degrade(&error);
                None
            }
        };
        self.current.as_ref()
    }

    /// Whether `token` is usable: `now < expiry - skew_secs`, fail-closed on
    /// unparsable claims.
    #[must_use]
    pub fn is_valid(token: &Token, skew_secs: i64) -> bool {
        token.is_valid(skew_secs)
    }

    /// Whether the held token is present and valid.
    #[must_use]
    pub fn has_valid(&self, skew_secs: i64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|token| Self::is_valid(token, skew_secs))
    }

    /// `false` once a storage operation has failed.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.persistent
    }

    #[must_use]
    pub fn slot_kind(&self) -> &'static str {
        self.slot.kind()
    }

    fn degrade(&mut self, error: &AuthError) {
        if self.persistent {
            tracing::warn!(
                %error,
                slot = self.slot.kind(),
                "token storage failed; session usable for this process only"
            );
        }
        self.persistent = false;
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("current", &self.current)
            .field("slot", &self.slot.kind())
            .field("persistent", &self.persistent)
            .finish()
    }
}
