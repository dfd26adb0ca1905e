use base64::Engine as _;
use chrono::{DateTime, TimeDelta, Utc};

use crate::error::AuthError;

/// A backend bearer token and the expiry decoded from its `exp` claim.
///
/// Immutable: a refresh produces a new `Token`. The raw value is redacted from
/// `Debug` output so it never reaches logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    raw: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Wrap a raw bearer string, decoding its expiry.
    ///
    /// A token whose claims cannot be decoded is still constructed, but has no
    /// expiry and is never valid.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let expires_at = match decode_expiry(&raw) {
            Ok(exp) => Some(exp),
            Err(error) => {
                tracing::debug!(%error, "token expiry could not be decoded; treating as expired");
                None
            }
        };
        Self { raw, expires_at }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Decoded `exp` claim, `None` if the claims were unparsable.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// `now < expiry - skew`. Unparsable expiry is never valid.
    #[must_use]
    pub fn is_valid(&self, skew_secs: i64) -> bool {
        self.is_valid_at(Utc::now(), skew_secs)
    }

    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>, skew_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|exp| now < exp - TimeDelta::seconds(skew_secs))
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.raw)
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("raw", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Decode the JWT `exp` claim without verifying the signature.
///
/// Signature verification is the backend's job; this is only used to decide
/// when to refresh.
///
/// # Errors
///
/// Returns `AuthError::InvalidToken` if the JWT format is invalid or the `exp`
/// claim is missing or cannot be parsed.
pub fn decode_expiry(jwt: &str) -> Result<DateTime<Utc>, AuthError> {
    let parts: Vec<&str> = jwt.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::InvalidToken("invalid JWT format".into()));
    }
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken(format!("base64 decode failed: {e}")))?;
    let value: serde_json::Value = serde_json::from_slice(&payload)
        .map_err(|e| AuthError::InvalidToken(format!("JSON parse failed: {e}")))?;
    let exp = value["exp"]
        .as_i64()
        .ok_or_else(|| AuthError::InvalidToken("missing exp claim".into()))?;
    DateTime::from_timestamp(exp, 0)
        .ok_or_else(|| AuthError::InvalidToken("invalid exp timestamp".into()))
}
