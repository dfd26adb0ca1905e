//! `reqwest` implementations of the backend collaborators.

use async_trait::async_trait;
use kin_config::ApiConfig;
use kin_core::UserProfile;
use reqwest::StatusCode;

use crate::error::AuthError;
use crate::exchange::{CurrentUserClient, ExchangeClient, ExchangeGrant};
use crate::identity::Credential;
use crate::token::Token;

fn build_client(config: &ApiConfig) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| AuthError::Other(format!("build HTTP client: {e}")))
}

fn transport_error(context: &str, error: &reqwest::Error) -> AuthError {
    if error.is_timeout() {
        AuthError::Network(format!("{context}: request timed out"))
    } else {
        AuthError::Network(format!("{context}: {error}"))
    }
}

const fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

/// `POST {base}{exchange_path}` with the provider credential as bearer.
#[derive(Debug, Clone)]
pub struct HttpExchangeClient {
    client: reqwest::Client,
    url: String,
}

impl HttpExchangeClient {
    /// # Errors
    ///
    /// Returns `AuthError::Other` if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, AuthError> {
        Ok(Self {
            client: build_client(config)?,
            url: config.exchange_url(),
        })
    }
}

#[async_trait]
impl ExchangeClient for HttpExchangeClient {
    async fn exchange(&self, credential: &Credential) -> Result<ExchangeGrant, AuthError> {
        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", credential.expose()))
            .send()
            .await
            .map_err(|e| transport_error("exchange", &e))?;

        let status = resp.status();
        if is_auth_failure(status) {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::ExchangeRejected(format!("HTTP {status}: {body}")));
        }
        if !status.is_success() {
            return Err(AuthError::Network(format!("exchange: HTTP {status}")));
        }

        resp.json::<ExchangeGrant>()
            .await
            .map_err(|e| AuthError::Other(format!("parse exchange response: {e}")))
    }
}

/// `GET {base}{current_user_path}` with the backend token as bearer.
#[derive(Debug, Clone)]
pub struct HttpCurrentUserClient {
    client: reqwest::Client,
    url: String,
}

impl HttpCurrentUserClient {
    /// # Errors
    ///
    /// Returns `AuthError::Other` if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, AuthError> {
        Ok(Self {
            client: build_client(config)?,
            url: config.current_user_url(),
        })
    }
}

#[async_trait]
impl CurrentUserClient for HttpCurrentUserClient {
    async fn fetch(&self, token: &Token) -> Result<UserProfile, AuthError> {
        let resp = self
            .client
            .get(&self.url)
            .header("Authorization", token.bearer())
            .send()
            .await
            .map_err(|e| transport_error("current user", &e))?;

        let status = resp.status();
        if is_auth_failure(status) {
            return Err(AuthError::Unauthorized(format!("current user: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(AuthError::Network(format!("current user: HTTP {status}")));
        }

        resp.json::<UserProfile>()
            .await
            .map_err(|e| AuthError::Other(format!("parse current user: {e}")))
    }
}
