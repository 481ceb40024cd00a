//! Bearer token retrieval
//!
//! Docker Hub issues short-lived pull tokens from `auth.docker.io`. Named
//! accounts authenticate with HTTP Basic auth; the anonymous account sends no
//! credentials and receives a token scoped to its source IP.

use common::Secret;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::account::Account;
use crate::error::{Error, Result};

/// Opaque bearer token for one account.
///
/// The empty token means "no token yet". It is sent as-is; the registry
/// answers 401 and the caller renews it.
#[derive(Debug, Clone, Default)]
pub struct Token(Secret<String>);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Secret::new(value.into()))
    }

    /// The "no token yet" sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expose(&self) -> &str {
        self.0.expose()
    }
}

/// Body returned by the token endpoint.
///
/// Only `token` is required; the other fields are informational.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub issued_at: Option<String>,
}

/// Request a fresh bearer token for `account`.
///
/// Only an HTTP 200 with a JSON body carrying `token` succeeds. Every other
/// status, a malformed body or a connection failure is an error; callers
/// degrade to `Token::empty()` and log it.
pub async fn fetch_token(
    client: &reqwest::Client,
    token_url: &str,
    account: &Account,
) -> Result<Token> {
    let mut request = client.get(token_url);
    if !account.is_anonymous() {
        request = request.basic_auth(account.id(), Some(account.password().expose()));
    }

    let response = request
        .send()
        .await
        .map_err(|e| Error::Http(format!("token request failed: {e}")))?;

    let status = response.status();
    debug!(account = account.display_name(), status = status.as_u16(), "token endpoint responded");
    if status != StatusCode::OK {
        return Err(Error::TokenRejected(status.as_u16()));
    }

    let body = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenResponse(e.to_string()))?;
    debug!(
        account = account.display_name(),
        expires_in = ?body.expires_in,
        issued_at = ?body.issued_at,
        "token issued"
    );
    Ok(Token::new(body.token))
}
