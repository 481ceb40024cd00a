//! Registry abstraction over the token and limits endpoints
//!
//! `Registry` decouples the refresh policy from HTTP so the policy can run
//! against a scripted registry in tests. `HttpRegistry` is the production
//! implementation backed by a shared `reqwest::Client`.

use std::future::Future;
use std::pin::Pin;

use crate::account::Account;
use crate::constants::{LIMITS_ENDPOINT, TOKEN_ENDPOINT};
use crate::error::Result;
use crate::limits::{self, LimitsResponse};
use crate::token::{self, Token};

/// Token and limits endpoint pair for one registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEndpoints {
    pub token_url: String,
    pub limits_url: String,
}

impl Default for RegistryEndpoints {
    fn default() -> Self {
        Self {
            token_url: TOKEN_ENDPOINT.to_string(),
            limits_url: LIMITS_ENDPOINT.to_string(),
        }
    }
}

/// The two registry calls the refresh policy needs.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Registry>`).
pub trait Registry: Send + Sync {
    /// Obtain a fresh bearer token for `account`.
    fn fetch_token<'a>(
        &'a self,
        account: &'a Account,
    ) -> Pin<Box<dyn Future<Output = Result<Token>> + Send + 'a>>;

    /// HEAD the limits endpoint with `token`. Errors only when no response
    /// was received.
    fn fetch_rate_limit<'a>(
        &'a self,
        token: &'a Token,
    ) -> Pin<Box<dyn Future<Output = Result<LimitsResponse>> + Send + 'a>>;
}

/// `Registry` implementation speaking HTTP to Docker Hub (or a compatible
/// endpoint pair).
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    endpoints: RegistryEndpoints,
}

impl HttpRegistry {
    pub fn new(client: reqwest::Client, endpoints: RegistryEndpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &RegistryEndpoints {
        &self.endpoints
    }
}

impl Registry for HttpRegistry {
    fn fetch_token<'a>(
        &'a self,
        account: &'a Account,
    ) -> Pin<Box<dyn Future<Output = Result<Token>> + Send + 'a>> {
        Box::pin(token::fetch_token(
            &self.client,
            &self.endpoints.token_url,
            account,
        ))
    }

    fn fetch_rate_limit<'a>(
        &'a self,
        token: &'a Token,
    ) -> Pin<Box<dyn Future<Output = Result<LimitsResponse>> + Send + 'a>> {
        Box::pin(limits::fetch_rate_limit(
            &self.client,
            &self.endpoints.limits_url,
            token,
        ))
    }
}
