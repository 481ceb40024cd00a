//! Rate-limit header probe
//!
//! Sends a HEAD request for the preview manifest with the account's bearer
//! token and hands back the status and the raw quota headers. Interpretation
//! (success, stale token, missing limits) is left to the caller.

use reqwest::header::HeaderMap;
use tracing::debug;

use crate::constants::{
    RATELIMIT_LIMIT_HEADER, RATELIMIT_REMAINING_HEADER, RATELIMIT_SOURCE_HEADER,
};
use crate::error::{Error, Result};
use crate::token::Token;

/// Raw values of the three quota headers, if present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// e.g. `100;w=21600`
    pub limit: Option<String>,
    /// e.g. `76;w=21600`
    pub remaining: Option<String>,
    /// Source IP the quota is attributed to
    pub source: Option<String>,
}

impl RateLimitHeaders {
    /// Extract the quota headers from a response header map. Values that are
    /// not valid visible ASCII are treated as absent.
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        Self {
            limit: get(RATELIMIT_LIMIT_HEADER),
            remaining: get(RATELIMIT_REMAINING_HEADER),
            source: get(RATELIMIT_SOURCE_HEADER),
        }
    }
}

/// Status and quota headers of one HEAD probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitsResponse {
    pub status: u16,
    pub headers: RateLimitHeaders,
}

impl LimitsResponse {
    pub fn new(status: u16, headers: RateLimitHeaders) -> Self {
        Self { status, headers }
    }
}

/// Parse the leading integer run of a quota header value.
///
/// `"100;w=21600"` yields `Some(100)`. A value without leading digits (or one
/// that overflows `u64`) yields `None`.
pub fn parse_leading_int(value: &str) -> Option<u64> {
    let value = value.trim_start();
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

/// Probe the limits endpoint with HEAD.
///
/// Any HTTP status is returned as `Ok`; only a failure to get a response at
/// all (connection refused, DNS, timeout) is an error.
pub async fn fetch_rate_limit(
    client: &reqwest::Client,
    limits_url: &str,
    token: &Token,
) -> Result<LimitsResponse> {
    let response = client
        .head(limits_url)
        .bearer_auth(token.expose())
        .send()
        .await
        .map_err(|e| Error::Http(format!("rate limit request failed: {e}")))?;

    let status = response.status().as_u16();
    let headers = RateLimitHeaders::from_header_map(response.headers());
    debug!(status, headers = ?headers, "rate limit endpoint responded");
    Ok(LimitsResponse::new(status, headers))
}
