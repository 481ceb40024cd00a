//! Docker Hub registry client for rate-limit probing
//!
//! Implements the two-step registry protocol used to read an account's pull
//! quota without spending it:
//! 1. `token::fetch_token()` obtains a short-lived bearer token from the auth
//!    service (HTTP Basic auth for named accounts, no auth for anonymous)
//! 2. `limits::fetch_rate_limit()` sends a HEAD request for a manifest and
//!    returns the status plus the raw `ratelimit-*` headers
//!
//! The `Registry` trait wraps both calls so callers can substitute a scripted
//! registry in tests. Accounts are loaded from a secrets directory via
//! `AccountSet::load_dir()`.

pub mod account;
pub mod constants;
pub mod error;
pub mod limits;
pub mod registry;
pub mod token;

pub use account::{Account, AccountSet, display_name};
pub use constants::*;
pub use error::{Error, Result};
pub use limits::{LimitsResponse, RateLimitHeaders, fetch_rate_limit, parse_leading_int};
pub use registry::{HttpRegistry, Registry, RegistryEndpoints};
pub use token::{Token, TokenResponse, fetch_token};
