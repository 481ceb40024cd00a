//! Per-account bearer token cache
//!
//! Holds exactly one token per account for the process lifetime. Entries start
//! empty and are replaced whenever a probe renews them. Only the refresh loop
//! touches the cache, and it processes accounts sequentially, so there is no
//! locking and no concurrent renewal of the same account.

use std::collections::HashMap;

use dockerhub_client::{Account, AccountSet, Registry, Token};

use crate::probe::probe_account;
use crate::result::RateLimitResult;

pub struct TokenCache {
    tokens: HashMap<String, Token>,
}

impl TokenCache {
    /// Create a cache with an empty token for every account.
    pub fn new(accounts: &AccountSet) -> Self {
        let tokens = accounts
            .iter()
            .map(|account| (account.id().to_string(), Token::empty()))
            .collect();
        Self { tokens }
    }

    /// Token currently cached for `account_id` (empty if none was issued yet).
    pub fn current(&self, account_id: &str) -> Token {
        self.tokens.get(account_id).cloned().unwrap_or_default()
    }

    /// Replace the cached token for `account_id`.
    pub fn store(&mut self, account_id: &str, token: Token) {
        self.tokens.insert(account_id.to_string(), token);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Probe `account` with its cached token and keep whatever token the
    /// probe ended with.
    pub async fn refresh<R>(&mut self, registry: &R, account: &Account) -> RateLimitResult
    where
        R: Registry + ?Sized,
    {
        let cached = self.current(account.id());
        let outcome = probe_account(registry, account, cached).await;
        self.store(account.id(), outcome.token);
        outcome.result
    }
}
