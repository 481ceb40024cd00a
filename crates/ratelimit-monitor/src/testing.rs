//! Scripted registry for exercising the refresh policy without a network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use dockerhub_client::{
    Account, Error, LimitsResponse, RateLimitHeaders, Registry, Result, Token,
};

/// One recorded registry call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Token requested for this account id
    Token(String),
    /// Limits checked with this token
    Limits(String),
}

/// Registry whose answers depend on the token presented.
///
/// Tokens registered with `respond` get the configured response; any other
/// token (including the empty one) gets 401. Token requests pop the next
/// scripted answer for the account, or fail with 401 when none is left.
#[derive(Default)]
pub struct ScriptedRegistry {
    responses: Mutex<HashMap<String, LimitsResponse>>,
    issued: Mutex<HashMap<String, VecDeque<Result<Token>>>>,
    unreachable: AtomicBool,
    refused: Mutex<HashSet<String>>,
    stalled: AtomicBool,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, token: &str, response: LimitsResponse) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(token.to_string(), response);
        self
    }

    pub fn issue(self, account_id: &str, token: Result<Token>) -> Self {
        self.issued
            .lock()
            .unwrap()
            .entry(account_id.to_string())
            .or_default()
            .push_back(token);
        self
    }

    /// Make every limits request fail as if the registry were down.
    pub fn unreachable(self) -> Self {
        self.unreachable.store(true, Ordering::SeqCst);
        self
    }

    /// Make limits requests carrying `token` fail as if the connection dropped.
    pub fn refuse_connections_for(self, token: &str) -> Self {
        self.refused.lock().unwrap().insert(token.to_string());
        self
    }

    /// From now on, record limits requests but never answer them.
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    /// Invalidate a token between cycles.
    pub fn revoke(&self, token: &str) {
        self.responses.lock().unwrap().remove(token);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl Registry for ScriptedRegistry {
    fn fetch_token<'a>(
        &'a self,
        account: &'a Account,
    ) -> Pin<Box<dyn Future<Output = Result<Token>> + Send + 'a>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Token(account.id().to_string()));
            self.issued
                .lock()
                .unwrap()
                .get_mut(account.id())
                .and_then(VecDeque::pop_front)
                .unwrap_or(Err(Error::TokenRejected(401)))
        })
    }

    fn fetch_rate_limit<'a>(
        &'a self,
        token: &'a Token,
    ) -> Pin<Box<dyn Future<Output = Result<LimitsResponse>> + Send + 'a>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Limits(token.expose().to_string()));
            if self.stalled.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.unreachable.load(Ordering::SeqCst)
                || self.refused.lock().unwrap().contains(token.expose())
            {
                return Err(Error::Http("connection refused".into()));
            }
            Ok(self
                .responses
                .lock()
                .unwrap()
                .get(token.expose())
                .cloned()
                .unwrap_or_else(|| LimitsResponse::new(401, RateLimitHeaders::default())))
        })
    }
}

/// 200 response carrying both quota headers and a source address.
pub fn limited(limit: u64, remaining: u64, source: &str) -> LimitsResponse {
    LimitsResponse::new(
        200,
        RateLimitHeaders {
            limit: Some(format!("{limit};w=21600")),
            remaining: Some(format!("{remaining};w=21600")),
            source: Some(source.to_string()),
        },
    )
}

/// 200 response without quota headers.
pub fn unlimited() -> LimitsResponse {
    LimitsResponse::new(200, RateLimitHeaders::default())
}

/// Registry that never answers, for cancellation tests.
pub struct StalledRegistry;

impl Registry for StalledRegistry {
    fn fetch_token<'a>(
        &'a self,
        _account: &'a Account,
    ) -> Pin<Box<dyn Future<Output = Result<Token>> + Send + 'a>> {
        Box::pin(std::future::pending())
    }

    fn fetch_rate_limit<'a>(
        &'a self,
        _token: &'a Token,
    ) -> Pin<Box<dyn Future<Output = Result<LimitsResponse>> + Send + 'a>> {
        Box::pin(std::future::pending())
    }
}
