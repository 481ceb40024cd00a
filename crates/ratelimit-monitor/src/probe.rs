//! Per-account probe state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! `probe_account` executes the I/O implied by each action against a
//! `Registry`.
//!
//! One probe per account per cycle:
//! 1. HEAD the limits endpoint with the cached token (possibly empty)
//! 2. 200 → done. 401 → fetch a new token, replace the cached one even if the
//!    renewal failed, and HEAD once more
//! 3. A second 401 means the credentials are wrong
//!
//! This bounds a probe to two limits requests and one token request.

use dockerhub_client::{Account, LimitsResponse, Registry, Token};
use tracing::{debug, error, info, warn};

use crate::result::{RateLimitResult, ScrapeFailure};

/// Which limits request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    /// After a token renewal; a 401 here is final
    Retry,
}

/// Probe states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeState {
    /// Waiting for the limits endpoint
    Probing { attempt: Attempt },
    /// Waiting for the token endpoint after a 401
    Renewing,
    /// Limits endpoint accepted the token
    Valid,
    /// Rejected again after renewal
    Invalid,
    /// Unreachable or unexpected status
    Failed,
}

/// Events that drive state transitions.
#[derive(Debug)]
pub enum ProbeEvent {
    /// Limits endpoint answered
    LimitsChecked(LimitsResponse),
    /// Limits endpoint could not be reached
    LimitsUnreachable(String),
    /// Token endpoint answered; carries the empty sentinel when renewal failed
    TokenIssued(Token),
}

/// Actions the driver should execute after a state transition
#[derive(Debug, PartialEq, Eq)]
pub enum ProbeAction {
    /// HEAD the limits endpoint with the current token
    CheckLimits,
    /// Request a new token for the account
    RenewToken,
    /// Probe finished with this result
    Finish(RateLimitResult),
    /// No-op
    None,
}

/// Initial state and action: check limits with whatever token is cached.
pub fn start() -> (ProbeState, ProbeAction) {
    (
        ProbeState::Probing {
            attempt: Attempt::First,
        },
        ProbeAction::CheckLimits,
    )
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: ProbeState, event: ProbeEvent) -> (ProbeState, ProbeAction) {
    match (state, event) {
        // --- Probing ---
        (ProbeState::Probing { .. }, ProbeEvent::LimitsChecked(response))
            if response.status == 200 =>
        {
            (
                ProbeState::Valid,
                ProbeAction::Finish(RateLimitResult::from_headers(&response.headers)),
            )
        }

        (
            ProbeState::Probing {
                attempt: Attempt::First,
            },
            ProbeEvent::LimitsChecked(response),
        ) if response.status == 401 => (ProbeState::Renewing, ProbeAction::RenewToken),

        (
            ProbeState::Probing {
                attempt: Attempt::Retry,
            },
            ProbeEvent::LimitsChecked(response),
        ) if response.status == 401 => (
            ProbeState::Invalid,
            ProbeAction::Finish(RateLimitResult::ScrapeError(
                ScrapeFailure::CredentialsRejected,
            )),
        ),

        (ProbeState::Probing { .. }, ProbeEvent::LimitsChecked(response)) => (
            ProbeState::Failed,
            ProbeAction::Finish(RateLimitResult::ScrapeError(
                ScrapeFailure::UnexpectedStatus(response.status),
            )),
        ),

        (ProbeState::Probing { .. }, ProbeEvent::LimitsUnreachable(_)) => (
            ProbeState::Failed,
            ProbeAction::Finish(RateLimitResult::ScrapeError(ScrapeFailure::Unreachable)),
        ),

        // --- Renewing ---
        (ProbeState::Renewing, ProbeEvent::TokenIssued(_)) => (
            ProbeState::Probing {
                attempt: Attempt::Retry,
            },
            ProbeAction::CheckLimits,
        ),

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, ProbeAction::None),
    }
}

/// Outcome of probing one account: the token to cache and the result.
#[derive(Debug)]
pub struct ProbeOutcome {
    pub token: Token,
    pub result: RateLimitResult,
    pub state: ProbeState,
}

/// Run the probe for `account`, starting from its cached `token`.
///
/// Never fails: registry errors are logged here and folded into the result
/// (unreachable limits endpoint) or the empty token (failed renewal).
pub async fn probe_account<R>(registry: &R, account: &Account, token: Token) -> ProbeOutcome
where
    R: Registry + ?Sized,
{
    let name = account.display_name();
    let mut token = token;
    let (mut state, mut action) = start();

    loop {
        let event = match action {
            ProbeAction::CheckLimits => match registry.fetch_rate_limit(&token).await {
                Ok(response) => ProbeEvent::LimitsChecked(response),
                Err(e) => ProbeEvent::LimitsUnreachable(e.to_string()),
            },
            ProbeAction::RenewToken => {
                token = match registry.fetch_token(account).await {
                    Ok(new_token) => {
                        metrics::counter!("ratelimit_exporter_token_renewals_total", "outcome" => "issued")
                            .increment(1);
                        new_token
                    }
                    Err(e) => {
                        error!(account = name, error = %e, "cannot renew token");
                        metrics::counter!("ratelimit_exporter_token_renewals_total", "outcome" => "failed")
                            .increment(1);
                        Token::empty()
                    }
                };
                ProbeEvent::TokenIssued(token.clone())
            }
            ProbeAction::Finish(result) => {
                log_result(name, &state, &result);
                return ProbeOutcome {
                    token,
                    result,
                    state,
                };
            }
            ProbeAction::None => {
                error!(account = name, state = ?state, "probe stalled in unexpected state");
                return ProbeOutcome {
                    token,
                    result: RateLimitResult::ScrapeError(ScrapeFailure::Unreachable),
                    state,
                };
            }
        };
        log_event(name, &event);
        (state, action) = handle_event(state, event);
    }
}

fn log_event(name: &str, event: &ProbeEvent) {
    match event {
        ProbeEvent::LimitsChecked(response) => {
            debug!(account = name, status = response.status, "rate limits checked")
        }
        ProbeEvent::LimitsUnreachable(reason) => error!(
            account = name,
            error = %reason,
            "connection error while checking rate limits"
        ),
        ProbeEvent::TokenIssued(token) if token.is_empty() => {
            debug!(account = name, "retrying with empty token")
        }
        ProbeEvent::TokenIssued(_) => debug!(account = name, "token renewed"),
    }
}

fn log_result(name: &str, state: &ProbeState, result: &RateLimitResult) {
    match result {
        RateLimitResult::Success {
            limit, remaining, ..
        } => debug!(account = name, limit, remaining, "rate limits collected"),
        RateLimitResult::NoLimitsConfigured => info!(
            account = name,
            "no rate limit headers returned, the account may not have any limits"
        ),
        RateLimitResult::ScrapeError(ScrapeFailure::CredentialsRejected) => warn!(
            account = name,
            "username/password pair is wrong, registry rejected a freshly issued token"
        ),
        RateLimitResult::ScrapeError(ScrapeFailure::UnexpectedStatus(status)) => warn!(
            account = name,
            status,
            "cannot check rate limits, unexpected status"
        ),
        RateLimitResult::ScrapeError(ScrapeFailure::Unreachable) => {
            debug!(account = name, state = ?state, "rate limit check abandoned")
        }
    }
}
