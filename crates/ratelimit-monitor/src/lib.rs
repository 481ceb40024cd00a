//! Rate-limit monitoring core
//!
//! Polls every configured Docker Hub account once per interval and publishes
//! the rendered Prometheus text as an immutable snapshot. The pieces:
//!
//! 1. `probe`: pure per-account state machine: check limits with the cached
//!    token, renew it once on 401, classify the outcome
//! 2. `tokens`: one bearer token per account, carried across cycles
//! 3. `render`: turns per-account results into the three gauge families
//! 4. `snapshot`: single-writer / many-reader slot holding the latest text
//! 5. `refresh`: background task running full passes and publishing them
//!
//! Accounts are processed one at a time, so at most one registry request is
//! in flight and the token cache needs no locking.

pub mod probe;
pub mod refresh;
pub mod render;
pub mod result;
pub mod snapshot;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;

pub use probe::{ProbeOutcome, probe_account};
pub use refresh::{RefreshLoop, spawn_refresh_task};
pub use render::{MetricsRenderer, configure_labels_set, render};
pub use result::{RateLimitResult, ScrapeFailure};
pub use snapshot::{MetricsSnapshot, SnapshotPublisher, SnapshotReader, snapshot_channel};
pub use tokens::TokenCache;
