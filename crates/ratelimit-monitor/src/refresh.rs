//! Background refresh loop
//!
//! Runs one full pass over every account, publishes the rendered snapshot,
//! then sleeps for the configured interval. The first pass starts right away
//! so `/metrics` leaves the placeholder as soon as possible. A shutdown signal
//! interrupts either the pass or the sleep; an interrupted pass is discarded
//! and the previous snapshot stays published.

use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};

use dockerhub_client::{AccountSet, Registry};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::render::MetricsRenderer;
use crate::snapshot::{MetricsSnapshot, SnapshotPublisher};
use crate::tokens::TokenCache;

/// Owns everything a pass needs. Moved into the background task by
/// [`spawn_refresh_task`].
pub struct RefreshLoop {
    registry: Arc<dyn Registry>,
    accounts: AccountSet,
    tokens: TokenCache,
    publisher: SnapshotPublisher,
    interval: Duration,
    put_source_ip: bool,
}

impl RefreshLoop {
    pub fn new(
        registry: Arc<dyn Registry>,
        accounts: AccountSet,
        publisher: SnapshotPublisher,
        interval: Duration,
        put_source_ip: bool,
    ) -> Self {
        let tokens = TokenCache::new(&accounts);
        Self {
            registry,
            accounts,
            tokens,
            publisher,
            interval,
            put_source_ip,
        }
    }

    /// Probe every account in order and render the results. Does not publish.
    pub async fn run_cycle(&mut self) -> MetricsSnapshot {
        let started = Instant::now();
        let mut renderer = MetricsRenderer::new(self.put_source_ip);

        for account in self.accounts.iter() {
            let result = self.tokens.refresh(self.registry.as_ref(), account).await;
            metrics::counter!("ratelimit_exporter_probe_results_total", "result" => result.label())
                .increment(1);
            renderer.record(account.id(), &result);
        }

        let elapsed = started.elapsed();
        metrics::histogram!("ratelimit_exporter_refresh_duration_seconds")
            .record(elapsed.as_secs_f64());
        debug!(
            accounts = self.accounts.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "refresh pass finished"
        );
        renderer.finish()
    }

    /// Replace the published snapshot and record when it was rendered.
    pub fn publish(&self, snapshot: MetricsSnapshot) {
        if let Some(rendered) = snapshot
            .rendered_at()
            .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
        {
            metrics::gauge!("ratelimit_exporter_last_refresh_timestamp_seconds")
                .set(rendered.as_secs_f64());
        }
        self.publisher.publish(snapshot);
        metrics::counter!("ratelimit_exporter_refresh_cycles_total").increment(1);
    }

    /// Loop until `shutdown` flips to true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            accounts = self.accounts.len(),
            interval_secs = self.interval.as_secs(),
            "refresh loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let snapshot = tokio::select! {
                snapshot = self.run_cycle() => snapshot,
                _ = shutdown.changed() => {
                    info!("shutdown during refresh pass, discarding partial results");
                    break;
                }
            };
            self.publish(snapshot);

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("refresh loop stopped");
    }
}

/// Spawn the refresh loop on the runtime.
///
/// The task ends after `shutdown` is set to true; await the handle to know
/// no further snapshot will be published.
pub fn spawn_refresh_task(
    refresh: RefreshLoop,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(refresh.run(shutdown))
}
