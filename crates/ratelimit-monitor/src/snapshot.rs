//! Latest rendered metrics, shared between the refresh loop and HTTP readers
//!
//! Backed by a `tokio::sync::watch` channel holding an `Arc<MetricsSnapshot>`.
//! Publishing swaps the `Arc` in one step, so a reader always gets a complete
//! pass. The publisher half is not `Clone`, leaving the refresh loop as the
//! only writer.

use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::watch;

/// Text served before the first refresh pass completes. A comment line keeps
/// the body valid exposition format.
pub const PLACEHOLDER_TEXT: &str = "# metrics not yet available\n";

/// One complete rendering of all accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    text: String,
    accounts: usize,
    rendered_at: Option<SystemTime>,
}

impl MetricsSnapshot {
    pub fn new(text: String, accounts: usize) -> Self {
        Self {
            text,
            accounts,
            rendered_at: Some(SystemTime::now()),
        }
    }

    pub fn placeholder() -> Self {
        Self {
            text: PLACEHOLDER_TEXT.to_string(),
            accounts: 0,
            rendered_at: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of accounts covered by this pass.
    pub fn accounts(&self) -> usize {
        self.accounts
    }

    /// `None` for the placeholder.
    pub fn rendered_at(&self) -> Option<SystemTime> {
        self.rendered_at
    }

    pub fn is_placeholder(&self) -> bool {
        self.rendered_at.is_none()
    }
}

/// Create the snapshot slot, initialised with the placeholder.
pub fn snapshot_channel() -> (SnapshotPublisher, SnapshotReader) {
    let (tx, rx) = watch::channel(Arc::new(MetricsSnapshot::placeholder()));
    (SnapshotPublisher { tx }, SnapshotReader { rx })
}

/// Write half, owned by the refresh loop.
pub struct SnapshotPublisher {
    tx: watch::Sender<Arc<MetricsSnapshot>>,
}

impl SnapshotPublisher {
    /// Replace the current snapshot. Succeeds even when no reader exists.
    pub fn publish(&self, snapshot: MetricsSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }

    pub fn subscribe(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read half, cloned into every HTTP handler.
#[derive(Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Arc<MetricsSnapshot>>,
}

impl SnapshotReader {
    pub fn latest(&self) -> Arc<MetricsSnapshot> {
        self.rx.borrow().clone()
    }

    /// Wait for the next publish. Returns false once the publisher is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
