//! Shared failover state.
//!
//! The current endpoint and its generation live in one immutable record that
//! is swapped atomically, so a reader never sees a new address paired with an
//! old generation. Workers read it lock-free on every chunk boundary; only
//! the locator's notification task publishes.
//!
//! `changed` is derived from the generation: it flips to `true` with the
//! first failover of the session and stays there. Attempts compare the
//! generation they captured before starting with the current one.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::locator::Endpoint;

/// Endpoint plus the number of failovers that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRecord {
    pub endpoint: Endpoint,
    pub generation: u64,
}

impl EndpointRecord {
    pub fn snapshot(&self) -> FailoverSnapshot {
        FailoverSnapshot {
            changed: self.generation > 0,
            generation: self.generation,
        }
    }
}

/// Point-in-time view of the failover state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverSnapshot {
    /// A failover has happened during this session.
    pub changed: bool,
    /// Number of endpoint changes observed so far.
    pub generation: u64,
}

/// Process-wide failover flag and wait primitive.
pub struct FailoverState {
    current: ArcSwap<EndpointRecord>,
    /// Serializes publishers so swap and notify form one step.
    publish: Mutex<()>,
    changes: watch::Sender<Arc<EndpointRecord>>,
}

impl FailoverState {
    /// Create state for an initial endpoint (generation 0).
    pub fn new(initial: Endpoint) -> Self {
        let record = Arc::new(EndpointRecord {
            endpoint: initial,
            generation: 0,
        });
        let (changes, _) = watch::channel(record.clone());
        Self {
            current: ArcSwap::new(record),
            publish: Mutex::new(()),
            changes,
        }
    }

    /// Non-blocking read of `{changed, generation}`.
    pub fn snapshot(&self) -> FailoverSnapshot {
        self.current.load().snapshot()
    }

    /// Current generation; the per-chunk hot check.
    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    /// Current endpoint.
    pub fn endpoint(&self) -> Endpoint {
        self.current.load().endpoint.clone()
    }

    /// Current `{endpoint, generation}` record.
    pub fn record(&self) -> Arc<EndpointRecord> {
        self.current.load_full()
    }

    /// Subscribe to published changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<EndpointRecord>> {
        self.changes.subscribe()
    }

    /// Replace the endpoint without counting a failover.
    ///
    /// Used for the baseline read: subscribers are not notified and the
    /// generation is unchanged.
    pub(crate) fn set_baseline(&self, endpoint: Endpoint) {
        let _guard = self.publish.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.current.load_full();
        if current.endpoint == endpoint {
            return;
        }
        let record = Arc::new(EndpointRecord {
            endpoint,
            generation: current.generation,
        });
        self.current.store(record.clone());
        self.changes.send_if_modified(|slot| {
            *slot = record;
            false
        });
    }

    /// Publish a new endpoint, bump the generation and wake every waiter.
    ///
    /// Returns the new generation, or `None` when `endpoint` is already
    /// current (no failover happened).
    pub fn mark_changed(&self, endpoint: Endpoint) -> Option<u64> {
        let _guard = self.publish.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.current.load_full();
        if current.endpoint == endpoint {
            return None;
        }
        let generation = current.generation + 1;
        let record = Arc::new(EndpointRecord {
            endpoint,
            generation,
        });
        self.current.store(record.clone());
        self.changes.send_replace(record);
        Some(generation)
    }

    /// Wait until the generation moves past `since` or `timeout` elapses.
    ///
    /// Returns immediately if the change already happened. A closed channel
    /// counts as a timeout.
    pub async fn await_change(&self, since: u64, timeout: Duration) -> bool {
        let mut rx = self.changes.subscribe();
        let changed = async move { rx.wait_for(|record| record.generation > since).await.is_ok() };
        matches!(tokio::time::timeout(timeout, changed).await, Ok(true))
    }

    /// Resolve once the generation moves past `since`; never resolves otherwise.
    pub async fn changed_since(&self, since: u64) {
        let mut rx = self.changes.subscribe();
        if rx.wait_for(|record| record.generation > since).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl std::fmt::Debug for FailoverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let record = self.current.load();
        f.debug_struct("FailoverState")
            .field("endpoint", &record.endpoint)
            .field("generation", &record.generation)
            .finish()
    }
}
