//! Endpoint location subsystem.
//!
//! # Data Flow
//! ```text
//! static mode:
//!     primary address → FailoverState (never changes)
//!
//! ha mode:
//!     Coordinator session (watch_loop.rs, notification task)
//!     → baseline read (silent) / change read
//!     → FailoverState::mark_changed (state.rs): swap record, bump generation
//!     → watch channel wakes await_change() waiters and subscribers
//!     → workers read current_endpoint() / generation lock-free
//! ```
//!
//! # Design Decisions
//! - The notification task is the only writer of the endpoint
//! - Subscribers receive `(endpoint, generation)` records through a
//!   single-slot channel instead of a callback run on the notification task
//! - Coordination errors never escape the watch loop; the last known
//!   endpoint stays in place until a successful read replaces it

pub mod state;
mod watch_loop;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::CoordinationConfig;
use crate::coordination::Coordinator;
use crate::lifecycle::Shutdown;

pub use state::{EndpointRecord, FailoverSnapshot, FailoverState};

use watch_loop::WatchLoop;

/// Address of the currently designated primary (e.g., "nn1:8020").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(Arc<str>);

impl Endpoint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for Endpoint {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection state of the coordination session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns the current endpoint and keeps it up to date.
pub struct EndpointLocator {
    state: Arc<FailoverState>,
    connection: watch::Receiver<ConnectionState>,
    ready: watch::Receiver<bool>,
    stop: Shutdown,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EndpointLocator {
    /// Locator for a fixed endpoint (static mode).
    pub fn fixed(endpoint: Endpoint) -> Self {
        let (_, connection) = watch::channel(ConnectionState::Connected);
        let (_, ready) = watch::channel(true);
        Self {
            state: Arc::new(FailoverState::new(endpoint)),
            connection,
            ready,
            stop: Shutdown::new(),
            task: Mutex::new(None),
        }
    }

    /// Locator following the endpoint published under `config.path`.
    ///
    /// `fallback` is reported until the first successful read. Must be
    /// called from within a Tokio runtime.
    pub fn watching(
        coordinator: Arc<dyn Coordinator>,
        config: &CoordinationConfig,
        fallback: Endpoint,
    ) -> Self {
        let state = Arc::new(FailoverState::new(fallback));
        let (connection_tx, connection) = watch::channel(ConnectionState::Disconnected);
        let (ready_tx, ready) = watch::channel(false);
        let stop = Shutdown::new();

        let watch_loop = WatchLoop::new(coordinator, config, state.clone(), connection_tx, ready_tx);
        let task = tokio::spawn(watch_loop.run(stop.subscribe()));

        Self {
            state,
            connection,
            ready,
            stop,
            task: Mutex::new(Some(task)),
        }
    }

    /// Latest known endpoint. Never blocks.
    pub fn current_endpoint(&self) -> Endpoint {
        self.state.endpoint()
    }

    /// Shared failover state.
    pub fn failover_state(&self) -> Arc<FailoverState> {
        self.state.clone()
    }

    /// Receive `(endpoint, generation)` records as they are published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<EndpointRecord>> {
        self.state.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    /// Wait for the first endpoint read. Returns false on timeout.
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let mut ready = self.ready.clone();
        let wait = async move { ready.wait_for(|r| *r).await.is_ok() };
        matches!(tokio::time::timeout(timeout, wait).await, Ok(true))
    }

    /// Stop the watch loop and close the session.
    pub async fn shutdown(&self) {
        self.stop.trigger();
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Endpoint watch loop panicked");
            }
        }
    }
}

impl Drop for EndpointLocator {
    fn drop(&mut self) {
        self.stop.trigger();
    }
}

impl fmt::Debug for EndpointLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointLocator")
            .field("state", &self.state)
            .field("connection", &self.connection_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_locator() {
        let locator = EndpointLocator::fixed(Endpoint::from("nn1:8020"));
        assert_eq!(locator.current_endpoint().as_str(), "nn1:8020");
        assert_eq!(locator.connection_state(), ConnectionState::Connected);
        assert!(locator.wait_until_ready(Duration::from_millis(10)).await);

        let state = locator.failover_state();
        assert!(!state.await_change(0, Duration::from_millis(10)).await);
        locator.shutdown().await;
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::from(String::from("nn2:8020"));
        assert_eq!(endpoint.to_string(), "nn2:8020");
        assert_eq!(endpoint, Endpoint::from("nn2:8020"));
    }
}
