//! Coordination watch loop.
//!
//! # States
//! - Disconnected: no session
//! - Connecting: session establishment in progress
//! - Connected: watch armed on the endpoint node
//!
//! # State Transitions
//! ```text
//! Disconnected → Connecting: loop start, after expiry, after a failed read
//! Connecting → Connected: connect succeeded
//! Connecting → Disconnected: connect failed (backoff, retry)
//! Connected → Disconnected: session expired or endpoint read failed
//! ```
//!
//! The first value ever read is the baseline and is published silently. Any
//! later read that differs from the stored endpoint is a failover, including
//! the read right after a reconnect, so a change made while disconnected is
//! still observed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, watch};

use crate::config::CoordinationConfig;
use crate::coordination::{CoordinationSession, Coordinator, WatchEvent};
use crate::locator::{ConnectionState, Endpoint, FailoverState};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// How a connected session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Expired,
    ReadFailed,
}

pub(crate) struct WatchLoop {
    pub(crate) coordinator: Arc<dyn Coordinator>,
    pub(crate) path: String,
    pub(crate) session_timeout: Duration,
    pub(crate) reconnect_base_ms: u64,
    pub(crate) reconnect_max_ms: u64,
    pub(crate) state: Arc<FailoverState>,
    pub(crate) connection: watch::Sender<ConnectionState>,
    pub(crate) ready: watch::Sender<bool>,
    pub(crate) baseline_taken: bool,
}

impl WatchLoop {
    pub(crate) fn new(
        coordinator: Arc<dyn Coordinator>,
        config: &CoordinationConfig,
        state: Arc<FailoverState>,
        connection: watch::Sender<ConnectionState>,
        ready: watch::Sender<bool>,
    ) -> Self {
        Self {
            coordinator,
            path: config.path.clone(),
            session_timeout: Duration::from_secs(config.session_timeout_secs),
            reconnect_base_ms: config.reconnect_base_ms,
            reconnect_max_ms: config.reconnect_max_ms,
            state,
            connection,
            ready,
            baseline_taken: false,
        }
    }

    pub(crate) async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            target_service = %self.coordinator.target(),
            path = %self.path,
            "Endpoint watch loop starting"
        );

        let mut failures: u32 = 0;
        loop {
            self.connection.send_replace(ConnectionState::Connecting);

            let connected = tokio::select! {
                res = self.coordinator.connect(self.session_timeout) => res,
                _ = shutdown.recv() => break,
            };

            let session = match connected {
                Ok(session) => session,
                Err(e) => {
                    self.connection.send_replace(ConnectionState::Disconnected);
                    failures = failures.saturating_add(1);
                    tracing::warn!(error = %e, attempt = failures, "Problem when connecting to coordination service");
                    if !self.pause(failures, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            tracing::info!(target_service = %self.coordinator.target(), "Connected to coordination service");
            self.connection.send_replace(ConnectionState::Connected);

            let end = self.serve(session.as_ref(), &mut shutdown).await;
            session.close().await;
            self.connection.send_replace(ConnectionState::Disconnected);

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Expired => {
                    failures = 0;
                    tracing::warn!("Coordination session expired, reconnecting");
                }
                SessionEnd::ReadFailed => {
                    failures = failures.saturating_add(1);
                    if !self.pause(failures, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.connection.send_replace(ConnectionState::Disconnected);
        tracing::info!("Endpoint watch loop stopped");
    }

    /// Back off before reconnecting. Returns false on shutdown.
    async fn pause(&self, failures: u32, shutdown: &mut broadcast::Receiver<()>) -> bool {
        let delay = calculate_backoff(failures, self.reconnect_base_ms, self.reconnect_max_ms);
        tracing::debug!(delay = ?delay, "Waiting before reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown.recv() => false,
        }
    }

    async fn serve(
        &mut self,
        session: &dyn CoordinationSession,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> SessionEnd {
        let mut pending = match self.read(session).await {
            Some(rx) => rx,
            None => return SessionEnd::ReadFailed,
        };

        loop {
            let event = tokio::select! {
                // A dropped sender means the session went away underneath us.
                ev = &mut pending => ev.unwrap_or(WatchEvent::SessionExpired),
                _ = shutdown.recv() => return SessionEnd::Shutdown,
            };

            match event {
                WatchEvent::DataChanged => {
                    tracing::info!(path = %self.path, "Endpoint node has changed");
                    pending = match self.read(session).await {
                        Some(rx) => rx,
                        None => return SessionEnd::ReadFailed,
                    };
                }
                WatchEvent::SessionExpired => return SessionEnd::Expired,
            }
        }
    }

    /// Read the node, re-arming its watch, and apply the value.
    async fn read(&mut self, session: &dyn CoordinationSession) -> Option<oneshot::Receiver<WatchEvent>> {
        match session.watch(&self.path).await {
            Ok(watched) => {
                self.apply(&watched.value);
                Some(watched.event)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %self.path,
                    endpoint = %self.state.endpoint(),
                    "Something bad happened when retrieving the endpoint; keeping last known value"
                );
                None
            }
        }
    }

    fn apply(&mut self, raw: &[u8]) {
        let value = String::from_utf8_lossy(raw).trim().to_string();
        if value.is_empty() {
            tracing::warn!(path = %self.path, "Endpoint node is empty; ignoring");
            return;
        }
        let endpoint = Endpoint::from(value);

        if !self.baseline_taken {
            self.baseline_taken = true;
            self.state.set_baseline(endpoint.clone());
            self.ready.send_replace(true);
            tracing::info!(endpoint = %endpoint, "Current endpoint is at {}", endpoint);
            return;
        }

        if let Some(generation) = self.state.mark_changed(endpoint.clone()) {
            tracing::info!(
                event = "NAMENODE_CHANGED",
                endpoint = %endpoint,
                generation,
                "Changed endpoint to {}",
                endpoint
            );
            metrics::record_failover(generation);
        }
    }
}
