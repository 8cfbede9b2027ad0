//! In-process coordination service.
//!
//! Holds nodes in a map and supports the fault injection the failover tests
//! need: expiring every live session and refusing new connections.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::coordination::{
    CoordinationError, CoordinationSession, Coordinator, WatchEvent, Watched,
};

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, Vec<u8>>,
    watches: Vec<PendingWatch>,
    live_sessions: HashSet<u64>,
    next_session: u64,
    connects: u64,
    unavailable: bool,
}

struct PendingWatch {
    session: u64,
    path: String,
    tx: oneshot::Sender<WatchEvent>,
}

impl Inner {
    fn fire(&mut self, path: &str) {
        let (fired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.watches)
            .into_iter()
            .partition(|w| w.path == path);
        self.watches = kept;
        for watch in fired {
            let _ = watch.tx.send(WatchEvent::DataChanged);
        }
    }
}

/// Coordination service living in the current process.
#[derive(Clone, Default)]
pub struct MemoryCoordinator {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set a node value, firing watches armed on it.
    pub fn set(&self, path: &str, value: impl Into<Vec<u8>>) {
        let mut inner = self.lock();
        inner.nodes.insert(path.to_string(), value.into());
        inner.fire(path);
    }

    /// Remove a node, firing watches armed on it.
    pub fn remove(&self, path: &str) {
        let mut inner = self.lock();
        inner.nodes.remove(path);
        inner.fire(path);
    }

    /// Expire every live session.
    pub fn expire_sessions(&self) {
        let mut inner = self.lock();
        inner.live_sessions.clear();
        for watch in std::mem::take(&mut inner.watches) {
            let _ = watch.tx.send(WatchEvent::SessionExpired);
        }
    }

    /// Make new connection attempts fail (or succeed again).
    pub fn set_available(&self, available: bool) {
        self.lock().unavailable = !available;
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> u64 {
        self.lock().connects
    }

    /// Number of sessions that have not expired or closed.
    pub fn live_sessions(&self) -> usize {
        self.lock().live_sessions.len()
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    fn target(&self) -> &str {
        "memory"
    }

    async fn connect(
        &self,
        _session_timeout: Duration,
    ) -> Result<Box<dyn CoordinationSession>, CoordinationError> {
        let mut inner = self.lock();
        if inner.unavailable {
            return Err(CoordinationError::Connect {
                target: "memory".to_string(),
                reason: "coordinator unavailable".to_string(),
            });
        }
        inner.next_session += 1;
        inner.connects += 1;
        let id = inner.next_session;
        inner.live_sessions.insert(id);

        Ok(Box::new(MemorySession {
            id,
            inner: self.inner.clone(),
        }))
    }
}

struct MemorySession {
    id: u64,
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl CoordinationSession for MemorySession {
    async fn watch(&self, path: &str) -> Result<Watched, CoordinationError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.live_sessions.contains(&self.id) {
            return Err(CoordinationError::SessionExpired);
        }
        let value = inner
            .nodes
            .get(path)
            .cloned()
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;

        let (tx, rx) = oneshot::channel();
        inner.watches.push(PendingWatch {
            session: self.id,
            path: path.to_string(),
            tx,
        });

        Ok(Watched { value, event: rx })
    }

    async fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.live_sessions.remove(&self.id);
        let id = self.id;
        inner.watches.retain(|w| w.session != id);
    }
}
