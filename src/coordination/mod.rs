//! Coordination service client subsystem.
//!
//! # Data Flow
//! ```text
//! Coordinator::connect(session_timeout)
//!     → CoordinationSession
//!     → watch(path) → (current value, one-shot WatchEvent receiver)
//!     → DataChanged: caller re-reads, which re-arms the watch
//!     → SessionExpired: caller drops the session and reconnects
//! ```
//!
//! # Design Decisions
//! - Watches are one-shot, mirroring ZooKeeper semantics
//! - Session expiry is a distinct event, never folded into DataChanged
//! - A dropped event sender is reported to callers as expiry

pub mod file;
pub mod memory;

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

pub use file::FileCoordinator;
pub use memory::MemoryCoordinator;

/// Event delivered to a one-shot watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// The watched node changed (or was removed).
    DataChanged,
    /// The session is gone; a full reconnect is required.
    SessionExpired,
}

/// Errors from the coordination layer.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// Session establishment failed.
    #[error("failed to connect to {target}: {reason}")]
    Connect { target: String, reason: String },

    /// The watched node does not exist.
    #[error("node {0} does not exist")]
    NoNode(String),

    /// Operation attempted on an expired session.
    #[error("coordination session expired")]
    SessionExpired,

    /// Reading a node failed.
    #[error("coordination I/O error: {0}")]
    Io(#[from] io::Error),

    /// The change notification backend failed.
    #[error("watch error: {0}")]
    Watch(String),
}

/// Value of a node plus the armed watch for its next change.
#[derive(Debug)]
pub struct Watched {
    pub value: Vec<u8>,
    pub event: oneshot::Receiver<WatchEvent>,
}

/// Factory for coordination sessions.
#[async_trait]
pub trait Coordinator: Send + Sync + 'static {
    /// Human-readable target for logs.
    fn target(&self) -> &str;

    /// Establish a new session.
    async fn connect(
        &self,
        session_timeout: Duration,
    ) -> Result<Box<dyn CoordinationSession>, CoordinationError>;
}

/// A live coordination session.
#[async_trait]
pub trait CoordinationSession: Send + Sync {
    /// Read `path` and arm a one-shot watch on it.
    async fn watch(&self, path: &str) -> Result<Watched, CoordinationError>;

    /// Close the session, dropping any armed watches.
    async fn close(&self);
}
