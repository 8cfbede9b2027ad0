//! Bounded release of stream handles.
//!
//! An aborted attempt leaves a stream open against the old endpoint, which
//! may hang on close. Those closes run on background tasks so the next
//! attempt is not stalled, bounded by a semaphore. When every permit is
//! taken the close runs inline. Every close has a deadline.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::CleanupConfig;
use crate::storage::{ByteSink, ByteSource};

/// A stream handle waiting to be released.
pub enum Release {
    Source(Box<dyn ByteSource>),
    /// Released without committing.
    Sink(Box<dyn ByteSink>),
}

impl Release {
    async fn run(self) -> io::Result<()> {
        match self {
            Release::Source(source) => source.close().await,
            Release::Sink(sink) => sink.abort().await,
        }
    }
}

pub struct CloseQueue {
    permits: Arc<Semaphore>,
    max_background: usize,
    tasks: Mutex<JoinSet<()>>,
    close_timeout: Duration,
}

impl CloseQueue {
    pub fn new(config: &CleanupConfig) -> Self {
        Self::with_limits(
            config.max_background_closers,
            Duration::from_millis(config.close_timeout_ms),
        )
    }

    pub fn with_limits(max_background: usize, close_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_background)),
            max_background,
            tasks: Mutex::new(JoinSet::new()),
            close_timeout,
        }
    }

    pub fn close_timeout(&self) -> Duration {
        self.close_timeout
    }

    /// Release `handle` on the current task.
    pub async fn close_now(&self, object: &str, handle: Release) {
        close_with_deadline(object, handle, self.close_timeout).await;
    }

    /// Release `handle` in the background if a closer slot is free,
    /// otherwise inline.
    pub async fn release(&self, object: &str, handle: Release) {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!(object, "All background closers busy, closing inline");
                self.close_now(object, handle).await;
                return;
            }
        };

        let object = object.to_string();
        let close_timeout = self.close_timeout;
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            close_with_deadline(&object, handle, close_timeout).await;
            drop(permit);
        });
    }

    /// Background closes still running.
    pub fn in_flight(&self) -> usize {
        self.max_background - self.permits.available_permits()
    }

    /// Wait for every background close to finish.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        if !tasks.is_empty() {
            tracing::info!(pending = tasks.len(), "Waiting for background closes");
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Background close task failed");
            }
        }
    }
}

async fn close_with_deadline(object: &str, handle: Release, deadline: Duration) {
    match tokio::time::timeout(deadline, handle.run()).await {
        Ok(Ok(())) => tracing::debug!(object, "Stream released"),
        Ok(Err(e)) => tracing::warn!(object, error = %e, "Error closing stream"),
        Err(_) => tracing::warn!(object, timeout = ?deadline, "Timed out closing stream"),
    }
}
