//! File-backed coordination service.
//!
//! The connection string is a directory; a node path such as `/namenode`
//! names the file `<dir>/namenode`. Whatever process performs the failover
//! rewrites that file. Filesystem notifications fire the armed watches; a
//! watcher error or removal of the directory expires the session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::oneshot;

use crate::coordination::{
    CoordinationError, CoordinationSession, Coordinator, WatchEvent, Watched,
};

/// Coordinator backed by a watched directory.
#[derive(Debug, Clone)]
pub struct FileCoordinator {
    root: PathBuf,
    target: String,
    poll_interval: Duration,
}

impl FileCoordinator {
    /// Create a coordinator for the directory named by `connect_string`.
    pub fn new(connect_string: &str, poll_interval: Duration) -> Self {
        Self {
            root: PathBuf::from(connect_string),
            target: connect_string.to_string(),
            poll_interval,
        }
    }
}

/// Map a node path onto a file below `root`.
fn node_file(root: &Path, path: &str) -> PathBuf {
    root.join(path.trim_start_matches('/'))
}

#[derive(Default)]
struct Shared {
    watches: HashMap<PathBuf, Vec<oneshot::Sender<WatchEvent>>>,
    expired: bool,
}

impl Shared {
    fn expire(&mut self) {
        self.expired = true;
        for (_, senders) in self.watches.drain() {
            for tx in senders {
                let _ = tx.send(WatchEvent::SessionExpired);
            }
        }
    }

    fn handle(&mut self, root: &Path, event: Event) {
        if !(event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove()) {
            return;
        }
        for path in &event.paths {
            if event.kind.is_remove() && path == root {
                tracing::warn!(root = ?root, "Coordination directory removed, expiring session");
                self.expire();
                return;
            }
            if let Some(senders) = self.watches.remove(path) {
                tracing::debug!(path = ?path, kind = ?event.kind, "Watched node changed");
                for tx in senders {
                    let _ = tx.send(WatchEvent::DataChanged);
                }
            }
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Coordinator for FileCoordinator {
    fn target(&self) -> &str {
        &self.target
    }

    async fn connect(
        &self,
        session_timeout: Duration,
    ) -> Result<Box<dyn CoordinationSession>, CoordinationError> {
        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| CoordinationError::Connect {
                target: self.target.clone(),
                reason: e.to_string(),
            })?;
        if !root.is_dir() {
            return Err(CoordinationError::Connect {
                target: self.target.clone(),
                reason: "not a directory".to_string(),
            });
        }

        let shared = Arc::new(Mutex::new(Shared::default()));
        let handler_shared = shared.clone();
        let handler_root = root.clone();

        let mut watcher = RecommendedWatcher::new(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => lock(&handler_shared).handle(&handler_root, event),
                Err(e) => {
                    tracing::error!("Watch error: {:?}", e);
                    lock(&handler_shared).expire();
                }
            }
        }, Config::default().with_poll_interval(self.poll_interval))
        .map_err(|e| CoordinationError::Watch(e.to_string()))?;

        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .map_err(|e| CoordinationError::Watch(e.to_string()))?;

        tracing::info!(
            root = ?root,
            session_timeout_secs = session_timeout.as_secs(),
            "File coordination session established"
        );

        Ok(Box::new(FileSession {
            root,
            shared,
            watcher: Mutex::new(Some(watcher)),
        }))
    }
}

struct FileSession {
    root: PathBuf,
    shared: Arc<Mutex<Shared>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

#[async_trait]
impl CoordinationSession for FileSession {
    async fn watch(&self, path: &str) -> Result<Watched, CoordinationError> {
        let file = node_file(&self.root, path);
        let (tx, rx) = oneshot::channel();

        // Arm before reading so a write racing the read still fires.
        {
            let mut shared = lock(&self.shared);
            if shared.expired {
                return Err(CoordinationError::SessionExpired);
            }
            shared.watches.entry(file.clone()).or_default().push(tx);
        }

        match tokio::fs::read(&file).await {
            Ok(value) => Ok(Watched { value, event: rx }),
            Err(e) => {
                drop(rx);
                if let Some(senders) = lock(&self.shared).watches.get_mut(&file) {
                    senders.retain(|s| !s.is_closed());
                }
                if e.kind() == std::io::ErrorKind::NotFound {
                    Err(CoordinationError::NoNode(path.to_string()))
                } else {
                    Err(CoordinationError::Io(e))
                }
            }
        }
    }

    async fn close(&self) {
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(watcher);
        lock(&self.shared).watches.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_file_mapping() {
        let root = Path::new("/var/run/coord");
        assert_eq!(node_file(root, "/namenode"), PathBuf::from("/var/run/coord/namenode"));
        assert_eq!(node_file(root, "namenode"), PathBuf::from("/var/run/coord/namenode"));
    }

    #[tokio::test]
    async fn test_connect_requires_directory() {
        let coordinator = FileCoordinator::new("/nonexistent/coordination", Duration::from_millis(50));
        let result = coordinator.connect(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(CoordinationError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_reads_node_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("namenode"), "nn1:8020\n").unwrap();

        let coordinator = FileCoordinator::new(
            dir.path().to_str().unwrap(),
            Duration::from_millis(50),
        );
        let session = coordinator.connect(Duration::from_secs(1)).await.unwrap();

        let watched = session.watch("/namenode").await.unwrap();
        assert_eq!(watched.value, b"nn1:8020\n");

        assert!(matches!(
            session.watch("/standby").await,
            Err(CoordinationError::NoNode(_))
        ));
        session.close().await;
    }

    #[tokio::test]
    async fn test_change_fires_watch() {
        let dir = tempfile::tempdir().unwrap();
        let node = dir.path().join("namenode");
        std::fs::write(&node, "nn1:8020").unwrap();

        let coordinator = FileCoordinator::new(
            dir.path().to_str().unwrap(),
            Duration::from_millis(50),
        );
        let session = coordinator.connect(Duration::from_secs(1)).await.unwrap();
        let watched = session.watch("/namenode").await.unwrap();

        std::fs::write(&node, "nn2:8020").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), watched.event)
            .await
            .expect("watch did not fire")
            .unwrap();
        assert_eq!(event, WatchEvent::DataChanged);

        let watched = session.watch("/namenode").await.unwrap();
        assert_eq!(watched.value, b"nn2:8020");
        session.close().await;
    }
}
