//! Benchmark driver.
//!
//! Each file goes through create → list → read → delete (optional), every
//! step wrapped in the retry coordinator. A step that runs out of attempts
//! skips the rest of that file; the run moves on to the next one.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use crate::config::WorkloadConfig;
use crate::error::{ClientError, ClientResult, OperationError};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::retries::RetryCoordinator;
use crate::storage::{ObjectUri, StorageClient};
use crate::transfer::{Direction, StreamedOperation, TransferStats};
use crate::workload::report::ReportLine;

/// Totals for one benchmark run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files_completed: u32,
    pub files_failed: u32,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub cancelled: bool,
}

impl RunSummary {
    fn merge(&mut self, other: RunSummary) {
        self.files_completed += other.files_completed;
        self.files_failed += other.files_failed;
        self.bytes_written += other.bytes_written;
        self.bytes_read += other.bytes_read;
        self.cancelled |= other.cancelled;
    }
}

pub struct BenchmarkClient {
    retry: RetryCoordinator,
    operation: Arc<StreamedOperation>,
    storage: Arc<dyn StorageClient>,
    hostname: String,
    files: u32,
    workers: usize,
    delete_after_read: bool,
    shutdown: Arc<Shutdown>,
}

impl BenchmarkClient {
    pub fn new(
        retry: RetryCoordinator,
        operation: Arc<StreamedOperation>,
        storage: Arc<dyn StorageClient>,
        workload: &WorkloadConfig,
        hostname: String,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            retry,
            operation,
            storage,
            hostname,
            files: workload.files,
            workers: workload.workers.max(1),
            delete_after_read: workload.delete_after_read,
            shutdown,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Object name of the `index`-th file (1-based).
    pub fn file_name(&self, index: u32) -> String {
        format!("{}-{}", self.hostname, index)
    }

    /// Run every file across the configured workers.
    pub async fn run(self: Arc<Self>) -> RunSummary {
        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            let client = self.clone();
            workers.spawn(async move { client.run_worker(worker).await });
        }

        let mut summary = RunSummary::default();
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(worker_summary) => summary.merge(worker_summary),
                Err(e) => tracing::error!(error = %e, "Worker task failed"),
            }
        }

        tracing::info!(
            completed = summary.files_completed,
            failed = summary.files_failed,
            bytes_written = summary.bytes_written,
            bytes_read = summary.bytes_read,
            cancelled = summary.cancelled,
            "Benchmark run finished"
        );
        summary
    }

    async fn run_worker(&self, worker: usize) -> RunSummary {
        let mut summary = RunSummary::default();
        let indices = (1..=self.files).filter(|i| (*i as usize - 1) % self.workers == worker);

        for index in indices {
            if self.shutdown.is_triggered() {
                summary.cancelled = true;
                break;
            }
            let name = self.file_name(index);
            match self.run_file(&name, &mut summary).await {
                Ok(()) => summary.files_completed += 1,
                Err(ClientError::Cancelled { object }) => {
                    tracing::warn!(worker, object = %object, "Worker stopping on shutdown");
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    summary.files_failed += 1;
                    tracing::error!(worker, file = %name, error = %e, "Giving up on file");
                }
            }
        }
        summary
    }

    /// One full pass over a single file.
    pub async fn run_file(&self, name: &str, summary: &mut RunSummary) -> ClientResult<()> {
        let written = self.transfer(name, Direction::Write).await?;
        summary.bytes_written += written.bytes;

        self.list().await?;

        let read = self.transfer(name, Direction::Read).await?;
        summary.bytes_read += read.bytes;

        if self.delete_after_read {
            self.delete(name).await?;
        }
        Ok(())
    }

    async fn transfer(&self, name: &str, direction: Direction) -> ClientResult<TransferStats> {
        let step = direction.as_str();
        let started = Instant::now();
        let stats = self
            .retry
            .run(step, name, |ctx| async move {
                self.operation.run(name, direction, &ctx.endpoint, ctx.before).await
            })
            .await?;

        metrics::record_step(step, started.elapsed());
        ReportLine::transfer(&self.hostname, direction, stats).emit();
        Ok(stats)
    }

    async fn list(&self) -> ClientResult<Vec<String>> {
        let scheme = &self.operation.settings().scheme;
        let started = Instant::now();
        let entries = self
            .retry
            .run("list", "/", |ctx| async move {
                let root = ObjectUri::root(scheme, &ctx.endpoint)?;
                self.storage.list(&root).await.map_err(OperationError::from)
            })
            .await?;

        metrics::record_step("list", started.elapsed());
        for entry in &entries {
            tracing::debug!(entry = %entry, "Listed");
        }
        tracing::info!(entries = entries.len(), "Listing complete");
        Ok(entries)
    }

    async fn delete(&self, name: &str) -> ClientResult<bool> {
        let scheme = &self.operation.settings().scheme;
        let started = Instant::now();
        let deleted = self
            .retry
            .run("delete", name, |ctx| async move {
                let uri = ObjectUri::new(scheme, &ctx.endpoint, name)?;
                self.storage.delete(&uri).await.map_err(OperationError::from)
            })
            .await?;

        metrics::record_step("delete", started.elapsed());
        if !deleted {
            tracing::warn!(file = %name, "Delete reported nothing removed");
        }
        Ok(deleted)
    }
}

/// Host name used in object names and report lines.
///
/// An explicit name wins, then `$HOSTNAME`, then `/etc/hostname`.
pub fn resolve_hostname(configured: Option<&str>) -> String {
    if let Some(name) = configured.filter(|n| !n.trim().is_empty()) {
        return name.trim().to_string();
    }
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_hostname_wins() {
        assert_eq!(resolve_hostname(Some(" bench-1 ")), "bench-1");
        assert!(!resolve_hostname(Some("  ")).is_empty());
        assert!(!resolve_hostname(None).is_empty());
    }

    #[test]
    fn test_summary_merge() {
        let mut total = RunSummary::default();
        total.merge(RunSummary {
            files_completed: 2,
            bytes_written: 10,
            ..RunSummary::default()
        });
        total.merge(RunSummary {
            files_failed: 1,
            bytes_read: 5,
            cancelled: true,
            ..RunSummary::default()
        });
        assert_eq!(total.files_completed, 2);
        assert_eq!(total.files_failed, 1);
        assert_eq!(total.bytes_written, 10);
        assert_eq!(total.bytes_read, 5);
        assert!(total.cancelled);
    }
}
