//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the endpoint locator for the configured mode
//! - Build storage, close queue, transfer and retry layers
//! - Hand back one [`Runtime`] that owns everything the run needs
//!
//! # Design Decisions
//! - Fail fast: an unreachable coordination service at startup is fatal
//! - Subsystems initialize in order, not concurrently
//! - Workers start last, after the first endpoint read (or its timeout)

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BenchConfig, LocatorMode};
use crate::coordination::{Coordinator, FileCoordinator};
use crate::error::{ClientError, ClientResult};
use crate::lifecycle::Shutdown;
use crate::locator::{Endpoint, EndpointLocator};
use crate::resilience::retries::{RetryCoordinator, RetryPolicy};
use crate::storage::{self, StorageClient};
use crate::transfer::{CloseQueue, StreamedOperation, TransferSettings};
use crate::workload::{resolve_hostname, BenchmarkClient};

/// Everything a benchmark run needs, wired together.
pub struct Runtime {
    pub locator: Arc<EndpointLocator>,
    pub closer: Arc<CloseQueue>,
    pub client: Arc<BenchmarkClient>,
    pub shutdown: Arc<Shutdown>,
}

impl Runtime {
    /// Build the runtime from a validated config.
    pub async fn start(config: &BenchConfig, shutdown: Arc<Shutdown>) -> ClientResult<Self> {
        let locator = match config.mode {
            LocatorMode::Static => EndpointLocator::fixed(Endpoint::from(config.storage.primary.as_str())),
            LocatorMode::Ha => {
                let coordinator: Arc<dyn Coordinator> = Arc::new(FileCoordinator::new(
                    &config.coordination.connect_string,
                    Duration::from_millis(config.coordination.poll_interval_ms),
                ));
                probe(coordinator.as_ref(), config).await?;
                watching(coordinator, config).await
            }
        };

        let storage = storage::from_config(&config.storage).map_err(ClientError::StorageSetup)?;
        Ok(Self::assemble(config, Arc::new(locator), storage, shutdown))
    }

    /// Build the runtime around an existing coordinator and storage client.
    pub async fn with_backends(
        config: &BenchConfig,
        coordinator: Arc<dyn Coordinator>,
        storage: Arc<dyn StorageClient>,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        let locator = watching(coordinator, config).await;
        Self::assemble(config, Arc::new(locator), storage, shutdown)
    }

    /// Wire the layers above the locator.
    pub fn assemble(
        config: &BenchConfig,
        locator: Arc<EndpointLocator>,
        storage: Arc<dyn StorageClient>,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        let closer = Arc::new(CloseQueue::new(&config.cleanup));
        let operation = Arc::new(StreamedOperation::new(
            storage.clone(),
            locator.failover_state(),
            TransferSettings::from_config(&config.storage, &config.workload),
            closer.clone(),
        ));
        let retry = RetryCoordinator::new(locator.clone(), RetryPolicy::from(&config.retry))
            .with_shutdown(shutdown.clone());
        let hostname = resolve_hostname(config.workload.hostname.as_deref());

        tracing::info!(
            hostname = %hostname,
            endpoint = %locator.current_endpoint(),
            files = config.workload.files,
            blocks = config.workload.blocks,
            workers = config.workload.workers,
            "Benchmark client ready"
        );

        let client = Arc::new(BenchmarkClient::new(
            retry,
            operation,
            storage,
            &config.workload,
            hostname,
            shutdown.clone(),
        ));

        Self {
            locator,
            closer,
            client,
            shutdown,
        }
    }

    /// Stop the locator and wait for pending stream releases.
    pub async fn stop(&self) {
        self.locator.shutdown().await;
        self.closer.drain().await;
        tracing::info!("Shutdown complete");
    }
}

/// One throwaway session to prove the coordination service is reachable.
async fn probe(coordinator: &dyn Coordinator, config: &BenchConfig) -> ClientResult<()> {
    let session = coordinator
        .connect(Duration::from_secs(config.coordination.session_timeout_secs))
        .await
        .map_err(ClientError::Coordination)?;
    session.close().await;
    Ok(())
}

async fn watching(coordinator: Arc<dyn Coordinator>, config: &BenchConfig) -> EndpointLocator {
    let fallback = Endpoint::from(config.storage.primary.as_str());
    let locator = EndpointLocator::watching(coordinator, &config.coordination, fallback);

    let ready_timeout = Duration::from_secs(config.coordination.ready_timeout_secs);
    if !locator.wait_until_ready(ready_timeout).await {
        tracing::warn!(
            timeout = ?ready_timeout,
            fallback = %locator.current_endpoint(),
            "No endpoint read from coordination service yet; starting with fallback"
        );
    }
    locator
}
