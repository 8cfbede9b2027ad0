//! One chunked transfer against a fixed endpoint.
//!
//! The generation captured before the attempt is compared with the live one
//! every `check_interval_bytes`. A mismatch means the primary moved while
//! bytes were in flight, and the attempt stops right there. Every storage
//! call also races the failover signal, so a stream stalled on the old
//! primary is abandoned as soon as the change is published.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::{StorageConfig, WorkloadConfig};
use crate::error::OperationError;
use crate::locator::{Endpoint, FailoverSnapshot, FailoverState};
use crate::observability::metrics;
use crate::storage::{ByteSink, ByteSource, DeadBeefSource, NullSink, ObjectUri, StorageClient};
use crate::transfer::cleanup::{CloseQueue, Release};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Read => "read",
            Direction::Write => "write",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer shape shared by every operation of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    pub scheme: String,
    pub chunk_size: usize,
    /// Bytes between two failover checks.
    pub check_interval_bytes: usize,
    pub blocks: u64,
    pub block_size: u64,
}

impl TransferSettings {
    pub fn from_config(storage: &StorageConfig, workload: &WorkloadConfig) -> Self {
        Self {
            scheme: storage.scheme.clone(),
            chunk_size: storage.chunk_size,
            check_interval_bytes: storage.check_interval_bytes,
            blocks: workload.blocks,
            block_size: storage.block_size,
        }
    }

    /// Bytes written per object.
    pub fn object_size(&self) -> u64 {
        self.blocks.saturating_mul(self.block_size)
    }
}

/// A single attempt in progress.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: String,
    pub direction: Direction,
    pub endpoint_at_start: Endpoint,
    pub bytes_transferred: u64,
}

/// Result of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferStats {
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Runs streamed reads and writes with mid-flight failover detection.
pub struct StreamedOperation {
    storage: Arc<dyn StorageClient>,
    state: Arc<FailoverState>,
    settings: TransferSettings,
    closer: Arc<CloseQueue>,
}

impl StreamedOperation {
    pub fn new(
        storage: Arc<dyn StorageClient>,
        state: Arc<FailoverState>,
        settings: TransferSettings,
        closer: Arc<CloseQueue>,
    ) -> Self {
        Self {
            storage,
            state,
            settings,
            closer,
        }
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Transfer `object` against `endpoint`.
    ///
    /// `before` is the failover state captured when the attempt started.
    pub async fn run(
        &self,
        object: &str,
        direction: Direction,
        endpoint: &Endpoint,
        before: FailoverSnapshot,
    ) -> Result<TransferStats, OperationError> {
        let uri = ObjectUri::new(&self.settings.scheme, endpoint, object)?;
        let mut op = Operation {
            id: object.to_string(),
            direction,
            endpoint_at_start: endpoint.clone(),
            bytes_transferred: 0,
        };

        let result = match direction {
            Direction::Write => self.write(&uri, &mut op, before).await,
            Direction::Read => self.read(&uri, &mut op, before).await,
        };
        metrics::record_bytes(direction.as_str(), op.bytes_transferred);
        result
    }

    async fn write(
        &self,
        uri: &ObjectUri,
        op: &mut Operation,
        before: FailoverSnapshot,
    ) -> Result<TransferStats, OperationError> {
        tracing::info!(event = "WRITE_STARTED", object = %op.id, endpoint = %op.endpoint_at_start, "Write started");
        let mut sink = self
            .guarded(op, before, self.storage.create(uri, true, self.settings.chunk_size))
            .await?;
        let mut source = DeadBeefSource::blocks(self.settings.blocks, self.settings.block_size, self.settings.chunk_size);
        let start = Instant::now();

        if let Err(e) = self.pump_write(&mut source, sink.as_mut(), op, before).await {
            self.release(op, Release::Sink(sink), &e).await;
            return Err(e);
        }

        // Closing is the commit.
        match tokio::time::timeout(self.closer.close_timeout(), sink.close()).await {
            Ok(result) => result?,
            Err(_) => return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out committing object").into()),
        }

        tracing::info!(event = "WRITE_COMPLETE", object = %op.id, bytes = op.bytes_transferred, "Write complete");
        Ok(TransferStats {
            bytes: op.bytes_transferred,
            elapsed: start.elapsed(),
        })
    }

    async fn pump_write(
        &self,
        source: &mut DeadBeefSource,
        sink: &mut dyn ByteSink,
        op: &mut Operation,
        before: FailoverSnapshot,
    ) -> Result<(), OperationError> {
        let interval = self.settings.check_interval_bytes.max(1);
        while let Some(mut chunk) = source.next_chunk() {
            while !chunk.is_empty() {
                let piece: Bytes = chunk.split_to(interval.min(chunk.len()));
                let len = piece.len() as u64;
                self.guarded(op, before, sink.write_chunk(piece)).await?;
                op.bytes_transferred += len;
                self.check(op, before)?;
            }
        }
        Ok(())
    }

    async fn read(
        &self,
        uri: &ObjectUri,
        op: &mut Operation,
        before: FailoverSnapshot,
    ) -> Result<TransferStats, OperationError> {
        tracing::info!(event = "READ_STARTED", object = %op.id, endpoint = %op.endpoint_at_start, "Read started");
        let mut source = self.guarded(op, before, self.storage.open(uri, self.settings.chunk_size)).await?;
        let mut sink = NullSink::new();
        let start = Instant::now();

        if let Err(e) = self.pump_read(source.as_mut(), &mut sink, op, before).await {
            self.release(op, Release::Source(source), &e).await;
            return Err(e);
        }
        let elapsed = start.elapsed();
        self.closer.close_now(&op.id, Release::Source(source)).await;

        tracing::info!(event = "READ_COMPLETE", object = %op.id, bytes = sink.bytes(), "Read complete");
        Ok(TransferStats {
            bytes: sink.bytes(),
            elapsed,
        })
    }

    async fn pump_read(
        &self,
        source: &mut dyn ByteSource,
        sink: &mut NullSink,
        op: &mut Operation,
        before: FailoverSnapshot,
    ) -> Result<(), OperationError> {
        let interval = self.settings.check_interval_bytes.max(1);
        while let Some(chunk) = self.guarded(op, before, source.read_chunk()).await? {
            for piece in chunk.chunks(interval) {
                sink.write(piece);
                op.bytes_transferred += piece.len() as u64;
                self.check(op, before)?;
            }
        }
        Ok(())
    }

    /// Fail if a failover happened since the attempt started.
    fn check(&self, op: &Operation, before: FailoverSnapshot) -> Result<(), OperationError> {
        if self.state.generation() != before.generation {
            return Err(self.changed(op));
        }
        Ok(())
    }

    /// Drive one storage call unless a failover is published first.
    ///
    /// A call that is already ready wins; the chunk check after it reports
    /// the change.
    async fn guarded<T, F>(&self, op: &Operation, before: FailoverSnapshot, call: F) -> Result<T, OperationError>
    where
        F: Future<Output = io::Result<T>>,
    {
        tokio::select! {
            biased;
            result = call => Ok(result?),
            _ = self.state.changed_since(before.generation) => Err(self.changed(op)),
        }
    }

    fn changed(&self, op: &Operation) -> OperationError {
        tracing::warn!(
            object = %op.id,
            direction = %op.direction,
            endpoint = %op.endpoint_at_start,
            bytes = op.bytes_transferred,
            "Endpoint changed in the middle of the {}", op.direction
        );
        OperationError::EndpointChangedMidOperation {
            endpoint: op.endpoint_at_start.to_string(),
        }
    }

    /// Stale streams go to the background closer; others close inline.
    async fn release(&self, op: &Operation, handle: Release, error: &OperationError) {
        match error {
            OperationError::EndpointChangedMidOperation { .. } => self.closer.release(&op.id, handle).await,
            OperationError::TransientIo(_) => self.closer.close_now(&op.id, handle).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    const BLOCK: u64 = 64 * 1024;

    fn settings(check_interval_bytes: usize) -> TransferSettings {
        TransferSettings {
            scheme: "hdfs".to_string(),
            chunk_size: 4096,
            check_interval_bytes,
            blocks: 1,
            block_size: BLOCK,
        }
    }

    struct Fixture {
        storage: MemoryStorage,
        state: Arc<FailoverState>,
        closer: Arc<CloseQueue>,
        op: StreamedOperation,
    }

    fn fixture(check_interval_bytes: usize) -> Fixture {
        let storage = MemoryStorage::new();
        let state = Arc::new(FailoverState::new(Endpoint::from("A")));
        let closer = Arc::new(CloseQueue::with_limits(4, Duration::from_secs(1)));
        let op = StreamedOperation::new(
            Arc::new(storage.clone()),
            state.clone(),
            settings(check_interval_bytes),
            closer.clone(),
        );
        Fixture {
            storage,
            state,
            closer,
            op,
        }
    }

    /// Fail over to "B" once `at` bytes have moved; remember the last count seen.
    fn failover_at(f: &Fixture, at: u64) -> Arc<AtomicU64> {
        let seen = Arc::new(AtomicU64::new(0));
        let state = f.state.clone();
        let last = seen.clone();
        f.storage.set_chunk_hook(Arc::new(move |_: &str, bytes: u64| {
            last.store(bytes, Ordering::SeqCst);
            if bytes >= at {
                state.mark_changed(Endpoint::from("B"));
            }
        }));
        seen
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let f = fixture(4096);
        let before = f.state.snapshot();

        let written = f.op.run("host-1", Direction::Write, &Endpoint::from("A"), before).await.unwrap();
        assert_eq!(written.bytes, BLOCK);
        assert_eq!(f.storage.object("/host-1").unwrap().len() as u64, BLOCK);
        assert_eq!(&f.storage.object("/host-1").unwrap()[..4], &[0xde, 0xad, 0xbe, 0xef]);

        let read = f.op.run("host-1", Direction::Read, &Endpoint::from("A"), before).await.unwrap();
        assert_eq!(read.bytes, BLOCK);
        assert_eq!(f.storage.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_write_aborts_at_chunk_boundary() {
        let f = fixture(4096);
        let seen = failover_at(&f, 8192);
        let before = f.state.snapshot();

        let err = f.op.run("host-1", Direction::Write, &Endpoint::from("A"), before).await.unwrap_err();
        match err {
            OperationError::EndpointChangedMidOperation { endpoint } => assert_eq!(endpoint, "A"),
            other => panic!("unexpected error: {:?}", other),
        }
        // Nothing written past the chunk that observed the change.
        assert_eq!(seen.load(Ordering::SeqCst), 8192);
        assert!(f.storage.object("/host-1").is_none());

        f.closer.drain().await;
        assert_eq!(f.storage.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_per_byte_check_aborts_immediately() {
        let f = fixture(1);
        let seen = failover_at(&f, 5000);
        let before = f.state.snapshot();

        let err = f.op.run("host-1", Direction::Write, &Endpoint::from("A"), before).await.unwrap_err();
        assert!(matches!(err, OperationError::EndpointChangedMidOperation { .. }));
        assert_eq!(seen.load(Ordering::SeqCst), 5000);
    }

    #[tokio::test]
    async fn test_read_aborts_when_endpoint_changes() {
        let f = fixture(4096);
        f.storage.insert("/host-1", vec![0u8; 4 * 4096]);
        failover_at(&f, 8192);
        let before = f.state.snapshot();

        let err = f.op.run("host-1", Direction::Read, &Endpoint::from("A"), before).await.unwrap_err();
        assert!(matches!(err, OperationError::EndpointChangedMidOperation { .. }));

        f.closer.drain().await;
        assert_eq!(f.storage.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_change_before_start_is_not_mid_flight() {
        let f = fixture(4096);
        f.state.mark_changed(Endpoint::from("B"));
        let before = f.state.snapshot();

        let stats = f.op.run("host-1", Direction::Write, &Endpoint::from("B"), before).await.unwrap();
        assert_eq!(stats.bytes, BLOCK);
    }

    #[tokio::test]
    async fn test_io_error_releases_stream() {
        let f = fixture(4096);
        let storage = f.storage.clone();
        f.storage.set_chunk_hook(Arc::new(move |_: &str, bytes: u64| {
            if bytes >= 4096 {
                storage.set_down("A", true);
            }
        }));
        let before = f.state.snapshot();

        let err = f.op.run("host-1", Direction::Write, &Endpoint::from("A"), before).await.unwrap_err();
        assert!(matches!(err, OperationError::TransientIo(_)));
        assert_eq!(f.storage.open_handles(), 0);
        assert_eq!(f.closer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_missing_object_is_io_error() {
        let f = fixture(4096);
        let before = f.state.snapshot();

        let err = f.op.run("nope", Direction::Read, &Endpoint::from("A"), before).await.unwrap_err();
        match err {
            OperationError::TransientIo(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    /// Backend whose streams open fine and then never move a byte.
    #[derive(Clone, Default)]
    struct StalledStorage {
        closed: Arc<AtomicUsize>,
    }

    struct StalledStream {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ByteSource for StalledStream {
        async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
            std::future::pending().await
        }

        async fn close(self: Box<Self>) -> io::Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl ByteSink for StalledStream {
        async fn write_chunk(&mut self, _chunk: Bytes) -> io::Result<()> {
            std::future::pending().await
        }

        async fn close(self: Box<Self>) -> io::Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn abort(self: Box<Self>) -> io::Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl StorageClient for StalledStorage {
        async fn open(&self, _uri: &ObjectUri, _buffer_size: usize) -> io::Result<Box<dyn ByteSource>> {
            Ok(Box::new(StalledStream {
                closed: self.closed.clone(),
            }))
        }

        async fn create(&self, _uri: &ObjectUri, _overwrite: bool, _buffer_size: usize) -> io::Result<Box<dyn ByteSink>> {
            Ok(Box::new(StalledStream {
                closed: self.closed.clone(),
            }))
        }

        async fn list(&self, _uri: &ObjectUri) -> io::Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn delete(&self, _uri: &ObjectUri) -> io::Result<bool> {
            Ok(false)
        }
    }

    async fn run_stalled(direction: Direction) {
        let storage = StalledStorage::default();
        let state = Arc::new(FailoverState::new(Endpoint::from("A")));
        let closer = Arc::new(CloseQueue::with_limits(4, Duration::from_secs(1)));
        let op = StreamedOperation::new(Arc::new(storage.clone()), state.clone(), settings(4096), closer.clone());
        let before = state.snapshot();

        let publisher = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            publisher.mark_changed(Endpoint::from("B"));
        });

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            op.run("host-1", direction, &Endpoint::from("A"), before),
        )
        .await
        .expect("stalled transfer must end once the endpoint changes");
        match result {
            Err(OperationError::EndpointChangedMidOperation { endpoint }) => assert_eq!(endpoint, "A"),
            other => panic!("unexpected result: {:?}", other),
        }

        // The stale stream still goes through the closer.
        closer.drain().await;
        assert_eq!(storage.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stalled_read_aborts_on_failover() {
        run_stalled(Direction::Read).await;
    }

    #[tokio::test]
    async fn test_stalled_write_aborts_on_failover() {
        run_stalled(Direction::Write).await;
    }
}
