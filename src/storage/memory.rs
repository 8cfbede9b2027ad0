//! Process-local storage with fault injection.
//!
//! Objects live in one map shared by every endpoint, like a replicated
//! namespace behind a failing-over primary. An endpoint marked down refuses
//! new calls and breaks streams already open against it.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::storage::{ByteSink, ByteSource, ObjectUri, StorageClient};

/// Called after every chunk moved through a stream with
/// `(object path, bytes moved so far)`.
pub type ChunkHook = Arc<dyn Fn(&str, u64) + Send + Sync>;

/// One recorded storage call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCall {
    pub op: &'static str,
    pub endpoint: String,
    pub path: String,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, Bytes>,
    down: HashSet<String>,
    fail_next: u32,
    calls: Vec<StorageCall>,
    hook: Option<ChunkHook>,
}

/// In-memory [`StorageClient`].
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
    open_handles: Arc<AtomicUsize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse every call against `endpoint` while `down` is true.
    pub fn set_down(&self, endpoint: &str, down: bool) {
        let mut inner = self.lock();
        if down {
            inner.down.insert(endpoint.to_string());
        } else {
            inner.down.remove(endpoint);
        }
    }

    /// Fail the next `n` calls with a connection reset.
    pub fn fail_next(&self, n: u32) {
        self.lock().fail_next = n;
    }

    pub fn set_chunk_hook(&self, hook: ChunkHook) {
        self.lock().hook = Some(hook);
    }

    /// Store an object directly.
    pub fn insert(&self, path: &str, data: impl Into<Bytes>) {
        self.lock().objects.insert(path.to_string(), data.into());
    }

    pub fn object(&self, path: &str) -> Option<Bytes> {
        self.lock().objects.get(path).cloned()
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        self.lock().calls.clone()
    }

    /// Streams opened and not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Record a call and apply injected faults.
    fn enter(&self, op: &'static str, uri: &ObjectUri) -> io::Result<()> {
        let mut inner = self.lock();
        inner.calls.push(StorageCall {
            op,
            endpoint: uri.authority().to_string(),
            path: uri.path().to_string(),
        });
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "injected failure"));
        }
        check_up(&inner, uri.authority())
    }

    fn is_down(&self, endpoint: &str) -> io::Result<()> {
        check_up(&self.lock(), endpoint)
    }

    fn hook(&self) -> Option<ChunkHook> {
        self.lock().hook.clone()
    }

    fn handle(&self) -> HandleGuard {
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        HandleGuard(self.open_handles.clone())
    }
}

fn check_up(inner: &Inner, endpoint: &str) -> io::Result<()> {
    if inner.down.contains(endpoint) {
        return Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!("{endpoint} is not available"),
        ));
    }
    Ok(())
}

struct HandleGuard(Arc<AtomicUsize>);

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn open(&self, uri: &ObjectUri, buffer_size: usize) -> io::Result<Box<dyn ByteSource>> {
        self.enter("open", uri)?;
        let data = self
            .object(uri.path())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{} not found", uri.path())))?;

        Ok(Box::new(MemorySource {
            storage: self.clone(),
            endpoint: uri.authority().to_string(),
            path: uri.path().to_string(),
            data,
            pos: 0,
            chunk_size: buffer_size.max(1),
            _handle: self.handle(),
        }))
    }

    async fn create(&self, uri: &ObjectUri, overwrite: bool, buffer_size: usize) -> io::Result<Box<dyn ByteSink>> {
        self.enter("create", uri)?;
        if !overwrite && self.object(uri.path()).is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", uri.path()),
            ));
        }

        Ok(Box::new(MemorySink {
            storage: self.clone(),
            endpoint: uri.authority().to_string(),
            path: uri.path().to_string(),
            buf: BytesMut::with_capacity(buffer_size),
            _handle: self.handle(),
        }))
    }

    async fn list(&self, uri: &ObjectUri) -> io::Result<Vec<String>> {
        self.enter("list", uri)?;
        let prefix = match uri.path() {
            "/" => "/".to_string(),
            path => format!("{}/", path.trim_end_matches('/')),
        };
        let inner = self.lock();
        Ok(inner
            .objects
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    async fn delete(&self, uri: &ObjectUri) -> io::Result<bool> {
        self.enter("delete", uri)?;
        Ok(self.lock().objects.remove(uri.path()).is_some())
    }
}

struct MemorySource {
    storage: MemoryStorage,
    endpoint: String,
    path: String,
    data: Bytes,
    pos: usize,
    chunk_size: usize,
    _handle: HandleGuard,
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        self.storage.is_down(&self.endpoint)?;
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let end = (self.pos + self.chunk_size).min(self.data.len());
        let chunk = self.data.slice(self.pos..end);
        self.pos = end;

        if let Some(hook) = self.storage.hook() {
            hook(&self.path, self.pos as u64);
        }
        Ok(Some(chunk))
    }

    async fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

struct MemorySink {
    storage: MemoryStorage,
    endpoint: String,
    path: String,
    buf: BytesMut,
    _handle: HandleGuard,
}

#[async_trait]
impl ByteSink for MemorySink {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.storage.is_down(&self.endpoint)?;
        self.buf.extend_from_slice(&chunk);

        if let Some(hook) = self.storage.hook() {
            hook(&self.path, self.buf.len() as u64);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> io::Result<()> {
        self.storage.is_down(&self.endpoint)?;
        let this = *self;
        this.storage.insert(&this.path, this.buf.freeze());
        Ok(())
    }

    async fn abort(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}
