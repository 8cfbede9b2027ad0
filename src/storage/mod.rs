//! Storage client subsystem.
//!
//! # Data Flow
//! ```text
//! ObjectUri (<scheme>://<endpoint>/<object>)
//!     → StorageClient::create → ByteSink   (write_chunk ..., close commits)
//!     → StorageClient::open   → ByteSource (read_chunk ... None, close)
//!     → StorageClient::list / delete
//! ```
//!
//! # Design Decisions
//! - Every failure is an `io::Error`; classification happens in the retry path
//! - Streams are boxed trait objects so a stale handle can be released on a
//!   background task after an aborted attempt
//! - The endpoint is part of every URI, so each attempt is pinned to the
//!   endpoint it captured at start

pub mod memory;
pub mod payload;
pub mod webhdfs;

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::config::{StorageBackend, StorageConfig};
use crate::locator::Endpoint;

pub use memory::MemoryStorage;
pub use payload::{DeadBeefSource, NullSink};
pub use webhdfs::WebHdfsClient;

/// Location of one object on one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUri {
    url: Url,
    endpoint: Endpoint,
}

impl ObjectUri {
    /// Build `<scheme>://<endpoint>/<object>`. An empty object names the root.
    pub fn new(scheme: &str, endpoint: &Endpoint, object: &str) -> io::Result<Self> {
        let raw = format!("{}://{}/{}", scheme, endpoint, object.trim_start_matches('/'));
        let url = Url::parse(&raw)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid object URI {raw}: {e}")))?;
        Ok(Self {
            url,
            endpoint: endpoint.clone(),
        })
    }

    /// Root of the namespace on `endpoint`.
    pub fn root(scheme: &str, endpoint: &Endpoint) -> io::Result<Self> {
        Self::new(scheme, endpoint, "")
    }

    /// `host:port` the URI points at.
    pub fn authority(&self) -> &str {
        self.endpoint.as_str()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Absolute object path, always starting with `/`.
    pub fn path(&self) -> &str {
        match self.url.path() {
            "" => "/",
            path => path,
        }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl std::fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Chunked readable stream.
#[async_trait]
pub trait ByteSource: Send {
    /// Next chunk, or `None` at end of stream.
    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>>;

    /// Release the stream.
    async fn close(self: Box<Self>) -> io::Result<()>;
}

/// Chunked writable stream.
#[async_trait]
pub trait ByteSink: Send {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()>;

    /// Flush and commit the object.
    async fn close(self: Box<Self>) -> io::Result<()>;

    /// Release the stream without committing.
    async fn abort(self: Box<Self>) -> io::Result<()>;
}

/// Operations the benchmark runs against the storage service.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn open(&self, uri: &ObjectUri, buffer_size: usize) -> io::Result<Box<dyn ByteSource>>;

    async fn create(&self, uri: &ObjectUri, overwrite: bool, buffer_size: usize) -> io::Result<Box<dyn ByteSink>>;

    /// Names of the entries directly under `uri`.
    async fn list(&self, uri: &ObjectUri) -> io::Result<Vec<String>>;

    /// Returns whether something was deleted.
    async fn delete(&self, uri: &ObjectUri) -> io::Result<bool>;
}

/// Build the configured storage client.
pub fn from_config(config: &StorageConfig) -> io::Result<Arc<dyn StorageClient>> {
    match config.backend {
        StorageBackend::Webhdfs => Ok(Arc::new(WebHdfsClient::new(config)?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
    }
}
