//! WebHDFS REST client.
//!
//! ```text
//! OPEN       GET    /webhdfs/v1/<path>?op=OPEN&buffersize=N        (redirect followed)
//! CREATE     PUT    /webhdfs/v1/<path>?op=CREATE&overwrite=B       → 307 Location
//!            PUT    <Location> (streamed body)                     → 201
//! LISTSTATUS GET    /webhdfs/v1/<path>?op=LISTSTATUS               → FileStatuses JSON
//! DELETE     DELETE /webhdfs/v1/<path>?op=DELETE&recursive=true    → {"boolean": b}
//! ```
//!
//! Streamed calls have no overall deadline, but every wait on the wire
//! (response head, next body chunk, upload queue slot) is bounded by the
//! request timeout so a half-open connection surfaces as `TimedOut`.

use std::io;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{header, redirect, Client, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::StorageConfig;
use crate::storage::{ByteSink, ByteSource, ObjectUri, StorageClient};

/// Chunks buffered between a writer and the upload request.
const UPLOAD_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Deserialize)]
struct ListStatusResponse {
    #[serde(rename = "FileStatuses")]
    file_statuses: FileStatuses,
}

#[derive(Debug, Deserialize)]
struct FileStatuses {
    #[serde(rename = "FileStatus", default)]
    file_status: Vec<FileStatus>,
}

#[derive(Debug, Deserialize)]
struct FileStatus {
    #[serde(rename = "pathSuffix")]
    path_suffix: String,
}

#[derive(Debug, Deserialize)]
struct BooleanResponse {
    boolean: bool,
}

/// [`StorageClient`] speaking the WebHDFS REST API.
#[derive(Debug, Clone)]
pub struct WebHdfsClient {
    /// Follows redirects (OPEN, metadata calls, data node uploads).
    http: Client,
    /// Stops at the name node's redirect (CREATE step one).
    no_redirect: Client,
    user: Option<String>,
    request_timeout: Duration,
}

impl WebHdfsClient {
    pub fn new(config: &StorageConfig) -> io::Result<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let http = Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(to_io)?;
        let no_redirect = Client::builder()
            .connect_timeout(request_timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(to_io)?;

        Ok(Self {
            http,
            no_redirect,
            user: config.user.clone(),
            request_timeout,
        })
    }

    /// REST URL for `op` on the object named by `uri`.
    fn op_url(&self, uri: &ObjectUri, op: &str, params: &[(&str, String)]) -> io::Result<Url> {
        let raw = format!("http://{}/webhdfs/v1{}", uri.authority(), uri.path());
        let mut url = Url::parse(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("op", op);
            for (key, value) in params {
                query.append_pair(key, value);
            }
            if let Some(user) = &self.user {
                query.append_pair("user.name", user);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl StorageClient for WebHdfsClient {
    async fn open(&self, uri: &ObjectUri, buffer_size: usize) -> io::Result<Box<dyn ByteSource>> {
        let url = self.op_url(uri, "OPEN", &[("buffersize", buffer_size.to_string())])?;
        tracing::debug!(url = %url, "WebHDFS OPEN");

        let response = within(self.request_timeout, "OPEN response", self.http.get(url).send()).await?;
        let response = check_status(response, "OPEN")?;
        Ok(Box::new(WebHdfsSource {
            stream: Box::pin(response.bytes_stream()),
            pending: Bytes::new(),
            chunk_size: buffer_size.max(1),
            idle_timeout: self.request_timeout,
        }))
    }

    async fn create(&self, uri: &ObjectUri, overwrite: bool, buffer_size: usize) -> io::Result<Box<dyn ByteSink>> {
        let url = self.op_url(
            uri,
            "CREATE",
            &[
                ("overwrite", overwrite.to_string()),
                ("buffersize", buffer_size.to_string()),
            ],
        )?;
        tracing::debug!(url = %url, "WebHDFS CREATE");

        let response = self
            .no_redirect
            .put(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(to_io)?;
        let location = data_node_location(&response)?;

        let (tx, rx) = mpsc::channel::<Bytes>(UPLOAD_QUEUE_DEPTH);
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok::<Bytes, io::Error>(chunk), rx))
        });
        let upload = self.http.put(location).body(reqwest::Body::wrap_stream(stream));
        let task = tokio::spawn(async move {
            let response = upload.send().await.map_err(to_io)?;
            check_status(response, "CREATE").map(|_| ())
        });

        Ok(Box::new(WebHdfsSink {
            tx: Some(tx),
            task,
            idle_timeout: self.request_timeout,
        }))
    }

    async fn list(&self, uri: &ObjectUri) -> io::Result<Vec<String>> {
        let url = self.op_url(uri, "LISTSTATUS", &[])?;
        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(to_io)?;
        let listing: ListStatusResponse = check_status(response, "LISTSTATUS")?.json().await.map_err(to_io)?;

        Ok(listing
            .file_statuses
            .file_status
            .into_iter()
            .map(|status| status.path_suffix)
            .collect())
    }

    async fn delete(&self, uri: &ObjectUri) -> io::Result<bool> {
        let url = self.op_url(uri, "DELETE", &[("recursive", "true".to_string())])?;
        let response = self
            .http
            .delete(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(to_io)?;
        let result: BooleanResponse = check_status(response, "DELETE")?.json().await.map_err(to_io)?;
        Ok(result.boolean)
    }
}

type BodyStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

struct WebHdfsSource {
    stream: BodyStream,
    pending: Bytes,
    chunk_size: usize,
    idle_timeout: Duration,
}

#[async_trait]
impl ByteSource for WebHdfsSource {
    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        while self.pending.is_empty() {
            let next = tokio::time::timeout(self.idle_timeout, self.stream.next())
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "timed out waiting for OPEN body chunk"))?;
            match next {
                Some(Ok(bytes)) => self.pending = bytes,
                Some(Err(e)) => return Err(to_io(e)),
                None => return Ok(None),
            }
        }
        let len = self.pending.len().min(self.chunk_size);
        Ok(Some(self.pending.split_to(len)))
    }

    async fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

struct WebHdfsSink {
    tx: Option<mpsc::Sender<Bytes>>,
    task: JoinHandle<io::Result<()>>,
    idle_timeout: Duration,
}

#[async_trait]
impl ByteSink for WebHdfsSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "upload already finished"))?;
        match tokio::time::timeout(self.idle_timeout, tx.send(chunk)).await {
            Ok(sent) => sent.map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "upload request ended early")),
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "data node stopped accepting upload")),
        }
    }

    async fn close(self: Box<Self>) -> io::Result<()> {
        let WebHdfsSink { tx, task, .. } = *self;
        // Ends the body stream.
        drop(tx);
        match task.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }

    async fn abort(self: Box<Self>) -> io::Result<()> {
        self.task.abort();
        Ok(())
    }
}

/// Await one wire step, failing with `TimedOut` after `deadline`.
async fn within<T, F>(deadline: Duration, what: &str, step: F) -> io::Result<T>
where
    F: std::future::Future<Output = reqwest::Result<T>>,
{
    match tokio::time::timeout(deadline, step).await {
        Ok(result) => result.map_err(to_io),
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, format!("timed out waiting for {what}"))),
    }
}

fn data_node_location(response: &Response) -> io::Result<Url> {
    if response.status() != StatusCode::TEMPORARY_REDIRECT {
        return Err(status_error(response.status(), "CREATE"));
    }
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "CREATE redirect without Location"))?;
    Url::parse(location).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn check_status(response: Response, op: &str) -> io::Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(status_error(response.status(), op))
    }
}

fn status_error(status: StatusCode, op: &str) -> io::Error {
    let kind = match status {
        StatusCode::NOT_FOUND => io::ErrorKind::NotFound,
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => io::ErrorKind::PermissionDenied,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => io::ErrorKind::TimedOut,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, format!("WebHDFS {op} failed with status {status}"))
}

fn to_io(e: reqwest::Error) -> io::Error {
    let kind = if e.is_timeout() {
        io::ErrorKind::TimedOut
    } else if e.is_connect() {
        io::ErrorKind::ConnectionRefused
    } else if e.is_decode() {
        io::ErrorKind::InvalidData
    } else {
        io::ErrorKind::Other
    };
    io::Error::new(kind, e)
}
