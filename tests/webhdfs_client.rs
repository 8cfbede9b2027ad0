//! WebHDFS client against a mock name node.

use std::io;
use std::time::{Duration, Instant};

use failover_bench::config::StorageConfig;
use failover_bench::locator::Endpoint;
use failover_bench::storage::{ObjectUri, StorageClient, WebHdfsClient};

mod common;
use common::{start_programmable_backend, MockResponse};

fn client() -> WebHdfsClient {
    client_with_timeout(5)
}

fn client_with_timeout(request_timeout_secs: u64) -> WebHdfsClient {
    let config = StorageConfig {
        user: Some("bench".to_string()),
        request_timeout_secs,
        ..StorageConfig::default()
    };
    WebHdfsClient::new(&config).unwrap()
}

fn uri(addr: std::net::SocketAddr, object: &str) -> ObjectUri {
    ObjectUri::new("hdfs", &Endpoint::from(addr.to_string()), object).unwrap()
}

#[tokio::test]
async fn test_open_streams_in_chunks() {
    let (addr, seen) = start_programmable_backend(|_| async { MockResponse::bytes(200, vec![0xab; 10_000]) }).await;

    let mut source = client().open(&uri(addr, "host-1"), 4096).await.unwrap();
    let mut total = 0;
    while let Some(chunk) = source.read_chunk().await.unwrap() {
        assert!(chunk.len() <= 4096);
        total += chunk.len();
    }
    source.close().await.unwrap();
    assert_eq!(total, 10_000);

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(
        requests[0].target,
        "/webhdfs/v1/host-1?op=OPEN&buffersize=4096&user.name=bench"
    );
}

#[tokio::test]
async fn test_list_status() {
    let body = r#"{"FileStatuses":{"FileStatus":[{"pathSuffix":"a-1"},{"pathSuffix":"a-2"}]}}"#;
    let (addr, seen) = start_programmable_backend(move |_| async move { MockResponse::json(200, body) }).await;

    let names = client().list(&ObjectUri::root("hdfs", &Endpoint::from(addr.to_string())).unwrap()).await.unwrap();
    assert_eq!(names, vec!["a-1", "a-2"]);
    assert_eq!(seen.lock().unwrap()[0].target, "/webhdfs/v1/?op=LISTSTATUS&user.name=bench");
}

#[tokio::test]
async fn test_delete() {
    let (addr, seen) = start_programmable_backend(|_| async { MockResponse::json(200, r#"{"boolean":true}"#) }).await;

    assert!(client().delete(&uri(addr, "host-1")).await.unwrap());
    let request = seen.lock().unwrap()[0].clone();
    assert_eq!(request.method, "DELETE");
    assert!(request.target.contains("op=DELETE&recursive=true"));
}

#[tokio::test]
async fn test_missing_file_maps_to_not_found() {
    let (addr, _) = start_programmable_backend(|_| async {
        MockResponse::json(404, r#"{"RemoteException":{"exception":"FileNotFoundException"}}"#)
    })
    .await;

    let err = client().open(&uri(addr, "nope"), 4096).await.err().unwrap();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
}

#[tokio::test]
async fn test_create_without_redirect_fails() {
    let (addr, seen) = start_programmable_backend(|_| async { MockResponse::json(403, "{}") }).await;

    let err = client().create(&uri(addr, "host-1"), true, 4096).await.err().unwrap();
    assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

    let request = seen.lock().unwrap()[0].clone();
    assert_eq!(request.method, "PUT");
    assert!(request.target.starts_with("/webhdfs/v1/host-1?op=CREATE&overwrite=true&buffersize=4096"));
}

#[tokio::test]
async fn test_body_stalled_after_headers_times_out() {
    let (addr, _) = start_programmable_backend(|_| async { MockResponse::stalled(200, 10_000, vec![0xab; 100]) }).await;

    let start = Instant::now();
    let mut source = client_with_timeout(1).open(&uri(addr, "host-1"), 4096).await.unwrap();
    let err = loop {
        match source.read_chunk().await {
            Ok(Some(_)) => continue,
            Ok(None) => panic!("stalled body must not end cleanly"),
            Err(e) => break e,
        }
    };
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_silent_name_node_times_out() {
    let (addr, _) = start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        MockResponse::json(200, "{}")
    })
    .await;

    let start = Instant::now();
    let err = client_with_timeout(1).open(&uri(addr, "host-1"), 4096).await.err().unwrap();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert!(start.elapsed() < Duration::from_secs(5));
}
