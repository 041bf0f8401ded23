//! Integration tests for the HTTP engine
//!
//! Covers `get` and `download` against wiremock servers: retries, the
//! connection ceiling and the on-disk results of downloads.

use cake_crawler::network::{DownloadInfo, EngineConfig, FetchError, HttpEngine};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RETRY_DELAY: Duration = Duration::from_millis(20);

fn test_engine(max_connections: usize, retries: u32) -> HttpEngine {
    HttpEngine::from_config(EngineConfig {
        max_connections,
        timeout: Duration::from_secs(5),
        retries,
        get_retry_delay: RETRY_DELAY,
        download_retry_delay: RETRY_DELAY,
    })
}

const FULL_BODY: usize = 100;
const CUT_AT: usize = 40;

/// Serves a 100 byte body, hanging up after 40 bytes on the first
/// `truncated` connections. Returns the url and a connection counter.
async fn truncating_server(truncated: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let body: Vec<u8> = (0..FULL_BODY as u8).collect();
            let sent = if attempt < truncated { CUT_AT } else { FULL_BODY };
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                FULL_BODY
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body[..sent]).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}/file.bin", addr), hits)
}

#[tokio::test]
async fn test_get_returns_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello crawler"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let engine = test_engine(2, 3);
    let body = engine
        .get(&format!("{}/page", mock_server.uri()), None)
        .await
        .expect("get should succeed");

    assert_eq!(body, "hello crawler");
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn test_get_sends_headers() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("X-Crawl-Id", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut headers = HashMap::new();
    headers.insert("X-Crawl-Id".to_string(), "42".to_string());

    let engine = test_engine(2, 1);
    let body = engine
        .get(&format!("{}/page", mock_server.uri()), Some(&headers))
        .await
        .expect("get should succeed");
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_get_recovers_after_transient_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("second time lucky"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let engine = test_engine(2, 3);
    let body = engine
        .get(&format!("{}/flaky", mock_server.uri()), None)
        .await
        .expect("get should succeed on retry");
    assert_eq!(body, "second time lucky");
}

#[tokio::test]
async fn test_get_exhausts_retries() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let engine = test_engine(2, 3);
    let start = Instant::now();
    let result = engine
        .get(&format!("{}/broken", mock_server.uri()), None)
        .await;

    let err = result.expect_err("get should fail");
    assert!(matches!(
        err,
        FetchError::RetriesExhausted {
            op: "GET",
            retries: 3,
            ..
        }
    ));
    assert_eq!(err.status(), Some(500));

    // Two pauses between three attempts, none after the last
    assert!(start.elapsed() >= RETRY_DELAY * 2);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn test_invalid_header_fails_without_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut headers = HashMap::new();
    headers.insert("Bad Header".to_string(), "value".to_string());

    let engine = test_engine(2, 3);
    let err = engine
        .get(&format!("{}/page", mock_server.uri()), Some(&headers))
        .await
        .expect_err("invalid header name should be rejected");
    assert!(err.is_validation());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connection_ceiling_is_respected() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("slow")
                .set_delay(Duration::from_millis(300)),
        )
        .expect(6)
        .mount(&mock_server)
        .await;

    let engine = Arc::new(test_engine(2, 1));
    let url = format!("{}/slow", mock_server.uri());
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let engine = engine.clone();
        let url = url.clone();
        handles.push(tokio::spawn(async move { engine.get(&url, None).await }));
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(engine.in_flight(), 2);
    assert_eq!(engine.available_permits(), 0);

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    // Six requests, two at a time, 300ms each
    assert!(start.elapsed() >= Duration::from_millis(900));
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn test_download_writes_file() {
    let mock_server = MockServer::start().await;
    // Larger than one write buffer so the body is written in pieces
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("nested").join("downloads");
    let info = DownloadInfo::new(
        format!("{}/file.bin", mock_server.uri()),
        &target,
        "file.bin",
    );

    let engine = test_engine(2, 3);
    let result = engine.download(&info).await;

    assert!(result.is_success(), "download failed: {:?}", result.error);
    assert_eq!(result.file_size, payload.len() as u64);
    assert_eq!(result.file_full_name, target.join("file.bin"));
    assert_eq!(std::fs::read(target.join("file.bin")).unwrap(), payload);
}

#[tokio::test]
async fn test_download_sends_headers() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.txt"))
        .and(header("Authorization", "Bearer token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let info = DownloadInfo::new(
        format!("{}/file.txt", mock_server.uri()),
        dir.path(),
        "file.txt",
    )
    .with_header("Authorization", "Bearer token");

    let size = test_engine(1, 1)
        .download(&info)
        .await
        .into_result()
        .expect("download should succeed");
    assert_eq!(size, 6);
}

#[tokio::test]
async fn test_download_existing_file_is_skipped() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("new content"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let existing = dir.path().join("page.html");
    std::fs::write(&existing, "old content").unwrap();

    let info = DownloadInfo::new(
        format!("{}/page.html", mock_server.uri()),
        dir.path(),
        "page.html",
    );
    let result = test_engine(2, 3).download(&info).await;

    assert!(matches!(result.error, Some(FetchError::AlreadyExists(_))));
    assert_eq!(result.file_size, 0);
    assert_eq!(std::fs::read_to_string(&existing).unwrap(), "old content");
}

#[tokio::test]
async fn test_download_overwrites_when_asked() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("new"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let existing = dir.path().join("page.html");
    std::fs::write(&existing, "much older and longer content").unwrap();

    let info = DownloadInfo::new(
        format!("{}/page.html", mock_server.uri()),
        dir.path(),
        "page.html",
    )
    .overwrite(true);
    let result = test_engine(2, 3).download(&info).await;

    assert!(result.is_success());
    assert_eq!(std::fs::read_to_string(&existing).unwrap(), "new");
}

#[tokio::test]
async fn test_download_exhausts_retries() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.zip"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let info = DownloadInfo::new(
        format!("{}/gone.zip", mock_server.uri()),
        dir.path(),
        "gone.zip",
    );
    let engine = test_engine(2, 3);
    let result = engine.download(&info).await;

    match &result.error {
        Some(FetchError::RetriesExhausted { op, retries, status, .. }) => {
            assert_eq!(*op, "Download");
            assert_eq!(*retries, 3);
            assert_eq!(*status, Some(503));
        }
        other => panic!("unexpected result: {:?}", other),
    }

    // The destination was created before the first attempt and stays empty
    assert_eq!(result.file_size, 0);
    let metadata = std::fs::metadata(dir.path().join("gone.zip")).unwrap();
    assert_eq!(metadata.len(), 0);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn test_download_restarts_after_broken_body() {
    let (url, hits) = truncating_server(1).await;
    let dir = TempDir::new().unwrap();
    let info = DownloadInfo::new(url, dir.path(), "file.bin");

    let engine = test_engine(1, 3);
    let result = engine.download(&info).await;

    assert!(result.is_success(), "download failed: {:?}", result.error);
    assert_eq!(result.file_size, FULL_BODY as u64);
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    // The cut-off first attempt must not leave bytes in front of the retry
    let expected: Vec<u8> = (0..FULL_BODY as u8).collect();
    assert_eq!(std::fs::read(dir.path().join("file.bin")).unwrap(), expected);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn test_download_keeps_partial_body_when_retries_run_out() {
    let (url, hits) = truncating_server(usize::MAX).await;
    let dir = TempDir::new().unwrap();
    let info = DownloadInfo::new(url, dir.path(), "file.bin");

    let result = test_engine(1, 2).download(&info).await;

    match &result.error {
        Some(FetchError::RetriesExhausted {
            op,
            retries,
            status,
            cause,
            ..
        }) => {
            assert_eq!(*op, "Download");
            assert_eq!(*retries, 2);
            assert_eq!(*status, Some(200));
            assert!(cause.contains("after 40 bytes"), "cause: {}", cause);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    assert_eq!(result.file_size, CUT_AT as u64);
    let expected: Vec<u8> = (0..CUT_AT as u8).collect();
    assert_eq!(std::fs::read(dir.path().join("file.bin")).unwrap(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_download_and_get_share_the_ceiling() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("payload")
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("page")
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let engine = Arc::new(test_engine(1, 1));
    let dir = TempDir::new().unwrap();
    let info = DownloadInfo::new(
        format!("{}/slow.bin", mock_server.uri()),
        dir.path(),
        "slow.bin",
    );
    let page_url = format!("{}/slow", mock_server.uri());
    let start = Instant::now();

    let download = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.download(&info).await })
    };
    let get = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.get(&page_url, None).await })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(engine.in_flight(), 1);
    assert_eq!(engine.available_permits(), 0);

    let downloaded = download.await.unwrap();
    assert!(downloaded.is_success(), "download failed: {:?}", downloaded.error);
    assert_eq!(get.await.unwrap().unwrap(), "page");

    // One permit, so the two slow requests ran back to back
    assert!(start.elapsed() >= Duration::from_millis(600));
    assert_eq!(engine.in_flight(), 0);
}
