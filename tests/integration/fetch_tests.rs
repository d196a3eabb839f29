//! Fetcher retry, classification and proxy routing

use crate::common::{create_fetcher, fetch_config, robots_config};
use listing_ingest::{FetchError, Fetcher, ProxyEndpoint, ProxyPool, RobotsGate};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mounts a robots.txt that allows everything
async fn allow_all_robots(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let mock_server = MockServer::start().await;
    allow_all_robots(&mock_server).await;

    // Exactly max_retries requests, never more
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher(&fetch_config(3), &robots_config(true));
    let result = fetcher.fetch(&format!("{}/listings", mock_server.uri())).await;

    match result {
        Err(FetchError::HttpError { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected HTTP 503, got {:?}", other),
    }
}

#[tokio::test]
async fn test_permanent_status_not_retried() {
    let mock_server = MockServer::start().await;
    allow_all_robots(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher(&fetch_config(5), &robots_config(true));
    let result = fetcher.fetch(&format!("{}/gone", mock_server.uri())).await;

    assert_eq!(result.unwrap_err().status_code(), Some(404));
}

#[tokio::test]
async fn test_recovers_after_transient_errors() {
    let mock_server = MockServer::start().await;
    allow_all_robots(&mock_server).await;

    // First two requests fail, the third succeeds
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher(&fetch_config(3), &robots_config(true));
    let body = fetcher
        .fetch(&format!("{}/listings", mock_server.uri()))
        .await
        .expect("fetch should succeed on the third attempt");

    assert_eq!(body, "<html>ok</html>");
}

#[tokio::test]
async fn test_rate_limited_is_retried() {
    let mock_server = MockServer::start().await;
    allow_all_robots(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(200).set_body_string("page"))
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher(&fetch_config(2), &robots_config(true));
    let body = fetcher.fetch(&format!("{}/listings", mock_server.uri())).await;

    assert_eq!(body.unwrap(), "page");
}

#[tokio::test]
async fn test_timeout_is_classified_and_retried() {
    let mock_server = MockServer::start().await;
    allow_all_robots(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .expect(2)
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher(&fetch_config(2), &robots_config(true));
    let result = fetcher.fetch(&format!("{}/slow", mock_server.uri())).await;

    assert!(matches!(result, Err(FetchError::Timeout { .. })));
}

#[tokio::test]
async fn test_connection_refused_is_connection_error() {
    // Nothing listens on the discard port
    let fetcher = create_fetcher(&fetch_config(2), &robots_config(false));
    let result = fetcher.fetch_with_retry("http://127.0.0.1:9/listings").await;

    assert!(matches!(result, Err(FetchError::ConnectionError { .. })));
}

#[tokio::test]
async fn test_cancellation_interrupts_backoff() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetch = listing_ingest::config::FetchConfig {
        backoff_base_ms: 60_000,
        backoff_max_ms: 60_000,
        ..fetch_config(3)
    };
    let cancel = CancellationToken::new();
    let fetcher = create_fetcher(&fetch, &robots_config(false)).with_cancellation(cancel.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let result = fetcher
        .fetch_with_retry(&format!("{}/listings", mock_server.uri()))
        .await;
    canceller.await.unwrap();

    assert!(matches!(result, Err(FetchError::Cancelled { .. })));
}

#[tokio::test]
async fn test_requests_routed_through_proxy() {
    // The mock server plays the proxy; the target host does not resolve
    let proxy_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(200).set_body_string("via proxy"))
        .expect(1)
        .mount(&proxy_server)
        .await;

    let fetch = listing_ingest::config::FetchConfig {
        proxies: vec![proxy_server.uri()],
        ..fetch_config(1)
    };
    let pool = Arc::new(ProxyPool::from_config(&fetch));
    assert_eq!(pool.endpoints(), &[ProxyEndpoint::new(proxy_server.uri())]);

    let gate = Arc::new(RobotsGate::new(&fetch, &robots_config(false)).unwrap());
    let fetcher = Fetcher::new(&fetch, pool.clone(), gate).unwrap();

    let body = fetcher
        .fetch_with_retry("http://listings.invalid/listings")
        .await
        .expect("proxied fetch should succeed");

    assert_eq!(body, "via proxy");
    assert_eq!(pool.consecutive_failures(&pool.endpoints()[0]), 0);
}

#[tokio::test]
async fn test_failed_proxy_recorded() {
    let fetch = listing_ingest::config::FetchConfig {
        proxies: vec!["http://127.0.0.1:9".to_string()],
        proxy_failure_threshold: 5,
        ..fetch_config(2)
    };
    let pool = Arc::new(ProxyPool::from_config(&fetch));
    let gate = Arc::new(RobotsGate::new(&fetch, &robots_config(false)).unwrap());
    let fetcher = Fetcher::new(&fetch, pool.clone(), gate).unwrap();

    let result = fetcher.fetch_with_retry("http://listings.invalid/").await;

    assert!(result.is_err());
    assert_eq!(pool.consecutive_failures(&pool.endpoints()[0]), 2);
}

/// Serves headers promising 1000 bytes, then hangs up after a few
///
/// Returns the server address and a counter of accepted connections.
async fn truncated_body_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));

    let counter = connections.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\
                          Content-Length: 1000\r\nConnection: close\r\n\r\n\
                          <html><body>partial",
                    )
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}", addr), connections)
}

#[tokio::test]
async fn test_truncated_body_is_retried() {
    let (base, connections) = truncated_body_server().await;
    let fetcher = create_fetcher(&fetch_config(3), &robots_config(false));

    let result = fetcher.fetch_with_retry(&format!("{}/listings", base)).await;

    assert!(matches!(result, Err(FetchError::ContentFetchError { .. })));
    assert_eq!(connections.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_truncated_body_leaves_proxy_streak_alone() {
    let (proxy, connections) = truncated_body_server().await;
    let fetch = listing_ingest::config::FetchConfig {
        proxies: vec![proxy],
        proxy_failure_threshold: 1,
        ..fetch_config(2)
    };
    let pool = Arc::new(ProxyPool::from_config(&fetch));
    let gate = Arc::new(RobotsGate::new(&fetch, &robots_config(false)).unwrap());
    let fetcher = Fetcher::new(&fetch, pool.clone(), gate).unwrap();

    let result = fetcher.fetch_with_retry("http://listings.invalid/listings").await;

    assert!(matches!(result, Err(FetchError::ContentFetchError { .. })));
    assert_eq!(connections.load(Ordering::SeqCst), 2);
    let endpoint = &pool.endpoints()[0];
    assert_eq!(pool.consecutive_failures(endpoint), 0);
    assert!(pool.is_healthy(endpoint));
}

#[tokio::test]
async fn test_cancelled_request_leaves_proxy_healthy() {
    let proxy_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&proxy_server)
        .await;

    let fetch = listing_ingest::config::FetchConfig {
        proxies: vec![proxy_server.uri()],
        proxy_failure_threshold: 1,
        ..fetch_config(3)
    };
    let pool = Arc::new(ProxyPool::from_config(&fetch));
    let gate = Arc::new(RobotsGate::new(&fetch, &robots_config(false)).unwrap());
    let cancel = CancellationToken::new();
    let fetcher = Fetcher::new(&fetch, pool.clone(), gate)
        .unwrap()
        .with_cancellation(cancel.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let result = fetcher.fetch_with_retry("http://listings.invalid/listings").await;
    canceller.await.unwrap();

    assert!(matches!(result, Err(FetchError::Cancelled { .. })));
    let endpoint = &pool.endpoints()[0];
    assert_eq!(pool.consecutive_failures(endpoint), 0);
    assert!(pool.is_healthy(endpoint));
}
