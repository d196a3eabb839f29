//! Robots.txt gating against live mock servers

use crate::common::{create_fetcher, fetch_config, robots_config, USER_AGENT};
use listing_ingest::{FetchError, RobotsGate};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gate(default_deny: bool) -> RobotsGate {
    RobotsGate::new(&fetch_config(1), &robots_config(default_deny)).expect("Failed to build gate")
}

#[tokio::test]
async fn test_disallowed_path_never_fetched() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private/listings"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0) // Should never be called
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher(&fetch_config(3), &robots_config(true));
    let url = format!("{}/private/listings", mock_server.uri());
    let result = fetcher.fetch(&url).await;

    assert_eq!(result, Err(FetchError::Blocked { url }));
}

#[tokio::test]
async fn test_agent_specific_rules() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "User-agent: ListingIngestTest\nDisallow: /\n\nUser-agent: *\nAllow: /",
        ))
        .mount(&mock_server)
        .await;

    let gate = gate(true);
    let url = format!("{}/apartments", mock_server.uri());

    assert!(!gate.allowed(&url).await);
    assert!(gate.allowed_for(&url, "OtherBot/2.0").await);
}

#[tokio::test]
async fn test_unreachable_robots_default_deny() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let url = format!("{}/listings", mock_server.uri());
    assert!(!gate(true).allowed(&url).await);
    assert!(gate(false).allowed(&url).await);
}

#[tokio::test]
async fn test_unreachable_decision_not_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&mock_server)
        .await;

    let gate = gate(true);
    let url = format!("{}/listings", mock_server.uri());
    assert!(!gate.allowed(&url).await);
    assert!(!gate.allowed(&url).await);
    assert!(gate.cached(&mock_server.uri(), USER_AGENT).await.is_none());
}

#[tokio::test]
async fn test_missing_robots_allows_all() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    assert!(gate(true).allowed(&format!("{}/anything", mock_server.uri())).await);
}

#[tokio::test]
async fn test_robots_fetched_once_per_site() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gate = Arc::new(gate(true));
    let base = mock_server.uri();

    let mut handles = Vec::new();
    for i in 0..8 {
        let gate = gate.clone();
        let url = format!("{}/page/{}", base, i);
        handles.push(tokio::spawn(async move { gate.allowed(&url).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    let cached = gate
        .cached(&base, USER_AGENT)
        .await
        .expect("robots.txt should be cached");
    assert!(cached.is_allowed(&format!("{}/page/0", base), "ListingIngestTest"));
}

async fn serve_robots(response: ResponseTemplate) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(response)
        .mount(&mock_server)
        .await;
    mock_server
}

#[tokio::test]
async fn test_html_error_page_uses_unreachable_policy() {
    let mock_server = serve_robots(
        ResponseTemplate::new(200)
            .set_body_string("<html><body><h1>Service Unavailable</h1></body></html>"),
    )
    .await;

    let url = format!("{}/listings", mock_server.uri());
    assert!(!gate(true).allowed(&url).await);
    assert!(gate(false).allowed(&url).await);
}

#[tokio::test]
async fn test_rate_limited_robots_uses_unreachable_policy() {
    let mock_server = serve_robots(ResponseTemplate::new(429)).await;

    let url = format!("{}/listings", mock_server.uri());
    let gate = gate(true);
    assert!(!gate.allowed(&url).await);
    assert!(gate.cached(&mock_server.uri(), USER_AGENT).await.is_none());
}

#[tokio::test]
async fn test_non_utf8_robots_uses_unreachable_policy() {
    let mock_server = serve_robots(
        ResponseTemplate::new(200)
            .set_body_bytes(b"\xFF\xFE\xC3(\nUser-agent: *\nAllow: /".to_vec()),
    )
    .await;

    let url = format!("{}/listings", mock_server.uri());
    assert!(!gate(true).allowed(&url).await);
}

#[tokio::test]
async fn test_empty_robots_allows_all() {
    let mock_server = serve_robots(ResponseTemplate::new(200).set_body_string("")).await;

    assert!(gate(true).allowed(&format!("{}/listings", mock_server.uri())).await);
}

#[tokio::test]
async fn test_expired_entry_is_refetched() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let gate = RobotsGate::with_client(reqwest::Client::new(), USER_AGENT, true, 1);
    let url = format!("{}/listings", mock_server.uri());

    assert!(gate.allowed(&url).await);
    assert!(gate.allowed(&url).await);

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    assert!(gate.allowed(&url).await);
}
