//! End-to-end passes: fetch → extract → publish

use crate::common::{
    create_fetcher, fetch_config, listing_page, property, robots_config, RecordingConnector,
};
use listing_ingest::ingest::run_passes;
use listing_ingest::output::PassOutcome;
use listing_ingest::{FailureReason, ListingExtractor, StaticPage, WorkerLoop};
use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn extractor() -> Arc<ListingExtractor> {
    Arc::new(ListingExtractor::with_source("mock_craigslist").expect("default schema compiles"))
}

#[tokio::test]
async fn test_full_pass_publishes_complete_listings() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/apartments"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page())
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let connector = Arc::new(RecordingConnector::default());
    let fetcher = create_fetcher(&fetch_config(3), &robots_config(true));
    let mut worker = WorkerLoop::new(fetcher, extractor(), connector.clone());

    let summary = worker
        .run(&format!("{}/apartments", mock_server.uri()))
        .await
        .expect("pass should reach a terminal state");

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.extracted, 2);
    assert_eq!(summary.published, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.outcome, PassOutcome::Completed);
    assert_eq!(connector.closes.load(Ordering::SeqCst), 1);

    let published = connector.published_json();
    assert_eq!(published[0]["title"], "Harbor View Loft");
    assert_eq!(published[1]["title"], "Maple Street Duplex");
    assert_eq!(published[1]["url"], "/l/3");
    assert!(published.iter().all(|p| p["source"] == "mock_craigslist"));
}

#[tokio::test]
async fn test_payload_key_order() {
    let connector = Arc::new(RecordingConnector::default());
    let page = StaticPage::new(format!("<html><body>{}</body></html>", property("Solo", "/s")));
    let mut worker = WorkerLoop::new(page, extractor(), connector.clone());

    worker.run("https://listings.example.com/").await.unwrap();

    let payloads = connector.payloads.lock().unwrap();
    let text = std::str::from_utf8(&payloads[0]).unwrap();
    assert_eq!(
        text,
        r#"{"title":"Solo","price":"$2,100/mo","location":"Riverside","url":"/s","date_posted":"2024-04-20","source":"mock_craigslist"}"#
    );
}

#[tokio::test]
async fn test_partial_batch_failure_is_durable() {
    let connector = Arc::new(RecordingConnector {
        fail_at: Some(1),
        ..RecordingConnector::default()
    });
    let page = StaticPage::new(format!(
        "<html><body>{}{}{}</body></html>",
        property("One", "/1"),
        property("Two", "/2"),
        property("Three", "/3")
    ));
    let mut worker = WorkerLoop::new(page, extractor(), connector.clone());

    let summary = worker.run("https://listings.example.com/").await.unwrap();

    assert_eq!(summary.published, 2);
    assert_eq!(summary.failed, 1);
    assert!(summary.is_success());

    let titles: Vec<_> = connector
        .published_json()
        .iter()
        .map(|p| p["title"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(titles, vec!["One", "Three"]);
}

#[tokio::test]
async fn test_blocked_and_allowed_targets_in_one_run() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /members"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page()))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/members"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let targets = vec![
        format!("{}/members", mock_server.uri()),
        format!("{}/public", mock_server.uri()),
    ];
    let connector = Arc::new(RecordingConnector::default());
    let fetcher = create_fetcher(&fetch_config(2), &robots_config(true));

    let summaries = run_passes(
        &targets,
        fetcher,
        extractor(),
        connector.clone(),
        2,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].outcome, PassOutcome::Failed(FailureReason::Blocked));
    assert_eq!(summaries[0].published, 0);
    assert_eq!(summaries[1].outcome, PassOutcome::Completed);
    assert_eq!(summaries[1].published, 2);

    // One channel per pass, each closed
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    assert_eq!(connector.closes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fallback_markup_end_to_end() {
    let html = r#"<html><body>
        <div class="property-listing">
            <div>
                <h2 class="title">Container Child</h2>
                <p class="price">$750</p>
                <p class="location">Old Town</p>
                <a class="url" href="https://example.com/c/1">Details</a>
                <span class="date-posted">2024-05-01</span>
            </div>
        </div>
    </body></html>"#;
    let connector = Arc::new(RecordingConnector::default());
    let mut worker = WorkerLoop::new(StaticPage::new(html), extractor(), connector.clone());

    let summary = worker.run("https://listings.example.com/").await.unwrap();

    assert_eq!(summary.published, 1);
    assert_eq!(connector.published_json()[0]["title"], "Container Child");
}

#[tokio::test]
async fn test_html_file_source() {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    write!(file, "{}", listing_page()).expect("Failed to write fixture");

    let page = StaticPage::from_file(file.path()).expect("Failed to load fixture");
    let connector = Arc::new(RecordingConnector::default());
    let target = format!("file://{}", file.path().display());

    let summaries = run_passes(
        &[target],
        page,
        extractor(),
        connector.clone(),
        1,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(summaries[0].extracted, 2);
    assert_eq!(summaries[0].published, 2);
}
