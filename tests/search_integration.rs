//! Integration tests for aggregated search against mock catalogs.

use std::sync::Arc;
use std::time::Duration;

use bookloft_core::connector::{ArchiveConnector, Connector, GutendexConnector, OpenLibraryConnector};
use bookloft_core::record::{Provider, Readable, ReadabilityReason};
use bookloft_core::search::{Aggregator, SearchOptions};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::checker_for;
use support::socket_guard::start_mock_server_or_skip;

async fn mount_open_item(server: &MockServer, identifier: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/metadata/{identifier}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [{"name": format!("{identifier}.epub"), "format": "EPUB", "size": "524288"}],
            "metadata": {"collection": ["opensource"]}
        })))
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(path(format!("/download/{identifier}/{identifier}.epub")))
        .respond_with(ResponseTemplate::new(206).insert_header("content-type", "application/epub+zip"))
        .mount(server)
        .await;
}

async fn mount_archive_search(server: &MockServer, docs: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/advancedsearch.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": {"docs": docs}})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_ranked_search_puts_relevant_title_first_and_probes_it() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_archive_search(
        &server,
        json!([
            {"identifier": "clintoncash00schw", "title": "Clinton Cash", "creator": "Peter Schweizer"},
            {"identifier": "economicsinafric0000unse", "title": "Economics in Africa", "subject": ["Economics", "Africa"]}
        ]),
    )
    .await;
    mount_open_item(&server, "clintoncash00schw").await;
    mount_open_item(&server, "economicsinafric0000unse").await;

    let archive: Arc<dyn Connector> = Arc::new(ArchiveConnector::with_base_url(server.uri()).unwrap());
    let aggregator = Aggregator::new(vec![archive], checker_for(&server.uri()));

    let outcome = aggregator
        .search(
            "economics in africa",
            SearchOptions {
                ranked: true,
                ..SearchOptions::default()
            },
        )
        .await;

    assert_eq!(outcome.results.len(), 2);
    let first = &outcome.results[0];
    assert_eq!(first.record.title, "Economics in Africa");
    assert_eq!(first.key, "bl-book-economicsinafric0000unse");
    assert_eq!(first.readability.readable, Readable::True);
    assert!(first.score.unwrap() > outcome.results[1].score.unwrap());
}

#[tokio::test]
async fn test_same_scan_from_two_sources_appears_once() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "docs": [{
                "key": "/works/OL1W",
                "title": "Frankenstein",
                "author_name": ["Mary Shelley"],
                "ia": ["frankenstein00shel"],
                "ebook_access": "public"
            }]
        })))
        .mount(&server)
        .await;
    mount_archive_search(&server, json!([{"identifier": "frankenstein00shel", "title": "Frankenstein; or, The Modern Prometheus"}])).await;
    mount_open_item(&server, "frankenstein00shel").await;

    let connectors: Vec<Arc<dyn Connector>> = vec![
        Arc::new(OpenLibraryConnector::with_base_url(server.uri()).unwrap()),
        Arc::new(ArchiveConnector::with_base_url(server.uri()).unwrap()),
    ];
    let outcome = Aggregator::new(connectors, checker_for(&server.uri()))
        .search("frankenstein", SearchOptions::default())
        .await;

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].record.provider, Provider::OpenLibrary);
    assert_eq!(outcome.results[0].key, "bl-book-frankenstein00shel");
    assert_eq!(outcome.sources.iter().map(|s| s.count).sum::<usize>(), 2);
}

#[tokio::test]
async fn test_slow_source_times_out_without_blocking_others() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/books/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": []}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    mount_archive_search(&server, json!([{"identifier": "quicktext00", "title": "Quick Text"}])).await;

    let connectors: Vec<Arc<dyn Connector>> = vec![
        Arc::new(GutendexConnector::with_base_url(server.uri()).unwrap()),
        Arc::new(ArchiveConnector::with_base_url(server.uri()).unwrap()),
    ];
    let aggregator = Aggregator::new(connectors, checker_for(&server.uri()))
        .with_source_timeout_for("gutendex", Duration::from_millis(400))
        .with_probe_budget(0);

    let started = std::time::Instant::now();
    let outcome = aggregator.search("quick", SearchOptions::default()).await;

    assert!(started.elapsed() < Duration::from_secs(4));
    let gutendex = outcome.sources.iter().find(|s| s.source == "gutendex").unwrap();
    assert!(gutendex.timed_out);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].readability.reason, ReadabilityReason::NotProbed);
}

#[tokio::test]
async fn test_connector_retries_once_with_longer_deadline() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/books/"))
        .and(query_param("search", "frankenstein"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": []}))
                .set_delay(Duration::from_secs(2)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/books/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "id": 84,
                "title": "Frankenstein",
                "authors": [{"name": "Shelley, Mary Wollstonecraft"}],
                "copyright": false,
                "formats": {"application/epub+zip": "https://www.gutenberg.org/ebooks/84.epub3.images"}
            }]
        })))
        .mount(&server)
        .await;

    let gutendex = GutendexConnector::with_base_url(server.uri())
        .unwrap()
        .with_request_timeout(Duration::from_millis(300));
    let records = gutendex.try_search("frankenstein", 1).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].provider_id, "84");
}

#[tokio::test]
async fn test_failing_source_degrades_to_empty() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/books/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let gutendex = GutendexConnector::with_base_url(server.uri()).unwrap();
    assert!(gutendex.try_search("anything", 1).await.is_err());
    assert!(gutendex.search("anything", 1).await.is_empty());
}
