//! OAI-PMH harvest into the local catalog against a mock endpoint.

use bookloft_core::catalog::{Catalog, OaiHarvester};
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

fn list_records(records: &[(&str, &str, &str)], token: Option<&str>) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/"><ListRecords>"#,
    );
    for (id, title, url) in records {
        body.push_str(&format!(
            "<record><header><identifier>{id}</identifier></header><metadata><oai_dc:dc>\
             <dc:title>{title}</dc:title><dc:creator>Author, Some</dc:creator>\
             <dc:identifier>{url}</dc:identifier><dc:date>2020</dc:date>\
             </oai_dc:dc></metadata></record>"
        ));
    }
    if let Some(token) = token {
        body.push_str(&format!("<resumptionToken>{token}</resumptionToken>"));
    }
    body.push_str("</ListRecords></OAI-PMH>");
    body
}

#[tokio::test]
async fn test_harvest_follows_resumption_tokens_and_feeds_catalog() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(query_param("metadataPrefix", "oai_dc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(list_records(
            &[
                ("oai:doab:1", "Economics of Development in Africa", "https://library.oapen.org/bitstream/1/a.pdf"),
                ("oai:doab:2", "Rivers of Europe", "https://library.oapen.org/bitstream/2/b.epub"),
            ],
            Some("page-2"),
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("resumptionToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(list_records(
            &[("oai:doab:3", "African Trade Networks", "https://library.oapen.org/bitstream/3/c.pdf")],
            Some("page-3"),
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("resumptionToken", "page-3"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let harvester = OaiHarvester::with_base_url(server.uri()).unwrap().with_max_pages(5);
    let records = harvester.harvest().await;
    assert_eq!(records.len(), 3);

    let catalog = Catalog::new();
    assert_eq!(catalog.ingest(records.clone()), 3);
    assert_eq!(catalog.ingest(records), 0);

    let hits = catalog.search("africa", None);
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|hit| hit.external_only));
    assert!(hits.iter().all(|hit| hit.record.title.contains("Africa")));
}

#[tokio::test]
async fn test_harvest_stops_at_page_cap() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(query_param("verb", "ListRecords"))
        .respond_with(ResponseTemplate::new(200).set_body_string(list_records(
            &[("oai:doab:9", "Endless Book", "https://library.oapen.org/bitstream/9/e.pdf")],
            Some("again"),
        )))
        .expect(2)
        .mount(&server)
        .await;

    let records = OaiHarvester::with_base_url(server.uri())
        .unwrap()
        .with_max_pages(2)
        .harvest()
        .await;

    assert_eq!(records.len(), 2);
}
