//! Source fetching, parsing and image extraction.
//!
//! This crate provides:
//! - [`HttpFetcher`] an HTTP client with per-source timeouts and retry
//! - [`adapters`] feed, JSON array and CSS selector source adapters
//! - [`AdapterRegistry`] a static mapping from adapter kind to adapter
//! - [`images`] ordered image-extraction strategies for feed entries

pub mod adapters;
pub mod fetch;
pub mod images;

use tracing::{debug, instrument};

use newsdesk_shared::{ArticleDraft, Result, SourceConfig};

pub use adapters::{
    AdapterRegistry, ArrayAdapter, FeedAdapter, RawPayload, SelectorAdapter, SourceAdapter,
};
pub use fetch::HttpFetcher;

/// Fetch and parse one source with the adapter its kind selects.
#[instrument(skip_all, fields(source = %source.name, kind = %source.kind))]
pub async fn fetch_source(
    registry: &AdapterRegistry,
    fetcher: &HttpFetcher,
    source: &SourceConfig,
) -> Result<Vec<ArticleDraft>> {
    let adapter = registry.for_source(source)?;
    let payload = adapter.fetch(fetcher, source).await?;
    let drafts = adapter.parse(payload, source)?;
    debug!(items = drafts.len(), "source parsed");
    Ok(drafts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use newsdesk_shared::NewsdeskError;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer, route: &str, kind: &str, retries: u32) -> SourceConfig {
        SourceConfig {
            name: format!("{kind} source"),
            url: format!("{}{route}", server.uri()),
            kind: kind.into(),
            timeout_ms: 2000,
            retry_count: retries,
            schedule: None,
            boilerplate: vec![],
            selectors: None,
        }
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new()
            .unwrap()
            .with_retry_delay(Duration::from_millis(1))
    }

    const FEED: &str = r#"<rss version="2.0"><channel>
        <item><title>Roast Report</title><link>https://ex.com/1</link>
          <pubDate>Tue, 10 Jun 2025 08:30:00 +0000</pubDate>
          <description>Fresh beans.</description></item>
    </channel></rss>"#;

    #[tokio::test]
    async fn fetches_and_parses_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&server)
            .await;

        let drafts = fetch_source(
            &AdapterRegistry::new(),
            &fetcher(),
            &source(&server, "/feed", "feed", 0),
        )
        .await
        .expect("fetch feed");

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "Roast Report");
        assert_eq!(drafts[0].link, "https://ex.com/1");
    }

    #[tokio::test]
    async fn retries_transient_status_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .expect(1)
            .mount(&server)
            .await;

        let drafts = fetch_source(
            &AdapterRegistry::new(),
            &fetcher(),
            &source(&server, "/feed", "feed", 3),
        )
        .await
        .expect("fetch after retries");
        assert_eq!(drafts.len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_retry_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetch_source(
            &AdapterRegistry::new(),
            &fetcher(),
            &source(&server, "/feed", "feed", 2),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, NewsdeskError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetch_source(
            &AdapterRegistry::new(),
            &fetcher(),
            &source(&server, "/missing", "feed", 3),
        )
        .await
        .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn array_source_rejects_non_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"articles": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = fetch_source(
            &AdapterRegistry::new(),
            &fetcher(),
            &source(&server, "/api", "array", 3),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, NewsdeskError::Fetch { .. }));
        assert!(err.to_string().contains("expected a JSON array"));
    }

    #[tokio::test]
    async fn array_source_parses_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"link": "https://ex.com/1", "title": "One", "summary": "First."},
                {"link": "https://ex.com/2", "title": "Two", "summary": "Second."}
            ])))
            .mount(&server)
            .await;

        let drafts = fetch_source(
            &AdapterRegistry::new(),
            &fetcher(),
            &source(&server, "/api", "array", 0),
        )
        .await
        .unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[1].title, "Two");
    }

    #[tokio::test]
    async fn selector_source_resolves_relative_links() {
        let server = MockServer::start().await;
        let page = r#"<html><body>
            <div class="article-item">
              <h3 class="article-title">Local Story</h3>
              <a href="/news/local">More</a>
            </div>
        </body></html>"#;
        Mock::given(method("GET"))
            .and(path("/news"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;

        let drafts = fetch_source(
            &AdapterRegistry::new(),
            &fetcher(),
            &source(&server, "/news", "selector", 0),
        )
        .await
        .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].link, format!("{}/news/local", server.uri()));
    }
}
