//! Source adapter trait and built-in adapters.
//!
//! Each adapter knows how to fetch one shape of source (syndication feed,
//! JSON array, HTML listing page) and turn it into [`ArticleDraft`]s. Adapters
//! never drop items: the validator decides what is acceptable.

mod array;
mod feed;
mod selector;

use async_trait::async_trait;
use regex::Regex;
use url::Url;

use newsdesk_shared::text::{clean_description, extract_domain, published_or_now, strip_markup};
use newsdesk_shared::{
    AdapterKind, ArticleDraft, ArticleImage, NewsdeskError, Result, SourceConfig,
};

use crate::fetch::HttpFetcher;

pub use array::ArrayAdapter;
pub use feed::FeedAdapter;
pub use selector::SelectorAdapter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// What an adapter's fetch step hands to its parse step.
#[derive(Debug, Clone)]
pub enum RawPayload {
    /// Feed XML or page HTML.
    Markup(String),
    /// Items of a JSON array response.
    Items(Vec<serde_json::Value>),
}

/// Fetch and parse for one kind of source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The configuration kind this adapter serves.
    fn kind(&self) -> AdapterKind;

    /// Retrieve the raw payload for `source`.
    async fn fetch(&self, fetcher: &HttpFetcher, source: &SourceConfig) -> Result<RawPayload>;

    /// Turn a payload into drafts, normalized but not validated.
    fn parse(&self, payload: RawPayload, source: &SourceConfig) -> Result<Vec<ArticleDraft>>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Static mapping from [`AdapterKind`] to adapter instances.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Create a registry with all built-in adapters.
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Box::new(FeedAdapter),
                Box::new(ArrayAdapter),
                Box::new(SelectorAdapter),
            ],
        }
    }

    /// Create a registry with only the given adapters.
    pub fn with_adapters(adapters: Vec<Box<dyn SourceAdapter>>) -> Self {
        Self { adapters }
    }

    /// Adapter for `kind`.
    pub fn get(&self, kind: AdapterKind) -> Result<&dyn SourceAdapter> {
        self.adapters
            .iter()
            .find(|a| a.kind() == kind)
            .map(|a| a.as_ref())
            .ok_or_else(|| NewsdeskError::config(format!("no adapter registered for '{kind}'")))
    }

    /// Adapter for a configured source.
    pub fn for_source(&self, source: &SourceConfig) -> Result<&dyn SourceAdapter> {
        self.get(source.adapter_kind()?)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Shared normalization
// ---------------------------------------------------------------------------

/// An item as pulled out of a payload, before normalization.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawItem {
    pub link: String,
    pub title: String,
    pub description: String,
    pub date: Option<String>,
    pub image: Option<ArticleImage>,
}

/// Apply the normalization every adapter shares.
pub(crate) fn normalize_item(item: RawItem, source: &SourceConfig, boilerplate: &[Regex]) -> ArticleDraft {
    let link = item.link.trim().to_string();
    let (published_at, published_at_estimated) = published_or_now(item.date.as_deref());

    ArticleDraft {
        domain: extract_domain(&link),
        link,
        title: strip_markup(&item.title),
        source: source.name.clone(),
        published_at: Some(published_at),
        published_at_estimated,
        description: clean_description(&item.description, boilerplate),
        image: Some(item.image.unwrap_or_else(ArticleImage::placeholder)),
    }
}

/// Resolve a possibly relative reference against the source URL.
pub(crate) fn resolve_url(base: Option<&Url>, href: &str) -> String {
    let href = href.trim();
    match base.and_then(|b| b.join(href).ok()) {
        Some(resolved) => resolved.to_string(),
        None => href.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceConfig {
        SourceConfig {
            name: "Example".into(),
            url: "https://ex.com/news".into(),
            kind: "selector".into(),
            timeout_ms: 1000,
            retry_count: 0,
            schedule: None,
            boilerplate: vec![r"Read more at Example\.?".into()],
            selectors: None,
        }
    }

    #[test]
    fn registry_has_every_kind() {
        let registry = AdapterRegistry::new();
        for kind in [AdapterKind::Feed, AdapterKind::Array, AdapterKind::Selector] {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn registry_rejects_unknown_source_kind() {
        let registry = AdapterRegistry::new();
        let mut s = source();
        s.kind = "gopher".into();
        let err = registry.for_source(&s).err().expect("unknown kind");
        assert!(matches!(err, NewsdeskError::Config { .. }));
    }

    #[test]
    fn normalization_fills_shared_fields() {
        let s = source();
        let patterns = s.boilerplate_patterns().unwrap();
        let draft = normalize_item(
            RawItem {
                link: " https://ex.com/story ".into(),
                title: "<b>Roast</b> Report".into(),
                description: "<p>Fresh beans.</p> READ MORE AT EXAMPLE.".into(),
                date: Some("2025-06-10".into()),
                image: None,
            },
            &s,
            &patterns,
        );
        assert_eq!(draft.link, "https://ex.com/story");
        assert_eq!(draft.domain.as_deref(), Some("ex.com"));
        assert_eq!(draft.title, "Roast Report");
        assert_eq!(draft.source, "Example");
        assert_eq!(draft.description, "Fresh beans.");
        assert!(!draft.published_at_estimated);
        assert_eq!(draft.image, Some(ArticleImage::placeholder()));
    }

    #[test]
    fn relative_urls_resolve_against_source() {
        let base = Url::parse("https://ex.com/news/").unwrap();
        assert_eq!(resolve_url(Some(&base), "/a/1"), "https://ex.com/a/1");
        assert_eq!(resolve_url(Some(&base), "b"), "https://ex.com/news/b");
        assert_eq!(resolve_url(None, "https://x.com/c"), "https://x.com/c");
    }
}
