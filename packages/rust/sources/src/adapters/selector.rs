//! HTML listing-page adapter driven by CSS selectors.
//!
//! The default convention is a repeating `.article-item` element containing
//! `.article-title`, `a[href]`, `.article-summary`, `img[src]` and
//! `.article-date`. Sources can override any selector.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use newsdesk_shared::{AdapterKind, ArticleDraft, NewsdeskError, Result, SourceConfig};

use super::{RawItem, RawPayload, SourceAdapter, normalize_item, resolve_url};
use crate::fetch::HttpFetcher;
use crate::images::image_from_attrs;

/// Adapter for rendered HTML listing pages.
pub struct SelectorAdapter;

/// Compiled selectors for one source.
struct Compiled {
    item: Selector,
    title: Selector,
    link: Selector,
    summary: Selector,
    image: Selector,
    date: Selector,
}

impl Compiled {
    fn for_source(source: &SourceConfig) -> Result<Self> {
        let s = source.selectors();
        let parse = |css: &str| source.parse_selector(css);
        Ok(Self {
            item: parse(&s.item)?,
            title: parse(&s.title)?,
            link: parse(&s.link)?,
            summary: parse(&s.summary)?,
            image: parse(&s.image)?,
            date: parse(&s.date)?,
        })
    }
}

#[async_trait]
impl SourceAdapter for SelectorAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Selector
    }

    async fn fetch(&self, fetcher: &HttpFetcher, source: &SourceConfig) -> Result<RawPayload> {
        Ok(RawPayload::Markup(fetcher.get_text(source).await?))
    }

    fn parse(&self, payload: RawPayload, source: &SourceConfig) -> Result<Vec<ArticleDraft>> {
        let RawPayload::Markup(html) = payload else {
            return Err(NewsdeskError::fetch(format!(
                "source '{}': selector adapter expects markup",
                source.name
            )));
        };
        let selectors = Compiled::for_source(source)?;
        let boilerplate = source.boilerplate_patterns()?;
        let base = Url::parse(&source.url).ok();
        let doc = Html::parse_document(&html);

        Ok(doc
            .select(&selectors.item)
            .map(|item| normalize_item(raw_item(item, &selectors, base.as_ref()), source, &boilerplate))
            .collect())
    }
}

fn raw_item(item: ElementRef<'_>, s: &Compiled, base: Option<&Url>) -> RawItem {
    let link = item
        .select(&s.link)
        .find_map(|a| a.value().attr("href"))
        .or_else(|| item.value().attr("href"))
        .map(|href| resolve_url(base, href))
        .unwrap_or_default();

    let image = item.select(&s.image).find_map(|img| {
        let el = img.value();
        image_from_attrs(
            el.attr("src").or_else(|| el.attr("data-src"))?,
            el.attr("width"),
            el.attr("height"),
            base,
        )
    });

    let date = item.select(&s.date).next().and_then(|el| {
        el.value()
            .attr("datetime")
            .map(str::to_string)
            .or_else(|| Some(text_of(el)))
            .filter(|d| !d.is_empty())
    });

    RawItem {
        link,
        title: item.select(&s.title).next().map(text_of).unwrap_or_default(),
        description: item
            .select(&s.summary)
            .next()
            .map(|el| el.inner_html())
            .unwrap_or_default(),
        date,
        image,
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use newsdesk_shared::{NO_DESCRIPTION, PLACEHOLDER_IMAGE_URL, SelectorConfig};

    fn source() -> SourceConfig {
        SourceConfig {
            name: "SCA News".into(),
            url: "https://sca.coffee/sca-news".into(),
            kind: "selector".into(),
            timeout_ms: 1000,
            retry_count: 0,
            schedule: None,
            boilerplate: vec![],
            selectors: None,
        }
    }

    const PAGE: &str = r#"<html><body>
      <div class="article-item">
        <h2 class="article-title">Roast Report</h2>
        <a href="/sca-news/roast-report">Read</a>
        <p class="article-summary">Fresh <em>beans</em> &amp; news...</p>
        <img src="/img/roast.jpg" width="320" height="200">
        <time class="article-date" datetime="2025-06-10">June 10</time>
      </div>
      <div class="article-item">
        <h2 class="article-title">No Image</h2>
        <a href="https://other.com/story">Read</a>
        <span class="article-date">June 11, 2025</span>
      </div>
    </body></html>"#;

    #[test]
    fn parses_default_convention() {
        let drafts = SelectorAdapter
            .parse(RawPayload::Markup(PAGE.into()), &source())
            .expect("parse");
        assert_eq!(drafts.len(), 2);

        let first = &drafts[0];
        assert_eq!(first.title, "Roast Report");
        assert_eq!(first.link, "https://sca.coffee/sca-news/roast-report");
        assert_eq!(first.domain.as_deref(), Some("sca.coffee"));
        assert_eq!(first.description, "Fresh beans & news");
        let image = first.image.as_ref().unwrap();
        assert_eq!(image.url, "https://sca.coffee/img/roast.jpg");
        assert_eq!(image.width, Some(320));
        assert_eq!(first.published_at.unwrap().day(), 10);

        let second = &drafts[1];
        assert_eq!(second.domain.as_deref(), Some("other.com"));
        assert_eq!(second.description, NO_DESCRIPTION);
        assert_eq!(second.image.as_ref().unwrap().url, PLACEHOLDER_IMAGE_URL);
        assert_eq!(second.published_at.unwrap().day(), 11);
    }

    #[test]
    fn selector_overrides() {
        let html = r#"<ul>
            <li class="story"><a class="headline" href="/a">Alpha</a><div class="dek">Dek</div></li>
            <li class="story"><a class="headline" href="/b">Beta</a></li>
        </ul>"#;
        let mut s = source();
        s.selectors = Some(SelectorConfig {
            item: "li.story".into(),
            title: "a.headline".into(),
            link: "a.headline".into(),
            summary: ".dek".into(),
            ..SelectorConfig::default()
        });
        let drafts = SelectorAdapter
            .parse(RawPayload::Markup(html.into()), &s)
            .unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].title, "Alpha");
        assert_eq!(drafts[0].description, "Dek");
        assert_eq!(drafts[1].link, "https://sca.coffee/b");
    }

    #[test]
    fn invalid_selector_is_config_error() {
        let mut s = source();
        s.selectors = Some(SelectorConfig {
            item: "div[".into(),
            ..SelectorConfig::default()
        });
        let err = SelectorAdapter
            .parse(RawPayload::Markup(PAGE.into()), &s)
            .unwrap_err();
        assert!(matches!(err, NewsdeskError::Config { .. }));
    }
}
