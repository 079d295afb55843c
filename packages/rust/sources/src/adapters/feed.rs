//! RSS 2.0 and Atom feed adapter.
//!
//! Uses the quick-xml event reader rather than serde so namespaced elements
//! (`media:content`, `content:encoded`, `dc:date`) can be matched by their
//! qualified names.

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;
use url::Url;

use newsdesk_shared::{AdapterKind, ArticleDraft, NewsdeskError, Result, SourceConfig};

use super::{RawItem, RawPayload, SourceAdapter, normalize_item};
use crate::fetch::HttpFetcher;
use crate::images::{ImageCandidates, image_from_attrs, resolve_image};

/// Adapter for syndication feeds.
pub struct FeedAdapter;

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Feed
    }

    async fn fetch(&self, fetcher: &HttpFetcher, source: &SourceConfig) -> Result<RawPayload> {
        Ok(RawPayload::Markup(fetcher.get_text(source).await?))
    }

    fn parse(&self, payload: RawPayload, source: &SourceConfig) -> Result<Vec<ArticleDraft>> {
        let RawPayload::Markup(xml) = payload else {
            return Err(NewsdeskError::fetch(format!(
                "source '{}': feed adapter expects markup",
                source.name
            )));
        };
        let boilerplate = source.boilerplate_patterns()?;
        let base = Url::parse(&source.url).ok();

        let entries = parse_entries(&xml)
            .map_err(|e| NewsdeskError::fetch(format!("source '{}': {e}", source.name)))?;
        debug!(source = %source.name, entries = entries.len(), "parsed feed");

        Ok(entries
            .into_iter()
            .map(|entry| {
                let image = resolve_image(&entry.images, base.as_ref());
                let description = entry
                    .description
                    .or_else(|| entry.images.content_html.clone())
                    .unwrap_or_default();
                normalize_item(
                    RawItem {
                        link: entry.link.unwrap_or_default(),
                        title: entry.title.unwrap_or_default(),
                        description,
                        date: entry.date,
                        image: Some(image),
                    },
                    source,
                    &boilerplate,
                )
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Event-driven entry parsing
// ---------------------------------------------------------------------------

/// Fields gathered from one `<item>` or `<entry>`.
#[derive(Debug, Default)]
struct FeedEntry {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    date: Option<String>,
    images: ImageCandidates,
}

/// Text-bearing child elements we capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    Content,
    Date,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"link" => Some(Self::Link),
            b"description" | b"summary" => Some(Self::Description),
            b"content:encoded" | b"content" => Some(Self::Content),
            b"pubDate" | b"dc:date" | b"published" | b"updated" => Some(Self::Date),
            _ => None,
        }
    }
}

fn is_entry(name: &[u8]) -> bool {
    name == b"item" || name == b"entry"
}

fn parse_entries(xml: &str) -> std::result::Result<Vec<FeedEntry>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<FeedEntry> = None;
    // Field being captured and the element that opened it.
    let mut capture: Option<(Field, Vec<u8>)> = None;
    let mut buf = String::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name().as_ref().to_vec();
                if is_entry(&name) {
                    current = Some(FeedEntry::default());
                    depth = 0;
                    continue;
                }
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                depth += 1;
                if capture.is_some() {
                    continue;
                }
                collect_attrs(entry, &e);
                if depth == 1 {
                    if let Some(field) = Field::from_name(&name) {
                        capture = Some((field, name));
                        buf.clear();
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(entry) = current.as_mut() {
                    collect_attrs(entry, &e);
                }
            }
            Ok(Event::Text(t)) => {
                if capture.is_some() {
                    // Stray HTML entities are left for the markup stripper.
                    let text = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    push_text(&mut buf, &text);
                }
            }
            Ok(Event::CData(c)) => {
                if capture.is_some() {
                    push_text(&mut buf, &String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                if is_entry(name.as_ref()) {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                    capture = None;
                    continue;
                }
                if current.is_none() {
                    continue;
                }
                depth = depth.saturating_sub(1);
                let closes_capture = depth == 0
                    && matches!(&capture, Some((_, open)) if open.as_slice() == name.as_ref());
                if closes_capture {
                    if let (Some((field, _)), Some(entry)) = (capture.take(), current.as_mut()) {
                        store_field(entry, field, std::mem::take(&mut buf));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "invalid feed XML at position {}: {e}",
                    reader.buffer_position()
                ));
            }
            _ => {}
        }
    }

    Ok(entries)
}

fn push_text(buf: &mut String, text: &str) {
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(text);
}

fn store_field(entry: &mut FeedEntry, field: Field, text: String) {
    let text = text.trim().to_string();
    if text.is_empty() {
        return;
    }
    match field {
        Field::Title => entry.title.get_or_insert(text),
        // Atom links carry their target in `href`, handled in `collect_attrs`.
        Field::Link => entry.link.get_or_insert(text),
        Field::Description => entry.description.get_or_insert(text),
        Field::Content => entry.images.content_html.get_or_insert(text),
        Field::Date => entry.date.get_or_insert(text),
    };
    if field == Field::Description {
        entry.images.description_html = entry.description.clone();
    }
}

/// Pick up attribute-only data: media elements, enclosures, Atom links.
fn collect_attrs(entry: &mut FeedEntry, e: &BytesStart<'_>) {
    let name = e.name();
    match name.as_ref() {
        b"media:content" | b"media:thumbnail" => {
            let url = attr(e, b"url");
            let medium = attr(e, b"medium").or_else(|| attr(e, b"type"));
            let is_image = medium.as_deref().is_none_or(|m| {
                let m = m.to_ascii_lowercase();
                m == "image" || m.starts_with("image/")
            });
            let Some(url) = url.filter(|_| is_image) else {
                return;
            };
            let image = image_from_attrs(
                &url,
                attr(e, b"width").as_deref(),
                attr(e, b"height").as_deref(),
                None,
            );
            let slot = if name.as_ref() == b"media:content" {
                &mut entry.images.media_content
            } else {
                &mut entry.images.media_thumbnail
            };
            if slot.is_none() {
                *slot = image;
            }
        }
        b"enclosure" => {
            if let Some(url) = attr(e, b"url") {
                entry.images.enclosures.push((url, attr(e, b"type")));
            }
        }
        b"link" => {
            if entry.link.is_none() {
                let rel = attr(e, b"rel");
                if rel.as_deref().is_none_or(|r| r == "alternate") {
                    entry.link = attr(e, b"href");
                }
            }
        }
        _ => {}
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use newsdesk_shared::{ArticleImage, NO_DESCRIPTION, PLACEHOLDER_IMAGE_URL};

    fn media_dims(image: &Option<ArticleImage>) -> (Option<u32>, Option<u32>) {
        image.as_ref().map(|i| (i.width, i.height)).unwrap_or((None, None))
    }

    fn source() -> SourceConfig {
        SourceConfig {
            name: "Daily Coffee News".into(),
            url: "https://dailycoffeenews.com/feed".into(),
            kind: "feed".into(),
            timeout_ms: 1000,
            retry_count: 0,
            schedule: None,
            boilerplate: vec![r"Subscribe here for all the latest coffee industry news\.?".into()],
            selectors: None,
        }
    }

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"
     xmlns:content="http://purl.org/rss/1.0/modules/content/"
     xmlns:media="http://search.yahoo.com/mrss/"
     xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Daily Coffee News</title>
    <link>https://dailycoffeenews.com</link>
    <item>
      <title>Roast Report</title>
      <link>https://dailycoffeenews.com/2025/06/10/roast-report/</link>
      <pubDate>Tue, 10 Jun 2025 08:30:00 +0000</pubDate>
      <description><![CDATA[<p>A new roastery opened &amp; served.</p><p>Subscribe here for all the latest coffee industry news.</p>]]></description>
      <media:content url="https://cdn.ex.com/roast.jpg" width="1200" height="800" medium="image"/>
      <media:thumbnail url="https://cdn.ex.com/roast-thumb.jpg"/>
    </item>
    <item>
      <title>Design Details</title>
      <link>https://dailycoffeenews.com/2025/06/11/design/</link>
      <dc:date>2025-06-11T09:00:00Z</dc:date>
      <description>Short &lt;b&gt;teaser&lt;/b&gt;...</description>
      <content:encoded><![CDATA[<p>Body</p><img src="https://cdn.ex.com/inline.jpg" width="600" height="400">]]></content:encoded>
    </item>
    <item>
      <title>Podcast Episode</title>
      <link>https://dailycoffeenews.com/2025/06/12/podcast/</link>
      <enclosure url="https://cdn.ex.com/ep.mp3" type="audio/mpeg"/>
      <enclosure url="https://cdn.ex.com/cover.png" type="image/png"/>
    </item>
    <item>
      <title>Bare Item</title>
      <link>https://dailycoffeenews.com/2025/06/13/bare/</link>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <link href="https://ex.com/"/>
  <entry>
    <title type="html">Origin &amp; Terroir</title>
    <link rel="alternate" href="https://ex.com/origin"/>
    <link rel="enclosure" type="image/jpeg" href="https://ex.com/ignored.jpg"/>
    <updated>2025-06-10T10:00:00Z</updated>
    <summary>Farm visit in Huila.</summary>
  </entry>
</feed>"#;

    fn parse(xml: &str) -> Vec<ArticleDraft> {
        FeedAdapter
            .parse(RawPayload::Markup(xml.into()), &source())
            .expect("parse feed")
    }

    #[test]
    fn parses_rss_items_in_order() {
        let drafts = parse(RSS);
        assert_eq!(drafts.len(), 4);
        let titles: Vec<&str> = drafts.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Roast Report", "Design Details", "Podcast Episode", "Bare Item"]
        );
        assert!(drafts.iter().all(|d| d.source == "Daily Coffee News"));
        assert!(
            drafts
                .iter()
                .all(|d| d.domain.as_deref() == Some("dailycoffeenews.com"))
        );
    }

    #[test]
    fn first_item_uses_media_content_and_strips_boilerplate() {
        let drafts = parse(RSS);
        let first = &drafts[0];
        let image = first.image.as_ref().unwrap();
        assert_eq!(image.url, "https://cdn.ex.com/roast.jpg");
        assert_eq!((image.width, image.height), (Some(1200), Some(800)));
        assert_eq!(first.description, "A new roastery opened & served.");
        let date = first.published_at.unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2025, 6, 10));
        assert!(!first.published_at_estimated);
    }

    #[test]
    fn inline_content_image_and_escaped_description() {
        let drafts = parse(RSS);
        let second = &drafts[1];
        assert_eq!(
            second.image.as_ref().unwrap().url,
            "https://cdn.ex.com/inline.jpg"
        );
        assert_eq!(second.description, "Short teaser");
        assert_eq!(second.published_at.unwrap().day(), 11);
    }

    #[test]
    fn image_enclosure_and_placeholder() {
        let drafts = parse(RSS);
        assert_eq!(
            drafts[2].image.as_ref().unwrap().url,
            "https://cdn.ex.com/cover.png"
        );
        let bare = &drafts[3];
        assert_eq!(bare.image.as_ref().unwrap().url, PLACEHOLDER_IMAGE_URL);
        assert_eq!(bare.description, NO_DESCRIPTION);
        assert!(bare.published_at_estimated);
    }

    #[test]
    fn parses_atom_entries() {
        let drafts = parse(ATOM);
        assert_eq!(drafts.len(), 1);
        let entry = &drafts[0];
        assert_eq!(entry.title, "Origin & Terroir");
        assert_eq!(entry.link, "https://ex.com/origin");
        assert_eq!(entry.domain.as_deref(), Some("ex.com"));
        assert_eq!(entry.description, "Farm visit in Huila.");
        assert_eq!(entry.published_at.unwrap().day(), 10);
    }

    #[test]
    fn media_dimensions_are_parsed() {
        let entries = parse_entries(RSS).unwrap();
        assert_eq!(
            media_dims(&entries[0].images.media_content),
            (Some(1200), Some(800))
        );
        assert_eq!(media_dims(&entries[0].images.media_thumbnail), (None, None));
    }

    #[test]
    fn malformed_xml_is_fetch_error() {
        let err = FeedAdapter
            .parse(
                RawPayload::Markup("<rss><channel><item><title>x</item></rss>".into()),
                &source(),
            )
            .unwrap_err();
        assert!(matches!(err, NewsdeskError::Fetch { .. }));
    }
}
