//! Image extraction for feed entries.
//!
//! Feeds carry images in several places. Strategies are tried in a fixed
//! order and the first one that yields a URL wins; the placeholder image is
//! used when none does.

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use newsdesk_shared::ArticleImage;

/// Image-bearing parts of a single feed entry.
#[derive(Debug, Clone, Default)]
pub struct ImageCandidates {
    /// `<media:content url=.. width=.. height=..>`
    pub media_content: Option<ArticleImage>,
    /// `<media:thumbnail url=..>`
    pub media_thumbnail: Option<ArticleImage>,
    /// Raw HTML of `<content:encoded>` (or Atom `<content>`).
    pub content_html: Option<String>,
    /// Raw HTML of `<description>` (or Atom `<summary>`).
    pub description_html: Option<String>,
    /// `<enclosure>` entries as `(url, type)`.
    pub enclosures: Vec<(String, Option<String>)>,
}

type Strategy = fn(&ImageCandidates, Option<&Url>) -> Option<ArticleImage>;

/// Strategies in priority order.
const STRATEGIES: [(&str, Strategy); 5] = [
    ("media_content", from_media_content),
    ("media_thumbnail", from_media_thumbnail),
    ("content_img", from_content_html),
    ("description_img", from_description_html),
    ("enclosure", from_enclosure),
];

/// Pick the image for an entry. Never fails: falls back to the placeholder.
pub fn resolve_image(candidates: &ImageCandidates, base: Option<&Url>) -> ArticleImage {
    for (name, strategy) in STRATEGIES {
        if let Some(image) = strategy(candidates, base) {
            debug!(strategy = name, url = %image.url, "image found");
            return image;
        }
    }
    ArticleImage::placeholder()
}

fn from_media_content(c: &ImageCandidates, _base: Option<&Url>) -> Option<ArticleImage> {
    c.media_content.clone().filter(|i| !i.url.trim().is_empty())
}

fn from_media_thumbnail(c: &ImageCandidates, _base: Option<&Url>) -> Option<ArticleImage> {
    c.media_thumbnail.clone().filter(|i| !i.url.trim().is_empty())
}

fn from_content_html(c: &ImageCandidates, base: Option<&Url>) -> Option<ArticleImage> {
    c.content_html.as_deref().and_then(|html| first_img(html, base))
}

fn from_description_html(c: &ImageCandidates, base: Option<&Url>) -> Option<ArticleImage> {
    c.description_html.as_deref().and_then(|html| first_img(html, base))
}

fn from_enclosure(c: &ImageCandidates, _base: Option<&Url>) -> Option<ArticleImage> {
    c.enclosures
        .iter()
        .find(|(url, mime)| {
            !url.trim().is_empty()
                && mime
                    .as_deref()
                    .is_some_and(|m| m.to_ascii_lowercase().starts_with("image/"))
        })
        .map(|(url, _)| ArticleImage {
            url: url.trim().to_string(),
            width: None,
            height: None,
        })
}

/// First `<img src>` in an HTML fragment, with dimensions when present.
pub fn first_img(html: &str, base: Option<&Url>) -> Option<ArticleImage> {
    if !html.contains("<img") && !html.contains("<IMG") {
        return None;
    }
    let fragment = Html::parse_fragment(html);
    let sel = Selector::parse("img[src]").ok()?;
    let img = fragment.select(&sel).next()?;
    image_from_attrs(
        img.value().attr("src")?,
        img.value().attr("width"),
        img.value().attr("height"),
        base,
    )
}

/// Build an image from raw attribute values, resolving `src` against `base`.
pub fn image_from_attrs(
    src: &str,
    width: Option<&str>,
    height: Option<&str>,
    base: Option<&Url>,
) -> Option<ArticleImage> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    let url = match base {
        Some(base) => base.join(src).ok()?.to_string(),
        None => src.to_string(),
    };
    Some(ArticleImage {
        url,
        width: width.and_then(parse_dimension),
        height: height.and_then(parse_dimension),
    })
}

/// Parse `"640"` or `"640px"`; anything else is ignored.
fn parse_dimension(raw: &str) -> Option<u32> {
    raw.trim().trim_end_matches("px").parse().ok()
}
