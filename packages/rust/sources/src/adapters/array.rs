//! JSON array adapter.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use newsdesk_shared::{AdapterKind, ArticleDraft, ArticleImage, NewsdeskError, Result, SourceConfig};

use super::{RawItem, RawPayload, SourceAdapter, normalize_item, resolve_url};
use crate::fetch::HttpFetcher;
use crate::images::image_from_attrs;

/// Adapter for endpoints returning a JSON list of items.
pub struct ArrayAdapter;

#[async_trait]
impl SourceAdapter for ArrayAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Array
    }

    async fn fetch(&self, fetcher: &HttpFetcher, source: &SourceConfig) -> Result<RawPayload> {
        match fetcher.get_json(source).await? {
            Value::Array(items) => Ok(RawPayload::Items(items)),
            other => Err(NewsdeskError::fetch(format!(
                "source '{}': expected a JSON array, got {}",
                source.name,
                json_kind(&other)
            ))),
        }
    }

    fn parse(&self, payload: RawPayload, source: &SourceConfig) -> Result<Vec<ArticleDraft>> {
        let RawPayload::Items(items) = payload else {
            return Err(NewsdeskError::fetch(format!(
                "source '{}': array adapter expects JSON items",
                source.name
            )));
        };
        let boilerplate = source.boilerplate_patterns()?;
        let base = Url::parse(&source.url).ok();

        Ok(items
            .iter()
            .map(|item| normalize_item(raw_item(item, base.as_ref()), source, &boilerplate))
            .collect())
    }
}

fn raw_item(item: &Value, base: Option<&Url>) -> RawItem {
    RawItem {
        link: str_field(item, &["link", "url"])
            .map(|l| resolve_url(base, &l))
            .unwrap_or_default(),
        title: str_field(item, &["title"]).unwrap_or_default(),
        description: str_field(item, &["summary", "description"]).unwrap_or_default(),
        date: str_field(item, &["published", "publishedAt", "date"]),
        image: image_field(item.get("image"), base),
    }
}

/// First key present as a non-empty string.
fn str_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| item.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// `image` may be `{url, width, height}` or a bare URL string.
fn image_field(value: Option<&Value>, base: Option<&Url>) -> Option<ArticleImage> {
    match value? {
        Value::String(url) => image_from_attrs(url, None, None, base),
        Value::Object(obj) => {
            let url = obj.get("url").and_then(Value::as_str)?;
            let mut image = image_from_attrs(url, None, None, base)?;
            image.width = obj.get("width").and_then(dimension);
            image.height = obj.get("height").and_then(dimension);
            Some(image)
        }
        _ => None,
    }
}

fn dimension(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
