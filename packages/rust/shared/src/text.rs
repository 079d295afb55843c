//! Text normalization shared by adapters, the enricher and the publisher.
//!
//! Every helper is a pure `&str -> String` (or `Option`) function so that the
//! same rules apply whether text arrives from a feed, a JSON API, a scraped
//! page or the classifier.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use scraper::Html;
use url::Url;

use crate::types::NO_DESCRIPTION;

/// Characters treated as dashes in generated summaries.
const DASHES: &[char] = &['-', '\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}', '\u{2015}', '\u{2212}'];

/// Collapse all whitespace runs (including newlines) into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip markup and decode entities, returning plain text.
pub fn strip_markup(raw: &str) -> String {
    if !raw.contains('<') && !raw.contains('&') {
        return collapse_whitespace(raw);
    }
    let fragment = Html::parse_fragment(raw);
    let text = fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    collapse_whitespace(&text)
}

/// Produce the stored description for a source item.
///
/// Markup is stripped, entities decoded, source boilerplate removed and a
/// trailing ellipsis dropped. Empty input yields the no-description marker.
pub fn clean_description(raw: &str, boilerplate: &[Regex]) -> String {
    static ELLIPSIS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\.\.\.|\u{2026}|\[\u{2026}\]|\[\.\.\.\])\s*$").expect("valid regex"));

    let mut text = strip_markup(raw);
    for pattern in boilerplate {
        text = pattern.replace_all(&text, "").trim().to_string();
    }
    let text = collapse_whitespace(&text);
    let text = ELLIPSIS_RE.replace(&text, "").trim().to_string();

    if text.is_empty() {
        NO_DESCRIPTION.to_string()
    } else {
        text
    }
}

/// Lowercase every word, then uppercase its first character.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace every dash character with a space and re-collapse whitespace.
pub fn replace_dashes(text: &str) -> String {
    collapse_whitespace(&text.replace(DASHES, " "))
}

/// Keep at most `max_words` whitespace-separated words.
pub fn bound_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncate to at most `max_chars` characters, preferring a word boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    trimmed
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':'))
        .to_string()
}

/// Make sure the text ends with a period.
///
/// Trailing separators are dropped and a final `!` or `?` becomes `.`.
/// Empty input yields the no-description marker.
pub fn ensure_period(text: &str) -> String {
    let trimmed = text
        .trim()
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '\u{2026}'));
    if trimmed.is_empty() {
        return NO_DESCRIPTION.to_string();
    }
    if trimmed.ends_with('.') {
        return trimmed.to_string();
    }
    match trimmed.strip_suffix(['!', '?']) {
        Some(rest) => format!("{}.", rest.trim_end()),
        None => format!("{trimmed}."),
    }
}

/// Hostname of a link, if it parses as an absolute URL.
pub fn extract_domain(link: &str) -> Option<String> {
    Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

/// Parse a publish date in any of the formats sources commonly emit.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

/// Parse a publish date, defaulting to now when absent or unparseable.
///
/// The flag is `true` when the returned date is the fallback.
pub fn published_or_now(raw: Option<&str>) -> (DateTime<Utc>, bool) {
    match raw.and_then(parse_date) {
        Some(date) => (date, false),
        None => (Utc::now(), true),
    }
}
