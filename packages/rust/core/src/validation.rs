//! Two-pass article validation.
//!
//! The initial pass runs on adapter output before anything is stored. The
//! final pass runs on enrichment output before it is written. Neither pass
//! returns an error of the crate taxonomy: violations are data.

use std::fmt;

use serde::Serialize;
use url::Url;

use newsdesk_shared::{Article, ArticleDraft, ArticleImage, NO_DESCRIPTION, NewArticle};

/// Largest number of tags an article may carry.
pub const MAX_TAGS: usize = 2;

/// One field-level rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: &'static str,
    pub message: String,
}

impl Violation {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Join violations into one line for logs and reports.
pub fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn is_web_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

/// Field rules shared by both passes.
fn check_source_fields(
    link: &str,
    title: &str,
    source: &str,
    domain: &str,
    has_date: bool,
    image: Option<&ArticleImage>,
    violations: &mut Vec<Violation>,
) {
    if link.is_empty() {
        violations.push(Violation::new("link", "is required"));
    } else if !is_web_url(link) {
        violations.push(Violation::new("link", format!("'{link}' is not an http(s) URL")));
    }
    if title.is_empty() {
        violations.push(Violation::new("title", "is required"));
    }
    if source.is_empty() {
        violations.push(Violation::new("source", "is required"));
    }
    if domain.is_empty() {
        violations.push(Violation::new("domain", "is required"));
    }
    if !has_date {
        violations.push(Violation::new("published_at", "is missing or unparseable"));
    }
    match image {
        None => violations.push(Violation::new("image", "is required")),
        Some(image) if !is_web_url(image.url.trim()) => {
            violations.push(Violation::new("image.url", format!("'{}' is not a URL", image.url)));
        }
        Some(_) => {}
    }
}

/// Structural check on an adapter draft.
///
/// Requires a well-formed http(s) `link`, non-empty `title`, `source` and
/// `domain`, a publish date and an image with a URL.
pub fn validate_initial(draft: &ArticleDraft) -> Result<NewArticle, Vec<Violation>> {
    let mut violations = Vec::new();
    let link = draft.link.trim();
    let title = draft.title.trim();
    let source = draft.source.trim();
    let domain = draft.domain.as_deref().map(str::trim).unwrap_or_default();
    check_source_fields(
        link,
        title,
        source,
        domain,
        draft.published_at.is_some(),
        draft.image.as_ref(),
        &mut violations,
    );

    let (Some(published_at), Some(image), true) =
        (draft.published_at, draft.image.clone(), violations.is_empty())
    else {
        return Err(violations);
    };

    let description = draft.description.trim();
    Ok(NewArticle {
        link: link.to_string(),
        title: title.to_string(),
        source: source.to_string(),
        domain: domain.to_string(),
        published_at,
        published_at_estimated: draft.published_at_estimated,
        description: if description.is_empty() {
            NO_DESCRIPTION.to_string()
        } else {
            description.to_string()
        },
        image,
    })
}

/// Strict check on an article carrying enrichment output.
///
/// Re-applies the initial rules to the stored fields, then requires a
/// category, a non-empty improved description and at most [`MAX_TAGS`] tags.
pub fn validate_final(article: &Article) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();
    check_source_fields(
        article.link.trim(),
        article.title.trim(),
        article.source.trim(),
        article.domain.trim(),
        true,
        Some(&article.image),
        &mut violations,
    );

    if article.enrichment.category.is_none() {
        violations.push(Violation::new("category", "must be one of the eight categories"));
    }
    match article.enrichment.description_improved.as_deref().map(str::trim) {
        Some(d) if !d.is_empty() => {}
        _ => violations.push(Violation::new("description_improved", "must not be empty")),
    }
    let tags = &article.enrichment.tags;
    if tags.len() > MAX_TAGS {
        violations.push(Violation::new(
            "tags",
            format!("at most {MAX_TAGS} allowed, got {}", tags.len()),
        ));
    }
    if tags.iter().any(|t| t.trim().is_empty()) {
        violations.push(Violation::new("tags", "must not contain empty values"));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use newsdesk_shared::{
        ArticleId, ArticleImage, Category, EnrichmentFields, EnrichmentStatus,
    };

    fn draft() -> ArticleDraft {
        ArticleDraft {
            link: "https://ex.com/1".into(),
            title: "Roast Report".into(),
            source: "Example".into(),
            domain: Some("ex.com".into()),
            published_at: Some(Utc::now()),
            published_at_estimated: false,
            description: "Fresh beans.".into(),
            image: Some(ArticleImage::placeholder()),
        }
    }

    fn article() -> Article {
        let now = Utc::now();
        Article {
            id: ArticleId::new(),
            link: "https://ex.com/1".into(),
            title: "Roast Report".into(),
            source: "Example".into(),
            domain: "ex.com".into(),
            published_at: now,
            description: "Fresh beans.".into(),
            image: ArticleImage::placeholder(),
            enrichment: EnrichmentFields {
                category: Some(Category::Origin),
                geotag: None,
                tags: vec!["Laurel Carmichael".into()],
                description_improved: Some("Fresh beans arrive.".into()),
                seo_description: None,
            },
            enrichment_status: EnrichmentStatus::Pending,
            published: false,
            remote_object_id: None,
            needs_sync: false,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn valid_draft_passes() {
        let article = validate_initial(&draft()).expect("valid");
        assert_eq!(article.link, "https://ex.com/1");
        assert_eq!(article.domain, "ex.com");
    }

    #[test]
    fn each_required_field_is_reported() {
        let cases: Vec<(&str, Box<dyn Fn(&mut ArticleDraft)>)> = vec![
            ("link", Box::new(|d| d.link.clear())),
            ("link", Box::new(|d| d.link = "ftp://ex.com/file".into())),
            ("title", Box::new(|d| d.title = "   ".into())),
            ("source", Box::new(|d| d.source.clear())),
            ("domain", Box::new(|d| d.domain = None)),
            ("published_at", Box::new(|d| d.published_at = None)),
            ("image", Box::new(|d| d.image = None)),
            (
                "image.url",
                Box::new(|d| {
                    d.image = Some(ArticleImage {
                        url: "not a url".into(),
                        width: None,
                        height: None,
                    })
                }),
            ),
        ];
        for (field, mutate) in cases {
            let mut d = draft();
            mutate(&mut d);
            let violations = validate_initial(&d).expect_err(field);
            assert_eq!(violations.len(), 1, "{field}: {violations:?}");
            assert_eq!(violations[0].field, field);
        }
    }

    #[test]
    fn multiple_violations_collected() {
        let d = ArticleDraft::default();
        let violations = validate_initial(&d).unwrap_err();
        assert!(violations.len() >= 5);
        assert!(describe(&violations).contains("link: is required"));
    }

    #[test]
    fn empty_description_gets_marker() {
        let mut d = draft();
        d.description.clear();
        assert_eq!(validate_initial(&d).unwrap().description, NO_DESCRIPTION);
    }

    #[test]
    fn final_pass_accepts_enriched() {
        assert!(validate_final(&article()).is_ok());
    }

    #[test]
    fn final_pass_requires_category_and_summary() {
        let mut a = article();
        a.enrichment.category = None;
        a.enrichment.description_improved = Some("  ".into());
        let violations = validate_final(&a).unwrap_err();
        let fields: Vec<&str> = violations.iter().map(|v| v.field).collect();
        assert_eq!(fields, vec!["category", "description_improved"]);
    }

    #[test]
    fn final_pass_limits_tags() {
        let mut a = article();
        a.enrichment.tags = vec!["A".into(), "B".into(), "C".into()];
        let violations = validate_final(&a).unwrap_err();
        assert_eq!(violations[0].field, "tags");
    }

    #[test]
    fn final_pass_rechecks_source_fields() {
        let mut a = article();
        a.source = " ".into();
        a.domain = String::new();
        a.image.url = "not a url".into();
        let violations = validate_final(&a).unwrap_err();
        let fields: Vec<&str> = violations.iter().map(|v| v.field).collect();
        assert_eq!(fields, vec!["source", "domain", "image.url"]);
    }
}
