//! LLM enrichment of stored articles.
//!
//! A [`Classifier`] turns one article into a raw model reply. The reply is
//! decoded (with best-effort JSON repair), checked and normalized into
//! [`EnrichmentFields`]. Any failure for one article yields a fallback
//! outcome for that article only; batches always return one outcome per
//! input.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use newsdesk_shared::text::{bound_words, ensure_period, replace_dashes, title_case, truncate_chars};
use newsdesk_shared::{
    Article, ArticleId, Category, ClassifierConfig, EnrichmentFields, EnrichmentStatus,
    NewsdeskError, RateLimitedExecutor, Result, RetryPolicy, retry,
};

/// Hard limit on the search-snippet length, in characters.
pub const SEO_DESCRIPTION_MAX_CHARS: usize = 150;

const SYSTEM_PROMPT: &str = "You are a precise and efficient analyzer of coffee industry news. \
You always answer with a single valid JSON object and nothing else.";

// ---------------------------------------------------------------------------
// Classifier seam
// ---------------------------------------------------------------------------

/// What the classifier sees of an article.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationRequest {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

impl ClassificationRequest {
    pub fn from_article(article: &Article) -> Self {
        Self {
            id: article.id.to_string(),
            title: article.title.clone(),
            description: article.description.clone(),
            image_url: article.image.url.clone(),
        }
    }
}

/// A text-in, text-out model endpoint.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Return the raw reply for one article.
    async fn classify(&self, request: &ClassificationRequest) -> Result<String>;

    /// Model identifier for logs.
    fn model_id(&self) -> &str;
}

/// Build the user prompt for one article.
pub fn build_prompt(request: &ClassificationRequest, max_summary_words: usize) -> String {
    let categories = Category::ALL
        .iter()
        .map(|c| format!("   - {}: {}", c.as_str(), c.guidance()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analyze the following coffee news article.

ID: {id}
Title: {title}
Description: {description}
Image: {image}

Rules:
1. "category": exactly one of:
{categories}
2. "geotag": the single most relevant real place (city, region or country) in title case, or null.
3. "tags": at most 2 named entities (people, venues, organizations or brands) of different types, in title case.
4. "description_improved": a summary of at most {max_summary_words} words. Do not use dashes. End with a period.
5. "seo_description": a search snippet of at most {seo} characters. Do not use dashes.

Answer with JSON only, in this shape:
{{"id": "{id}", "category": "...", "geotag": "...", "tags": ["..."], "description_improved": "...", "seo_description": "..."}}"#,
        id = request.id,
        title = request.title,
        description = request.description,
        image = request.image_url,
        seo = SEO_DESCRIPTION_MAX_CHARS,
    )
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions client
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Classifier backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClassifier {
    client: Client,
    config: ClassifierConfig,
    api_key: String,
    retry: RetryPolicy,
}

impl OpenAiClassifier {
    pub fn new(config: &ClassifierConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NewsdeskError::Network(e.to_string()))?;
        Ok(Self {
            client,
            config: config.clone(),
            api_key: api_key.into(),
            retry: RetryPolicy::new(config.max_retries, Duration::from_secs(1)),
        })
    }

    /// Override the delay between retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    async fn complete(&self, body: &ChatRequest<'_>) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| NewsdeskError::Network(format!("{url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NewsdeskError::Http {
                status: status.as_u16(),
                url,
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| NewsdeskError::Enrichment(format!("invalid completion body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| NewsdeskError::Enrichment("completion contained no content".into()))
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, request: &ClassificationRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(request, self.config.max_summary_words),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        retry(self.retry, "classify", || self.complete(&body)).await
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

/// The classifier reply as decoded, before any checks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifierResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub geotag: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(
        default,
        alias = "descriptionImproved",
        alias = "improvedDescription",
        alias = "improved_description"
    )]
    pub description_improved: Option<String>,
    #[serde(default, alias = "seoDescription")]
    pub seo_description: Option<String>,
}

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("valid regex"));
static BARE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)").expect("valid regex")
});
static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

/// Decode a reply, repairing it once if strict parsing fails.
pub fn decode_response(raw: &str) -> Result<ClassifierResponse> {
    match serde_json::from_str(raw.trim()) {
        Ok(parsed) => Ok(parsed),
        Err(strict) => {
            let repaired = repair_json(raw);
            debug!(error = %strict, "strict decode failed, trying repaired reply");
            serde_json::from_str(&repaired).map_err(|e| {
                NewsdeskError::Enrichment(format!("unparseable classifier reply: {e}"))
            })
        }
    }
}

/// Best-effort cleanup of almost-JSON model output.
///
/// Strips code fences, keeps the outermost `{...}`, flattens line breaks,
/// escapes stray backslashes, quotes bare keys and drops trailing commas.
/// Key quoting and comma removal only touch text outside string literals.
pub fn repair_json(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(inner) = FENCE_RE.captures(text).and_then(|c| c.get(1)) {
        text = inner.as_str();
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            text = &text[start..=end];
        }
    }

    let flattened = text.replace(['\r', '\n'], " ");
    let escaped = escape_stray_backslashes(&flattened);

    let mut out = String::with_capacity(escaped.len());
    for (in_string, segment) in split_string_literals(&escaped) {
        if in_string {
            out.push_str(segment);
        } else {
            let quoted = BARE_KEY_RE.replace_all(segment, "$1\"$2\"$3");
            out.push_str(&TRAILING_COMMA_RE.replace_all(&quoted, "$1"));
        }
    }
    out
}

/// Double every backslash that does not start a valid JSON escape.
fn escape_stray_backslashes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                out.push('\\');
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            // `\'` is not JSON; the quote needs no escaping
            Some('\'') => {}
            _ => out.push_str("\\\\"),
        }
    }
    out
}

/// Split into `(inside_string_literal, text)` runs.
fn split_string_literals(text: &str) -> Vec<(bool, &str)> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                segments.push((true, &text[start..=i]));
                start = i + 1;
                in_string = false;
            }
        } else if c == '"' {
            if start < i {
                segments.push((false, &text[start..i]));
            }
            start = i;
            in_string = true;
        }
    }
    if start < text.len() {
        segments.push((in_string, &text[start..]));
    }
    segments
}

// ---------------------------------------------------------------------------
// Checks and normalization
// ---------------------------------------------------------------------------

fn is_null_word(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "" | "null" | "none" | "n/a" | "unknown"
    )
}

/// Check a decoded reply against the article and normalize its fields.
pub fn interpret(
    response: ClassifierResponse,
    article: &Article,
    max_summary_words: usize,
) -> Result<EnrichmentFields> {
    if let Some(id) = response.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        if id != article.id.to_string() {
            return Err(NewsdeskError::Enrichment(format!(
                "reply id '{id}' does not match article"
            )));
        }
    }

    let category = response
        .category
        .as_deref()
        .ok_or_else(|| NewsdeskError::Enrichment("reply has no category".into()))?
        .parse::<Category>()
        .map_err(NewsdeskError::Enrichment)?;

    let geotag = response
        .geotag
        .as_deref()
        .map(str::trim)
        .filter(|g| !is_null_word(g))
        .map(title_case);

    let raw_tags = response.tags.unwrap_or_default();
    if raw_tags.len() > crate::validation::MAX_TAGS {
        return Err(NewsdeskError::Enrichment(format!(
            "reply has {} tags, at most {} allowed",
            raw_tags.len(),
            crate::validation::MAX_TAGS
        )));
    }
    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for tag in raw_tags {
        let tag = replace_dashes(tag.trim());
        if tag.is_empty() {
            return Err(NewsdeskError::Enrichment("reply contains an empty tag".into()));
        }
        let tag = title_case(&tag);
        if seen.insert(tag.to_lowercase()) {
            tags.push(tag);
        }
    }

    let summary = response
        .description_improved
        .as_deref()
        .map(replace_dashes)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| NewsdeskError::Enrichment("reply has no description".into()))?;
    let summary = ensure_period(&bound_words(&summary, max_summary_words));

    let seo = response
        .seo_description
        .as_deref()
        .map(replace_dashes)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| summary.clone());

    Ok(EnrichmentFields {
        category: Some(category),
        geotag,
        tags,
        description_improved: Some(summary),
        seo_description: Some(truncate_chars(&seo, SEO_DESCRIPTION_MAX_CHARS)),
    })
}

/// Fields written when enrichment fails for an article.
pub fn fallback_fields(article: &Article) -> EnrichmentFields {
    let description = ensure_period(&replace_dashes(&article.description));
    EnrichmentFields {
        category: Some(Category::FALLBACK),
        geotag: None,
        tags: Vec::new(),
        seo_description: Some(truncate_chars(&description, SEO_DESCRIPTION_MAX_CHARS)),
        description_improved: Some(description),
    }
}

// ---------------------------------------------------------------------------
// Per-article and batch enrichment
// ---------------------------------------------------------------------------

/// Result of enriching one article. Never an error: failures carry the
/// fallback fields and the reason.
#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    pub id: ArticleId,
    pub fields: EnrichmentFields,
    pub status: EnrichmentStatus,
    pub error: Option<String>,
}

impl EnrichmentOutcome {
    pub fn failed(article: &Article, reason: impl Into<String>) -> Self {
        Self {
            id: article.id.clone(),
            fields: fallback_fields(article),
            status: EnrichmentStatus::Failed,
            error: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EnrichmentStatus::Success
    }
}

/// Classify, decode and normalize one article.
pub async fn enrich_article(
    classifier: &dyn Classifier,
    article: &Article,
    max_summary_words: usize,
) -> EnrichmentOutcome {
    let request = ClassificationRequest::from_article(article);
    let result = async {
        let raw = classifier.classify(&request).await?;
        let response = decode_response(&raw)?;
        interpret(response, article, max_summary_words)
    }
    .await;

    match result {
        Ok(fields) => EnrichmentOutcome {
            id: article.id.clone(),
            fields,
            status: EnrichmentStatus::Success,
            error: None,
        },
        Err(e) => {
            warn!(id = %article.id, title = %article.title, error = %e, "enrichment failed");
            EnrichmentOutcome::failed(article, e.to_string())
        }
    }
}

/// Batch sizing and output limits.
#[derive(Debug, Clone, Copy)]
pub struct EnrichOptions {
    pub batch_size: usize,
    pub max_summary_words: usize,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_summary_words: 300,
        }
    }
}

/// Enrich articles in consecutive batches.
///
/// Items within a batch run concurrently under `executor`. The result has
/// exactly one outcome per input, in input order.
#[instrument(skip_all, fields(articles = articles.len(), model = classifier.model_id()))]
pub async fn enrich_batch(
    classifier: Arc<dyn Classifier>,
    executor: &RateLimitedExecutor,
    articles: &[Article],
    options: EnrichOptions,
) -> Vec<EnrichmentOutcome> {
    let mut outcomes = Vec::with_capacity(articles.len());

    for chunk in articles.chunks(options.batch_size.max(1)) {
        let tasks: Vec<_> = chunk
            .iter()
            .cloned()
            .map(|article| {
                let classifier = classifier.clone();
                async move {
                    let outcome =
                        enrich_article(classifier.as_ref(), &article, options.max_summary_words)
                            .await;
                    Ok::<_, NewsdeskError>(outcome)
                }
            })
            .collect();

        for (article, result) in chunk.iter().zip(executor.run_all(tasks).await) {
            outcomes.push(result.unwrap_or_else(|e| EnrichmentOutcome::failed(article, e.to_string())));
        }
    }

    outcomes
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use newsdesk_shared::ArticleImage;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn article(title: &str) -> Article {
        let now = Utc::now();
        Article {
            id: ArticleId::new(),
            link: format!("https://ex.com/{}", title.to_lowercase().replace(' ', "-")),
            title: title.into(),
            source: "Example".into(),
            domain: "ex.com".into(),
            published_at: now,
            description: "Growers - in Nyeri - report an early harvest".into(),
            image: ArticleImage::placeholder(),
            enrichment: EnrichmentFields::default(),
            enrichment_status: EnrichmentStatus::Pending,
            published: false,
            remote_object_id: None,
            needs_sync: false,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replies by title; titles starting with "fail" return an error.
    struct ScriptedClassifier;

    #[async_trait]
    impl Classifier for ScriptedClassifier {
        async fn classify(&self, request: &ClassificationRequest) -> Result<String> {
            if request.title.starts_with("fail") {
                return Err(NewsdeskError::Http {
                    status: 500,
                    url: "mock".into(),
                });
            }
            if request.title.starts_with("garbage") {
                return Ok("I cannot help with that.".into());
            }
            Ok(format!(
                r#"{{"id": "{}", "category": "Market", "geotag": "new york", "tags": ["acme roasters"], "description_improved": "{} sells out", "seo_description": "Sold out"}}"#,
                request.id, request.title
            ))
        }

        fn model_id(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn repairs_trailing_commas() {
        let raw = r#"{"category": "Origin", "tags": ["A",], "description_improved": "x",}"#;
        let parsed: serde_json::Value = serde_json::from_str(&repair_json(raw)).unwrap();
        assert_eq!(parsed["tags"][0], "A");
    }

    #[test]
    fn repairs_fences_bare_keys_and_newlines() {
        let raw = "Sure!\n```json\n{category: \"Design\",\n description_improved: \"Line one\nline two: more\"}\n```";
        let response = decode_response(raw).expect("repaired");
        assert_eq!(response.category.as_deref(), Some("Design"));
        assert_eq!(
            response.description_improved.as_deref(),
            Some("Line one line two: more")
        );
    }

    #[test]
    fn repair_leaves_string_contents_alone() {
        let raw = r#"{"description_improved": "Prices, stock: up,}", tags: [],}"#;
        let response = decode_response(raw).unwrap();
        assert_eq!(
            response.description_improved.as_deref(),
            Some("Prices, stock: up,}")
        );
    }

    #[test]
    fn repairs_stray_backslashes() {
        let raw = r#"{"category": "Culture", "description_improved": "C:\temp\x and it\'s fine"}"#;
        let response = decode_response(raw).unwrap();
        assert_eq!(
            response.description_improved.as_deref(),
            Some("C:\temp\\x and it's fine")
        );
    }

    #[test]
    fn unrepairable_reply_is_error() {
        let err = decode_response("no json here").unwrap_err();
        assert!(matches!(err, NewsdeskError::Enrichment(_)));
    }

    #[test]
    fn interpret_normalizes_fields() {
        let a = article("Harvest");
        let response = ClassifierResponse {
            id: Some(a.id.to_string()),
            category: Some("origin".into()),
            geotag: Some("kenya".into()),
            tags: Some(vec!["laurel carmichael".into(), "Laurel Carmichael".into()]),
            description_improved: Some("Farmers in Nyeri \u{2014} harvest early!".into()),
            seo_description: Some("a".repeat(200)),
        };
        let fields = interpret(response, &a, 300).unwrap();
        assert_eq!(fields.category, Some(Category::Origin));
        assert_eq!(fields.geotag.as_deref(), Some("Kenya"));
        assert_eq!(fields.tags, vec!["Laurel Carmichael"]);
        assert_eq!(
            fields.description_improved.as_deref(),
            Some("Farmers in Nyeri harvest early.")
        );
        assert!(fields.seo_description.unwrap().chars().count() <= SEO_DESCRIPTION_MAX_CHARS);
    }

    #[test]
    fn interpret_bounds_summary_words() {
        let a = article("Long");
        let response = ClassifierResponse {
            category: Some("Market".into()),
            description_improved: Some("word ".repeat(50)),
            ..Default::default()
        };
        let fields = interpret(response, &a, 10).unwrap();
        let summary = fields.description_improved.unwrap();
        assert_eq!(summary.split_whitespace().count(), 10);
        assert!(summary.ends_with('.'));
    }

    #[test]
    fn interpret_rejects_bad_replies() {
        let a = article("Bad");
        let cases = [
            ClassifierResponse {
                category: Some("Gossip".into()),
                description_improved: Some("x".into()),
                ..Default::default()
            },
            ClassifierResponse {
                category: Some("Market".into()),
                ..Default::default()
            },
            ClassifierResponse {
                category: Some("Market".into()),
                tags: Some(vec!["A".into(), "B".into(), "C".into()]),
                description_improved: Some("x".into()),
                ..Default::default()
            },
            ClassifierResponse {
                id: Some("someone-else".into()),
                category: Some("Market".into()),
                description_improved: Some("x".into()),
                ..Default::default()
            },
        ];
        for response in cases {
            assert!(interpret(response, &a, 300).is_err());
        }
    }

    #[test]
    fn tag_limit_applies_before_dedup() {
        let a = article("Tags");
        let response = ClassifierResponse {
            category: Some("Market".into()),
            tags: Some(vec!["A".into(), "a".into(), "B".into()]),
            description_improved: Some("x".into()),
            ..Default::default()
        };
        let err = interpret(response, &a, 300).unwrap_err();
        assert!(err.to_string().contains("3 tags"));
    }

    #[test]
    fn fallback_uses_culture_and_original_text() {
        let fields = fallback_fields(&article("Any"));
        assert_eq!(fields.category, Some(Category::Culture));
        assert_eq!(
            fields.description_improved.as_deref(),
            Some("Growers in Nyeri report an early harvest.")
        );
        assert!(fields.tags.is_empty());
    }

    #[tokio::test]
    async fn batch_isolates_failures_and_keeps_order() {
        let articles = vec![
            article("First"),
            article("fail Second"),
            article("Third"),
            article("garbage Fourth"),
            article("Fifth"),
        ];
        let outcomes = enrich_batch(
            Arc::new(ScriptedClassifier),
            &RateLimitedExecutor::new(2),
            &articles,
            EnrichOptions {
                batch_size: 2,
                max_summary_words: 300,
            },
        )
        .await;

        assert_eq!(outcomes.len(), articles.len());
        for (a, o) in articles.iter().zip(&outcomes) {
            assert_eq!(a.id, o.id);
        }
        let statuses: Vec<_> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                EnrichmentStatus::Success,
                EnrichmentStatus::Failed,
                EnrichmentStatus::Success,
                EnrichmentStatus::Failed,
                EnrichmentStatus::Success,
            ]
        );
        assert_eq!(outcomes[0].fields.geotag.as_deref(), Some("New York"));
        assert_eq!(outcomes[0].fields.tags, vec!["Acme Roasters"]);
        assert_eq!(outcomes[1].fields.category, Some(Category::Culture));
        assert!(outcomes[1].error.is_some());
    }

    #[tokio::test]
    async fn openai_classifier_repairs_reply() {
        let server = MockServer::start().await;
        let reply = r#"{"category": "Origin", "geotag": "kenya", "tags": ["Laurel Carmichael",], "description_improved": "Farmers in Nyeri - harvest early!",}"#;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": reply}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = ClassifierConfig {
            base_url: format!("{}/v1", server.uri()),
            ..ClassifierConfig::default()
        };
        let classifier = OpenAiClassifier::new(&config, "test-key").unwrap();
        let outcome = enrich_article(&classifier, &article("Harvest"), 300).await;

        assert!(outcome.is_success(), "{:?}", outcome.error);
        assert_eq!(outcome.fields.category, Some(Category::Origin));
        assert_eq!(outcome.fields.geotag.as_deref(), Some("Kenya"));
        assert_eq!(outcome.fields.tags, vec!["Laurel Carmichael"]);
        assert_eq!(
            outcome.fields.description_improved.as_deref(),
            Some("Farmers in Nyeri harvest early.")
        );
    }

    #[tokio::test]
    async fn openai_classifier_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let config = ClassifierConfig {
            base_url: server.uri(),
            max_retries: 1,
            ..ClassifierConfig::default()
        };
        let classifier = OpenAiClassifier::new(&config, "k")
            .unwrap()
            .with_retry_delay(Duration::from_millis(1));
        let outcome = enrich_article(&classifier, &article("Down"), 300).await;

        assert_eq!(outcome.status, EnrichmentStatus::Failed);
        assert!(outcome.error.unwrap().contains("502"));
    }

    #[test]
    fn prompt_lists_every_category() {
        let request = ClassificationRequest::from_article(&article("Prompt"));
        let prompt = build_prompt(&request, 120);
        for category in Category::ALL {
            assert!(prompt.contains(category.as_str()));
        }
        assert!(prompt.contains("at most 120 words"));
        assert!(prompt.contains(&request.id));
    }
}
