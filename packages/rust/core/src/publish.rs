//! Publish synchronizer.
//!
//! Pushes enriched articles to the storefront as metaobjects. Articles
//! with a stored remote id are updated, the rest are created. A "handle
//! already assigned to another" user error means the object already
//! exists remotely: the article is marked published and is not retried.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use newsdesk_shared::text::{replace_dashes, truncate_chars};
use newsdesk_shared::{
    Article, ArticleId, EnrichmentStatus, NewsdeskError, PublisherConfig, Result, RetryPolicy,
    retry,
};
use newsdesk_storage::Storage;

use crate::enrichment::SEO_DESCRIPTION_MAX_CHARS;

/// Failures kept in a [`PublishReport`]; the count is always exact.
pub const MAX_REPORTED_FAILURES: usize = 25;

/// Longest title slug used in a handle.
pub const HANDLE_SLUG_MAX_CHARS: usize = 50;

const DUPLICATE_MARKER: &str = "already assigned to another";

// ---------------------------------------------------------------------------
// Remote API seam
// ---------------------------------------------------------------------------

/// One key/value pair of a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteField {
    pub key: &'static str,
    pub value: String,
}

/// A field-level error reported by the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserError {
    pub field: Option<String>,
    pub message: String,
}

impl UserError {
    /// Whether this error means the object already exists remotely.
    pub fn is_duplicate(&self) -> bool {
        self.message.to_lowercase().contains(DUPLICATE_MARKER)
    }
}

/// Result of one remote mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationOutcome {
    pub remote_id: Option<String>,
    pub user_errors: Vec<UserError>,
}

impl MutationOutcome {
    fn describe_errors(&self) -> String {
        self.user_errors
            .iter()
            .map(|e| match &e.field {
                Some(field) => format!("{field}: {}", e.message),
                None => e.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Create, update and delete remote objects.
#[async_trait]
pub trait PublishClient: Send + Sync {
    async fn create(&self, handle: &str, fields: &[RemoteField]) -> Result<MutationOutcome>;
    async fn update(&self, remote_id: &str, fields: &[RemoteField]) -> Result<MutationOutcome>;
    async fn delete(&self, remote_id: &str) -> Result<MutationOutcome>;
}

// ---------------------------------------------------------------------------
// Shopify Admin GraphQL client
// ---------------------------------------------------------------------------

const CREATE_MUTATION: &str = "mutation CreateArticle($metaobject: MetaobjectCreateInput!) {
  metaobjectCreate(metaobject: $metaobject) {
    metaobject { id handle }
    userErrors { field message code }
  }
}";

const UPDATE_MUTATION: &str = "mutation UpdateArticle($id: ID!, $metaobject: MetaobjectUpdateInput!) {
  metaobjectUpdate(id: $id, metaobject: $metaobject) {
    metaobject { id handle }
    userErrors { field message code }
  }
}";

const DELETE_MUTATION: &str = "mutation DeleteArticle($id: ID!) {
  metaobjectDelete(id: $id) {
    deletedId
    userErrors { field message code }
  }
}";

/// Metaobject client for the Shopify Admin GraphQL API.
pub struct ShopifyClient {
    client: Client,
    endpoint: String,
    access_token: String,
    object_type: String,
    retry: RetryPolicy,
}

impl ShopifyClient {
    pub fn new(config: &PublisherConfig, access_token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NewsdeskError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            access_token: access_token.into(),
            object_type: config.object_type.clone(),
            retry: RetryPolicy::new(config.max_retries, Duration::from_secs(1)),
        })
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    async fn post(&self, body: &Value) -> Result<Value> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-Shopify-Access-Token", &self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| NewsdeskError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NewsdeskError::Http {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        resp.json()
            .await
            .map_err(|e| NewsdeskError::Publish(format!("invalid GraphQL response: {e}")))
    }

    /// Run a mutation and pull out `data.<name>`.
    async fn mutate(&self, name: &str, query: &str, variables: Value) -> Result<MutationOutcome> {
        let body = json!({ "query": query, "variables": variables });
        let response = retry(self.retry, name, || self.post(&body)).await?;
        parse_mutation(&response, name)
    }
}

/// Decode `data.<name>` of a GraphQL mutation response.
fn parse_mutation(response: &Value, name: &str) -> Result<MutationOutcome> {
    if let Some(errors) = response.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(NewsdeskError::Publish(format!("{name}: {messages}")));
        }
    }

    let payload = response
        .get("data")
        .and_then(|d| d.get(name))
        .filter(|p| !p.is_null())
        .ok_or_else(|| NewsdeskError::Publish(format!("{name}: response has no payload")))?;

    let remote_id = payload
        .get("metaobject")
        .and_then(|m| m.get("id"))
        .or_else(|| payload.get("deletedId"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let user_errors = payload
        .get("userErrors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|e| UserError {
                    field: e.get("field").and_then(Value::as_array).map(|path| {
                        path.iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(".")
                    }),
                    message: e
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(MutationOutcome {
        remote_id,
        user_errors,
    })
}

#[async_trait]
impl PublishClient for ShopifyClient {
    async fn create(&self, handle: &str, fields: &[RemoteField]) -> Result<MutationOutcome> {
        let variables = json!({
            "metaobject": {
                "type": self.object_type,
                "handle": handle,
                "fields": fields,
                "capabilities": { "publishable": { "status": "ACTIVE" } },
            }
        });
        self.mutate("metaobjectCreate", CREATE_MUTATION, variables).await
    }

    async fn update(&self, remote_id: &str, fields: &[RemoteField]) -> Result<MutationOutcome> {
        let variables = json!({ "id": remote_id, "metaobject": { "fields": fields } });
        self.mutate("metaobjectUpdate", UPDATE_MUTATION, variables).await
    }

    async fn delete(&self, remote_id: &str) -> Result<MutationOutcome> {
        self.mutate("metaobjectDelete", DELETE_MUTATION, json!({ "id": remote_id }))
            .await
    }
}

// ---------------------------------------------------------------------------
// Field mapping
// ---------------------------------------------------------------------------

/// The remote representation of an article, in a fixed key order.
pub fn remote_fields(article: &Article, config: &PublisherConfig) -> Vec<RemoteField> {
    let e = &article.enrichment;
    let seo_title = if config.seo_title_suffix.is_empty() {
        article.title.clone()
    } else {
        format!("{} | {}", article.title, config.seo_title_suffix)
    };
    let seo_description = e.seo_description.clone().unwrap_or_else(|| {
        truncate_chars(
            &replace_dashes(article.best_description()),
            SEO_DESCRIPTION_MAX_CHARS,
        )
    });

    let field = |key, value: String| RemoteField { key, value };
    vec![
        field("uuid", article.id.to_string()),
        field(
            "publishdate",
            article.published_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        ),
        field("title", article.title.clone()),
        field("description", article.best_description().to_string()),
        field("url", article.link.clone()),
        field("domain", article.domain.clone()),
        field("image", article.image.url.clone()),
        field("tags", e.tags.join(", ")),
        field("attribution", article.source.clone()),
        field("geotag", e.geotag.clone().unwrap_or_default()),
        field(
            "category",
            e.category.map(|c| c.as_str().to_string()).unwrap_or_default(),
        ),
        field("seotitle", seo_title),
        field("seodescription", seo_description),
    ]
}

/// URL-safe handle from the title and publish date.
///
/// Lowercase ASCII alphanumerics joined by single hyphens, at most
/// [`HANDLE_SLUG_MAX_CHARS`] characters, suffixed with the `YYYYMMDD` date.
pub fn handle_for(title: &str, published_at: DateTime<Utc>) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.chars().take(HANDLE_SLUG_MAX_CHARS).collect();
    let slug = slug.trim_end_matches('-');
    let date = published_at.format("%Y%m%d");
    if slug.is_empty() {
        format!("article-{date}")
    } else {
        format!("{slug}-{date}")
    }
}

// ---------------------------------------------------------------------------
// Synchronization
// ---------------------------------------------------------------------------

/// One article that could not be published.
#[derive(Debug, Clone, Serialize)]
pub struct PublishFailure {
    pub id: ArticleId,
    pub title: String,
    pub reason: String,
}

/// Aggregated result of a publish run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishReport {
    pub created: usize,
    pub updated: usize,
    /// Creates rejected because the object already exists remotely.
    pub duplicates: usize,
    pub failed: usize,
    /// First [`MAX_REPORTED_FAILURES`] failures.
    pub failures: Vec<PublishFailure>,
}

impl PublishReport {
    fn record_failure(&mut self, article: &Article, reason: String) {
        warn!(id = %article.id, title = %article.title, %reason, "publish failed");
        self.failed += 1;
        if self.failures.len() < MAX_REPORTED_FAILURES {
            self.failures.push(PublishFailure {
                id: article.id.clone(),
                title: article.title.clone(),
                reason,
            });
        }
    }

    pub fn succeeded(&self) -> usize {
        self.created + self.updated + self.duplicates
    }
}

enum Published {
    Created,
    Updated,
    Duplicate,
}

/// Push one article. Remote failures are returned as `Publish` errors;
/// storage failures as `Storage` errors.
async fn push_article(
    storage: &Storage,
    client: &dyn PublishClient,
    config: &PublisherConfig,
    article: &Article,
) -> Result<Published> {
    let fields = remote_fields(article, config);

    let (outcome, existing) = match article.remote_object_id.as_deref() {
        Some(remote_id) => (client.update(remote_id, &fields).await?, Some(remote_id)),
        None => {
            let handle = handle_for(&article.title, article.published_at);
            debug!(id = %article.id, %handle, "creating remote object");
            (client.create(&handle, &fields).await?, None)
        }
    };

    if outcome.user_errors.iter().any(UserError::is_duplicate) {
        info!(id = %article.id, "remote object already exists, marking published");
        mark_published(storage, article, None).await?;
        return Ok(Published::Duplicate);
    }
    if !outcome.user_errors.is_empty() {
        return Err(NewsdeskError::Publish(outcome.describe_errors()));
    }

    match (outcome.remote_id.as_deref().or(existing), existing) {
        (Some(remote_id), Some(_)) => {
            mark_published(storage, article, Some(remote_id)).await?;
            Ok(Published::Updated)
        }
        (Some(remote_id), None) => {
            mark_published(storage, article, Some(remote_id)).await?;
            Ok(Published::Created)
        }
        (None, _) => Err(NewsdeskError::Publish(
            "create returned neither an id nor errors".into(),
        )),
    }
}

async fn mark_published(
    storage: &Storage,
    article: &Article,
    remote_id: Option<&str>,
) -> Result<()> {
    if !storage
        .mark_published(&article.id, remote_id, article.revision)
        .await?
    {
        debug!(id = %article.id, "article changed while publishing, left queued for sync");
    }
    Ok(())
}

async fn publish_into(
    storage: &Storage,
    client: &dyn PublishClient,
    config: &PublisherConfig,
    article: &Article,
    report: &mut PublishReport,
) -> Result<()> {
    match push_article(storage, client, config, article).await {
        Ok(Published::Created) => report.created += 1,
        Ok(Published::Updated) => report.updated += 1,
        Ok(Published::Duplicate) => report.duplicates += 1,
        Err(e @ NewsdeskError::Storage(_)) => return Err(e),
        Err(e) => report.record_failure(article, e.to_string()),
    }
    Ok(())
}

/// Publish every enriched article that is new or changed since its last
/// publish. Articles are processed one at a time; a failure for one does
/// not stop the rest.
#[instrument(skip_all)]
pub async fn publish_pending(
    storage: &Storage,
    client: &dyn PublishClient,
    config: &PublisherConfig,
) -> Result<PublishReport> {
    let articles = storage.list_publishable().await?;
    info!(count = articles.len(), "publishing articles");

    let mut report = PublishReport::default();
    for article in &articles {
        publish_into(storage, client, config, article, &mut report).await?;
    }

    info!(
        created = report.created,
        updated = report.updated,
        duplicates = report.duplicates,
        failed = report.failed,
        "publish complete"
    );
    Ok(report)
}

/// Publish a single article by id, whatever its sync flag says.
#[instrument(skip_all, fields(%id))]
pub async fn publish_one(
    storage: &Storage,
    client: &dyn PublishClient,
    config: &PublisherConfig,
    id: &ArticleId,
) -> Result<PublishReport> {
    let article = storage
        .get_article(id)
        .await?
        .ok_or_else(|| NewsdeskError::validation(format!("no article with id {id}")))?;

    let mut report = PublishReport::default();
    if article.enrichment_status != EnrichmentStatus::Success {
        report.record_failure(
            &article,
            format!("enrichment status is {}", article.enrichment_status.as_str()),
        );
        return Ok(report);
    }
    publish_into(storage, client, config, &article, &mut report).await?;
    Ok(report)
}

/// Delete an article locally, and remotely first when `remote` is set.
///
/// Returns `false` when no such article exists. A remote delete failure
/// leaves the local row in place.
#[instrument(skip_all, fields(%id, remote = client.is_some()))]
pub async fn delete_article(
    storage: &Storage,
    client: Option<&dyn PublishClient>,
    id: &ArticleId,
) -> Result<bool> {
    let Some(article) = storage.get_article(id).await? else {
        return Ok(false);
    };

    if let (Some(client), Some(remote_id)) = (client, article.remote_object_id.as_deref()) {
        let outcome = client.delete(remote_id).await?;
        if !outcome.user_errors.is_empty() {
            return Err(NewsdeskError::Publish(outcome.describe_errors()));
        }
        info!(%remote_id, "remote object deleted");
    }

    storage.delete_article(id).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
