//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding one `articles`
//! table keyed by `link`.
//!
//! **Write rules:**
//! - Phase 1 ([`Storage::upsert_source_fields`]) touches only source-owned
//!   columns, so a re-fetch never clobbers enrichment output.
//! - Phase 2 ([`Storage::apply_enrichment`]) is keyed by id and guarded by
//!   the revision obtained from [`Storage::claim_for_enrichment`].

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use newsdesk_shared::{
    Article, ArticleId, ArticleImage, Category, EnrichmentFields, EnrichmentStatus, NewArticle,
    NewsdeskError, Result,
};
use tracing::debug;

/// Column list shared by every article query, in [`row_to_article`] order.
const ARTICLE_COLUMNS: &str = "id, link, title, source, domain, published_at, description, \
     image_url, image_width, image_height, category, geotag, tags_json, description_improved, \
     seo_description, enrichment_status, published, remote_object_id, needs_sync, revision, \
     created_at, updated_at";

/// What a phase-1 upsert did to the row for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Row exists and every source field already matched.
    Unchanged,
}

/// Phase-2 write: enrichment fields plus the resulting status.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentUpdate {
    pub fields: EnrichmentFields,
    pub status: EnrichmentStatus,
}

/// Filters for the admin listing.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub status: Option<EnrichmentStatus>,
    pub category: Option<Category>,
    pub source: Option<String>,
    /// Only articles not yet published.
    pub unpublished: bool,
}

/// Admin edit of a stored article. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct ArticleEdit {
    pub title: Option<String>,
    pub category: Option<Category>,
    /// `Some(None)` clears the geotag.
    pub geotag: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub description_improved: Option<String>,
    pub seo_description: Option<String>,
}

impl ArticleEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.category.is_none()
            && self.geotag.is_none()
            && self.tags.is_none()
            && self.description_improved.is_none()
            && self.seo_description.is_none()
    }
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NewsdeskError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for inspection only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NewsdeskError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        NewsdeskError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(NewsdeskError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Phase 1: source fields
    // -----------------------------------------------------------------------

    /// Insert a new article or refresh the source-owned fields of an existing
    /// one, keyed by `link`.
    ///
    /// Enrichment columns, status, publish state and revision are never
    /// written here. An update only happens when a source field actually
    /// differs, so re-running identical data leaves `updated_at` alone.
    /// An estimated `published_at` never replaces the stored one.
    pub async fn upsert_source_fields(&self, article: &NewArticle) -> Result<UpsertOutcome> {
        self.check_writable()?;
        let existed = self.find_id_by_link(&article.link).await?.is_some();

        let id = ArticleId::new().to_string();
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "INSERT INTO articles (id, link, title, source, domain, published_at, description,
                                       image_url, image_width, image_height, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                 ON CONFLICT(link) DO UPDATE SET
                   title = excluded.title,
                   source = excluded.source,
                   domain = excluded.domain,
                   published_at = CASE WHEN ?12 = 1 THEN articles.published_at
                                       ELSE excluded.published_at END,
                   description = excluded.description,
                   image_url = excluded.image_url,
                   image_width = excluded.image_width,
                   image_height = excluded.image_height,
                   updated_at = excluded.updated_at
                 WHERE articles.title IS NOT excluded.title
                    OR articles.source IS NOT excluded.source
                    OR articles.domain IS NOT excluded.domain
                    OR (?12 = 0 AND articles.published_at IS NOT excluded.published_at)
                    OR articles.description IS NOT excluded.description
                    OR articles.image_url IS NOT excluded.image_url
                    OR articles.image_width IS NOT excluded.image_width
                    OR articles.image_height IS NOT excluded.image_height",
                params![
                    id.as_str(),
                    article.link.as_str(),
                    article.title.as_str(),
                    article.source.as_str(),
                    article.domain.as_str(),
                    article.published_at.to_rfc3339(),
                    article.description.as_str(),
                    article.image.url.as_str(),
                    article.image.width.map(i64::from),
                    article.image.height.map(i64::from),
                    now.as_str(),
                    i64::from(article.published_at_estimated),
                ],
            )
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;

        let outcome = match (existed, changed) {
            (false, _) => UpsertOutcome::Inserted,
            (true, 0) => UpsertOutcome::Unchanged,
            (true, _) => UpsertOutcome::Updated,
        };
        debug!(link = %article.link, ?outcome, "phase 1 upsert");
        Ok(outcome)
    }

    async fn find_id_by_link(&self, link: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT id FROM articles WHERE link = ?1", params![link])
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<String>(0)
                    .map_err(|e| NewsdeskError::Storage(e.to_string()))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(NewsdeskError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Phase 2: enrichment
    // -----------------------------------------------------------------------

    /// Claim an article for enrichment.
    ///
    /// Succeeds only if the row still has `revision` and is not already
    /// enriched. On success the stored revision is `revision + 1`, which is
    /// the value to pass to [`Storage::apply_enrichment`].
    pub async fn claim_for_enrichment(&self, id: &ArticleId, revision: i64) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE articles SET revision = revision + 1, updated_at = ?1
                 WHERE id = ?2 AND revision = ?3 AND enrichment_status != 'success'",
                params![now.as_str(), id.to_string(), revision],
            )
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;
        Ok(changed == 1)
    }

    /// Write enrichment output for a claimed article.
    ///
    /// Returns `false` when the revision moved on since the claim (another
    /// run re-claimed it, or it was edited or reset), in which case nothing
    /// is written. Published rows are flagged for a remote update.
    pub async fn apply_enrichment(
        &self,
        id: &ArticleId,
        claimed_revision: i64,
        update: &EnrichmentUpdate,
    ) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let tags_json = tags_to_json(&update.fields.tags)?;
        let changed = self
            .conn
            .execute(
                "UPDATE articles SET
                   category = ?1,
                   geotag = ?2,
                   tags_json = ?3,
                   description_improved = ?4,
                   seo_description = ?5,
                   enrichment_status = ?6,
                   needs_sync = CASE WHEN published = 1 THEN 1 ELSE needs_sync END,
                   revision = revision + 1,
                   updated_at = ?7
                 WHERE id = ?8 AND revision = ?9",
                params![
                    update.fields.category.map(|c| c.as_str()),
                    update.fields.geotag.as_deref(),
                    tags_json,
                    update.fields.description_improved.as_deref(),
                    update.fields.seo_description.as_deref(),
                    update.status.as_str(),
                    now.as_str(),
                    id.to_string(),
                    claimed_revision,
                ],
            )
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;
        Ok(changed == 1)
    }

    /// Record a failed enrichment with its fallback fields.
    pub async fn mark_enrichment_failed(
        &self,
        id: &ArticleId,
        claimed_revision: i64,
        fallback: &EnrichmentFields,
    ) -> Result<bool> {
        let update = EnrichmentUpdate {
            fields: fallback.clone(),
            status: EnrichmentStatus::Failed,
        };
        self.apply_enrichment(id, claimed_revision, &update).await
    }

    /// Articles not yet successfully enriched, oldest first.
    pub async fn list_unenriched(&self, limit: u32) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE enrichment_status != 'success'
             ORDER BY created_at, link
             LIMIT ?1"
        );
        self.query_articles(&sql, params![limit]).await
    }

    /// Articles among `links` that are not yet successfully enriched, in `links` order.
    pub async fn list_unenriched_by_links(&self, links: &[String]) -> Result<Vec<Article>> {
        let mut results = Vec::new();
        for link in links {
            if let Some(article) = self.get_article_by_link(link).await? {
                if article.enrichment_status != EnrichmentStatus::Success {
                    results.push(article);
                }
            }
        }
        Ok(results)
    }

    /// Move every failed article back to pending. Returns the number reset.
    pub async fn reset_failed(&self) -> Result<u64> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE articles SET enrichment_status = 'pending', revision = revision + 1,
                                     updated_at = ?1
                 WHERE enrichment_status = 'failed'",
                params![now.as_str()],
            )
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))
    }

    /// Move one article back to pending regardless of its status.
    pub async fn reset_for_reenrichment(&self, id: &ArticleId) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE articles SET enrichment_status = 'pending', revision = revision + 1,
                                     updated_at = ?1
                 WHERE id = ?2",
                params![now.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;
        Ok(changed == 1)
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Enriched articles that were never published or changed since.
    pub async fn list_publishable(&self) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE enrichment_status = 'success' AND (published = 0 OR needs_sync = 1)
             ORDER BY published_at, link"
        );
        self.query_articles(&sql, params![]).await
    }

    /// Mark an article as published. A `None` remote id keeps any stored one.
    ///
    /// `pushed_revision` is the revision whose fields were sent. If the row
    /// moved on since, it stays flagged for sync and this returns `false`.
    pub async fn mark_published(
        &self,
        id: &ArticleId,
        remote_id: Option<&str>,
        pushed_revision: i64,
    ) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE articles SET published = 1,
                                     remote_object_id = COALESCE(?1, remote_object_id),
                                     needs_sync = CASE WHEN revision = ?2 THEN 0 ELSE 1 END,
                                     updated_at = ?3
                 WHERE id = ?4",
                params![remote_id, pushed_revision, now.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;

        Ok(self
            .get_article(id)
            .await?
            .is_some_and(|a| a.revision == pushed_revision))
    }

    // -----------------------------------------------------------------------
    // Admin operations
    // -----------------------------------------------------------------------

    /// List articles matching `filter`, newest first.
    pub async fn list_articles(
        &self,
        filter: &ArticleFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE (?1 IS NULL OR enrichment_status = ?1)
               AND (?2 IS NULL OR category = ?2)
               AND (?3 IS NULL OR source = ?3)
               AND (?4 = 0 OR published = 0)
             ORDER BY published_at DESC, link
             LIMIT ?5 OFFSET ?6"
        );
        self.query_articles(
            &sql,
            params![
                filter.status.map(|s| s.as_str()),
                filter.category.map(|c| c.as_str()),
                filter.source.as_deref(),
                i64::from(filter.unpublished),
                limit,
                offset,
            ],
        )
        .await
    }

    /// Count articles matching `filter`.
    pub async fn count_articles(&self, filter: &ArticleFilter) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM articles
                 WHERE (?1 IS NULL OR enrichment_status = ?1)
                   AND (?2 IS NULL OR category = ?2)
                   AND (?3 IS NULL OR source = ?3)
                   AND (?4 = 0 OR published = 0)",
                params![
                    filter.status.map(|s| s.as_str()),
                    filter.category.map(|c| c.as_str()),
                    filter.source.as_deref(),
                    i64::from(filter.unpublished),
                ],
            )
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| NewsdeskError::Storage(e.to_string()))?;
                Ok(count as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(NewsdeskError::Storage(e.to_string())),
        }
    }

    /// Get an article by internal id.
    pub async fn get_article(&self, id: &ArticleId) -> Result<Option<Article>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1");
        Ok(self
            .query_articles(&sql, params![id.to_string()])
            .await?
            .into_iter()
            .next())
    }

    /// Get an article by link.
    pub async fn get_article_by_link(&self, link: &str) -> Result<Option<Article>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE link = ?1");
        Ok(self
            .query_articles(&sql, params![link])
            .await?
            .into_iter()
            .next())
    }

    /// Apply an admin edit. Published articles are flagged for a remote update.
    ///
    /// Returns the updated article, or `None` if the id is unknown.
    pub async fn edit_article(&self, id: &ArticleId, edit: &ArticleEdit) -> Result<Option<Article>> {
        self.check_writable()?;
        let Some(current) = self.get_article(id).await? else {
            return Ok(None);
        };

        let title = edit.title.clone().unwrap_or(current.title);
        let category = edit.category.or(current.enrichment.category);
        let geotag = match &edit.geotag {
            Some(geotag) => geotag.clone(),
            None => current.enrichment.geotag,
        };
        let tags = edit.tags.clone().unwrap_or(current.enrichment.tags);
        let description_improved = edit
            .description_improved
            .clone()
            .or(current.enrichment.description_improved);
        let seo_description = edit
            .seo_description
            .clone()
            .or(current.enrichment.seo_description);
        let tags_json = tags_to_json(&tags)?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "UPDATE articles SET
                   title = ?1,
                   category = ?2,
                   geotag = ?3,
                   tags_json = ?4,
                   description_improved = ?5,
                   seo_description = ?6,
                   needs_sync = CASE WHEN published = 1 THEN 1 ELSE needs_sync END,
                   revision = revision + 1,
                   updated_at = ?7
                 WHERE id = ?8",
                params![
                    title,
                    category.map(|c| c.as_str()),
                    geotag,
                    tags_json,
                    description_improved,
                    seo_description,
                    now.as_str(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;

        self.get_article(id).await
    }

    /// Delete one article. Returns whether a row was removed.
    pub async fn delete_article(&self, id: &ArticleId) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute("DELETE FROM articles WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;
        Ok(changed == 1)
    }

    /// Delete every article. Returns the number removed.
    pub async fn delete_all(&self) -> Result<u64> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM articles", params![])
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))
    }

    async fn query_articles(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Article>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?
        {
            results.push(row_to_article(&row)?);
        }
        Ok(results)
    }
}

fn tags_to_json(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).map_err(|e| NewsdeskError::Storage(e.to_string()))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| NewsdeskError::Storage(format!("invalid date: {e}")))
}

fn get_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| NewsdeskError::Storage(e.to_string()))
}

/// Convert a database row (selected with [`ARTICLE_COLUMNS`]) to an [`Article`].
fn row_to_article(row: &libsql::Row) -> Result<Article> {
    let id = get_string(row, 0)?
        .parse::<ArticleId>()
        .map_err(|e| NewsdeskError::Storage(format!("invalid article id: {e}")))?;

    let category = match row.get::<String>(10).ok() {
        Some(raw) => Some(raw.parse::<Category>().map_err(NewsdeskError::Storage)?),
        None => None,
    };
    let tags: Vec<String> = serde_json::from_str(&get_string(row, 12)?)
        .map_err(|e| NewsdeskError::Storage(format!("invalid tags: {e}")))?;
    let enrichment_status = get_string(row, 15)?
        .parse::<EnrichmentStatus>()
        .map_err(NewsdeskError::Storage)?;

    Ok(Article {
        id,
        link: get_string(row, 1)?,
        title: get_string(row, 2)?,
        source: get_string(row, 3)?,
        domain: get_string(row, 4)?,
        published_at: parse_timestamp(&get_string(row, 5)?)?,
        description: get_string(row, 6)?,
        image: ArticleImage {
            url: get_string(row, 7)?,
            width: row.get::<i64>(8).ok().map(|v| v as u32),
            height: row.get::<i64>(9).ok().map(|v| v as u32),
        },
        enrichment: EnrichmentFields {
            category,
            geotag: row.get::<String>(11).ok(),
            tags,
            description_improved: row.get::<String>(13).ok(),
            seo_description: row.get::<String>(14).ok(),
        },
        enrichment_status,
        published: row.get::<i64>(16).unwrap_or(0) != 0,
        remote_object_id: row.get::<String>(17).ok(),
        needs_sync: row.get::<i64>(18).unwrap_or(0) != 0,
        revision: row
            .get::<i64>(19)
            .map_err(|e| NewsdeskError::Storage(e.to_string()))?,
        created_at: parse_timestamp(&get_string(row, 20)?)?,
        updated_at: parse_timestamp(&get_string(row, 21)?)?,
    })
}
