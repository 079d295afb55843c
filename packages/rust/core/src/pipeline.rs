//! End-to-end ingest run: sources → fetch → validate → upsert → enrich.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use newsdesk_shared::{
    AppConfig, Article, ArticleId, NewsdeskError, RateLimitedExecutor, Result, SourceConfig,
    validate_sources,
};
use newsdesk_sources::{AdapterRegistry, HttpFetcher, fetch_source};
use newsdesk_storage::{EnrichmentUpdate, Storage, UpsertOutcome};

use crate::enrichment::{Classifier, EnrichOptions, EnrichmentOutcome, enrich_batch};
use crate::validation::{describe, validate_final, validate_initial};

/// Errors kept in an [`EnrichReport`]; the count is always exact.
const MAX_REPORTED_ERRORS: usize = 25;

/// Concurrency and batching for one run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub fetch_concurrency: usize,
    pub enrich_concurrency: usize,
    pub enrich: EnrichOptions,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            fetch_concurrency: config.defaults.fetch_concurrency as usize,
            enrich_concurrency: config.defaults.enrich_concurrency as usize,
            enrich: EnrichOptions {
                batch_size: config.defaults.enrich_batch_size as usize,
                max_summary_words: config.classifier.max_summary_words,
            },
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fetch_concurrency: 5,
            enrich_concurrency: 5,
            enrich: EnrichOptions::default(),
        }
    }
}

/// Per-source counts for a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub fetched: usize,
    /// Items dropped by initial validation.
    pub rejected: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Set when the source could not be fetched or parsed.
    pub error: Option<String>,
}

/// Enrichment counts for a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Claimed or changed by someone else before this run could write.
    pub skipped: usize,
    /// First few failure reasons, as `id: reason`.
    pub errors: Vec<String>,
}

impl EnrichReport {
    fn record_failure(&mut self, id: &ArticleId, reason: &str) {
        self.failed += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(format!("{id}: {reason}"));
        }
    }
}

/// Result of [`Pipeline::run_sources`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    pub enrichment: EnrichReport,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunReport {
    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }

    pub fn inserted(&self) -> usize {
        self.sources.iter().map(|s| s.inserted).sum()
    }

    pub fn updated(&self) -> usize {
        self.sources.iter().map(|s| s.updated).sum()
    }

    pub fn rejected(&self) -> usize {
        self.sources.iter().map(|s| s.rejected).sum()
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Item-level progress within the current phase.
    fn item_progress(&self, current: usize, total: usize, detail: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_progress(&self, _current: usize, _total: usize, _detail: &str) {}
}

/// Orchestrates fetching, persisting and enriching articles.
///
/// Storage writes happen only here, on the calling task. Fetches and
/// classifier calls run concurrently under their own executors.
pub struct Pipeline<'a> {
    storage: &'a Storage,
    classifier: Arc<dyn Classifier>,
    registry: Arc<AdapterRegistry>,
    fetcher: HttpFetcher,
    settings: PipelineSettings,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        storage: &'a Storage,
        classifier: Arc<dyn Classifier>,
        settings: PipelineSettings,
    ) -> Result<Self> {
        Ok(Self {
            storage,
            classifier,
            registry: Arc::new(AdapterRegistry::new()),
            fetcher: HttpFetcher::new()?,
            settings,
        })
    }

    /// Replace the adapter registry.
    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Replace the HTTP fetcher.
    pub fn with_fetcher(mut self, fetcher: HttpFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Ingest every source, then enrich whatever they produced that is
    /// not yet enriched.
    ///
    /// Invalid source configuration aborts before anything is fetched. A
    /// source that fails later, configuration included, is reported and
    /// skipped. Storage errors abort the run.
    #[instrument(skip_all, fields(sources = sources.len()))]
    pub async fn run_sources(
        &self,
        sources: &[SourceConfig],
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport> {
        let start = Instant::now();
        validate_sources(sources)?;
        info!("starting ingest run");

        // --- Fetch all sources concurrently ---
        progress.phase("Fetching sources");
        let executor = RateLimitedExecutor::new(self.settings.fetch_concurrency);
        let tasks: Vec<_> = sources
            .iter()
            .cloned()
            .map(|source| {
                let registry = self.registry.clone();
                let fetcher = self.fetcher.clone();
                async move { fetch_source(&registry, &fetcher, &source).await }
            })
            .collect();
        let fetched = executor.run_all(tasks).await;

        // --- Validate and persist, one source at a time ---
        progress.phase("Saving articles");
        let mut report = RunReport::default();
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for (i, (source, result)) in sources.iter().zip(fetched).enumerate() {
            progress.item_progress(i + 1, sources.len(), &source.name);
            let mut row = SourceReport {
                name: source.name.clone(),
                ..Default::default()
            };

            let drafts = match result {
                Ok(drafts) => drafts,
                Err(e) => {
                    warn!(source = %source.name, error = %e, "source failed");
                    row.error = Some(e.to_string());
                    report.sources.push(row);
                    continue;
                }
            };
            row.fetched = drafts.len();

            for draft in &drafts {
                let article = match validate_initial(draft) {
                    Ok(article) => article,
                    Err(violations) => {
                        warn!(
                            source = %source.name,
                            link = %draft.link,
                            violations = %describe(&violations),
                            "item rejected"
                        );
                        row.rejected += 1;
                        continue;
                    }
                };

                match self.storage.upsert_source_fields(&article).await? {
                    UpsertOutcome::Inserted => row.inserted += 1,
                    UpsertOutcome::Updated => row.updated += 1,
                    UpsertOutcome::Unchanged => row.unchanged += 1,
                }
                if seen.insert(article.link.clone()) {
                    links.push(article.link);
                }
            }

            debug!(
                source = %row.name,
                inserted = row.inserted,
                updated = row.updated,
                rejected = row.rejected,
                "source persisted"
            );
            report.sources.push(row);
        }

        // --- Enrich what this run touched ---
        let pending = self.storage.list_unenriched_by_links(&links).await?;
        report.enrichment = self.enrich_articles(pending, progress).await?;
        report.elapsed = start.elapsed();

        info!(
            sources = report.sources.len(),
            failed_sources = report.failed_sources(),
            inserted = report.inserted(),
            updated = report.updated(),
            rejected = report.rejected(),
            enriched = report.enrichment.succeeded,
            enrich_failed = report.enrichment.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "ingest run complete"
        );
        Ok(report)
    }

    /// Enrich up to `limit` stored articles that are not yet enriched.
    #[instrument(skip_all, fields(limit))]
    pub async fn enrich_pending(
        &self,
        limit: u32,
        progress: &dyn ProgressReporter,
    ) -> Result<EnrichReport> {
        let pending = self.storage.list_unenriched(limit).await?;
        self.enrich_articles(pending, progress).await
    }

    /// Re-enrich one article, or every failed article when `id` is `None`.
    #[instrument(skip_all)]
    pub async fn reprocess(
        &self,
        id: Option<&ArticleId>,
        progress: &dyn ProgressReporter,
    ) -> Result<EnrichReport> {
        let articles = match id {
            Some(id) => {
                if !self.storage.reset_for_reenrichment(id).await? {
                    return Err(NewsdeskError::validation(format!("no article with id {id}")));
                }
                self.storage.get_article(id).await?.into_iter().collect()
            }
            None => {
                let reset = self.storage.reset_failed().await?;
                info!(reset, "failed articles reset to pending");
                self.storage.list_unenriched(u32::MAX).await?
            }
        };
        self.enrich_articles(articles, progress).await
    }

    /// Claim, enrich, validate and write back a set of articles.
    async fn enrich_articles(
        &self,
        articles: Vec<Article>,
        progress: &dyn ProgressReporter,
    ) -> Result<EnrichReport> {
        let mut report = EnrichReport::default();
        if articles.is_empty() {
            return Ok(report);
        }
        progress.phase("Enriching articles");

        // Claiming bumps the revision; the claimed value guards the write.
        let mut claimed = Vec::with_capacity(articles.len());
        for mut article in articles {
            if self
                .storage
                .claim_for_enrichment(&article.id, article.revision)
                .await?
            {
                article.revision += 1;
                claimed.push(article);
            } else {
                debug!(id = %article.id, "article already claimed, skipping");
                report.skipped += 1;
            }
        }

        let executor = RateLimitedExecutor::new(self.settings.enrich_concurrency);
        let options = self.settings.enrich;
        let total = claimed.len();
        let mut done = 0;

        for chunk in claimed.chunks(options.batch_size.max(1)) {
            let outcomes = enrich_batch(self.classifier.clone(), &executor, chunk, options).await;
            for (article, outcome) in chunk.iter().zip(outcomes) {
                done += 1;
                progress.item_progress(done, total, &article.title);
                report.attempted += 1;
                self.write_outcome(article, outcome, &mut report).await?;
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "enrichment complete"
        );
        Ok(report)
    }

    /// Final validation, then the guarded phase-2 write.
    async fn write_outcome(
        &self,
        article: &Article,
        outcome: EnrichmentOutcome,
        report: &mut EnrichReport,
    ) -> Result<()> {
        let outcome = if outcome.is_success() {
            let mut candidate = article.clone();
            candidate.enrichment = outcome.fields.clone();
            match validate_final(&candidate) {
                Ok(()) => outcome,
                Err(violations) => {
                    let reason = describe(&violations);
                    warn!(id = %article.id, %reason, "enriched article failed validation");
                    EnrichmentOutcome::failed(article, reason)
                }
            }
        } else {
            outcome
        };

        let written = if outcome.is_success() {
            let update = EnrichmentUpdate {
                fields: outcome.fields,
                status: outcome.status,
            };
            self.storage
                .apply_enrichment(&article.id, article.revision, &update)
                .await?
        } else {
            self.storage
                .mark_enrichment_failed(&article.id, article.revision, &outcome.fields)
                .await?
        };
        if !written {
            warn!(id = %article.id, "article changed during enrichment, result discarded");
            report.skipped += 1;
            return Ok(());
        }

        match outcome.error {
            None => report.succeeded += 1,
            Some(reason) => report.record_failure(&article.id, &reason),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
