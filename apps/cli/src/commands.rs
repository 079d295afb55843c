//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use newsdesk_core::pipeline::{EnrichReport, Pipeline, PipelineSettings, ProgressReporter, RunReport};
use newsdesk_core::publish::{self, PublishReport, ShopifyClient};
use newsdesk_core::OpenAiClassifier;
use newsdesk_shared::{
    AppConfig, Article, ArticleId, Category, EnrichmentStatus, SourceConfig, expand_home,
    init_config, load_config, load_config_from, validate_api_key, validate_publisher,
};
use newsdesk_storage::{ArticleEdit, ArticleFilter, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// newsdesk: collect, enrich and publish coffee industry news.
#[derive(Parser)]
#[command(
    name = "newsdesk",
    version,
    about = "Collect coffee news from configured sources, enrich it and publish it to the storefront.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.newsdesk/newsdesk.toml).
    #[arg(long, env = "NEWSDESK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch sources, store new and changed articles, and enrich them.
    Run {
        /// Only run the named source (repeatable). Defaults to all.
        #[arg(short, long)]
        source: Vec<String>,
    },

    /// Enrich stored articles that are pending or failed.
    Enrich {
        /// Maximum number of articles to enrich.
        #[arg(short, long, default_value = "100")]
        limit: u32,
    },

    /// Re-enrich one article, or every failed article.
    Reprocess {
        /// Article id. Without it, all failed articles are retried.
        #[arg(long)]
        id: Option<ArticleId>,
    },

    /// Publish new and changed articles to the storefront.
    Publish {
        /// Publish only this article.
        #[arg(long)]
        id: Option<ArticleId>,
    },

    /// Inspect and manage stored articles.
    Articles {
        #[command(subcommand)]
        action: ArticlesAction,
    },

    /// List configured sources.
    Sources,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Article admin subcommands.
#[derive(Subcommand)]
pub(crate) enum ArticlesAction {
    /// List articles, newest first.
    List {
        #[arg(long)]
        status: Option<EnrichmentStatus>,
        #[arg(long)]
        category: Option<Category>,
        /// Source name.
        #[arg(long)]
        source: Option<String>,
        /// Only articles not yet published.
        #[arg(long)]
        unpublished: bool,
        /// Articles per page.
        #[arg(long, default_value = "20")]
        limit: u32,
        /// Page number, starting at 1.
        #[arg(long, default_value = "1")]
        page: u32,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show one article.
    Show {
        id: ArticleId,
        #[arg(long)]
        json: bool,
    },
    /// Edit enrichment fields of one article.
    Edit {
        id: ArticleId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        category: Option<Category>,
        #[arg(long)]
        geotag: Option<String>,
        /// Remove the geotag.
        #[arg(long, conflicts_with = "geotag")]
        clear_geotag: bool,
        /// Comma-separated, at most two.
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
        /// Remove all tags.
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        seo_description: Option<String>,
    },
    /// Delete one article.
    Delete {
        id: ArticleId,
        /// Also delete the published storefront object.
        #[arg(long)]
        remote: bool,
    },
    /// Delete every stored article.
    Purge {
        /// Confirm the purge.
        #[arg(long)]
        yes: bool,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults and sample sources.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "newsdesk=info",
        1 => "newsdesk=debug",
        _ => "newsdesk=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config {
        action: ConfigAction::Init,
    } = cli.command
    {
        return cmd_config_init();
    }

    let config = match cli.config.as_deref() {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Run { source } => cmd_run(&config, &source).await,
        Command::Enrich { limit } => cmd_enrich(&config, limit).await,
        Command::Reprocess { id } => cmd_reprocess(&config, id.as_ref()).await,
        Command::Publish { id } => cmd_publish(&config, id.as_ref()).await,
        Command::Articles { action } => cmd_articles(&config, action).await,
        Command::Sources => cmd_sources(&config),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

fn database_path(config: &AppConfig) -> PathBuf {
    expand_home(&config.defaults.database_path)
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    Ok(Storage::open(&database_path(config)).await?)
}

async fn open_storage_readonly(config: &AppConfig) -> Result<Storage> {
    Ok(Storage::open_readonly(&database_path(config)).await?)
}

fn pipeline<'a>(config: &AppConfig, storage: &'a Storage) -> Result<Pipeline<'a>> {
    let api_key = validate_api_key(config)?;
    let classifier = Arc::new(OpenAiClassifier::new(&config.classifier, api_key)?);
    Ok(Pipeline::new(
        storage,
        classifier,
        PipelineSettings::from_config(config),
    )?)
}

/// Sources named on the command line, or all of them.
fn select_sources(config: &AppConfig, names: &[String]) -> Result<Vec<SourceConfig>> {
    if names.is_empty() {
        return Ok(config.sources.clone());
    }
    names
        .iter()
        .map(|name| {
            config
                .sources
                .iter()
                .find(|s| s.name.eq_ignore_ascii_case(name))
                .cloned()
                .ok_or_else(|| eyre!("no source named '{name}' in config"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig, names: &[String]) -> Result<()> {
    let sources = select_sources(config, names)?;
    if sources.is_empty() {
        return Err(eyre!(
            "no sources configured. Run `newsdesk config init` or add [[sources]] to your config."
        ));
    }

    let storage = open_storage(config).await?;
    let pipeline = pipeline(config, &storage)?;
    info!(sources = sources.len(), "running ingest");

    let reporter = CliProgress::new();
    let result = pipeline.run_sources(&sources, &reporter).await;
    reporter.finish();
    let report = result?;

    print_run_report(&report);
    Ok(())
}

async fn cmd_enrich(config: &AppConfig, limit: u32) -> Result<()> {
    let storage = open_storage(config).await?;
    let pipeline = pipeline(config, &storage)?;

    let reporter = CliProgress::new();
    let result = pipeline.enrich_pending(limit, &reporter).await;
    reporter.finish();

    print_enrich_report(&result?);
    Ok(())
}

async fn cmd_reprocess(config: &AppConfig, id: Option<&ArticleId>) -> Result<()> {
    let storage = open_storage(config).await?;
    let pipeline = pipeline(config, &storage)?;

    let reporter = CliProgress::new();
    let result = pipeline.reprocess(id, &reporter).await;
    reporter.finish();

    print_enrich_report(&result?);
    Ok(())
}

async fn cmd_publish(config: &AppConfig, id: Option<&ArticleId>) -> Result<()> {
    let token = validate_publisher(config)?;
    let client = ShopifyClient::new(&config.publisher, token)?;
    let storage = open_storage(config).await?;

    let reporter = CliProgress::new();
    reporter.phase("Publishing articles");
    let result = match id {
        Some(id) => publish::publish_one(&storage, &client, &config.publisher, id).await,
        None => publish::publish_pending(&storage, &client, &config.publisher).await,
    };
    reporter.finish();

    print_publish_report(&result?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Article admin
// ---------------------------------------------------------------------------

async fn cmd_articles(config: &AppConfig, action: ArticlesAction) -> Result<()> {
    match action {
        ArticlesAction::List {
            status,
            category,
            source,
            unpublished,
            limit,
            page,
            json,
        } => {
            let offset = page.max(1).saturating_sub(1).saturating_mul(limit);
            let storage = open_storage_readonly(config).await?;
            let filter = ArticleFilter {
                status,
                category,
                source,
                unpublished,
            };
            let articles = storage.list_articles(&filter, limit, offset).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&articles)?);
                return Ok(());
            }
            let total = storage.count_articles(&filter).await?;
            print_article_table(&articles);
            println!();
            println!(
                "  Showing {}-{} of {total}",
                if articles.is_empty() { 0 } else { offset + 1 },
                offset as usize + articles.len()
            );
            Ok(())
        }
        ArticlesAction::Show { id, json } => {
            let storage = open_storage_readonly(config).await?;
            let article = storage
                .get_article(&id)
                .await?
                .ok_or_else(|| eyre!("no article with id {id}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&article)?);
            } else {
                print_article(&article);
            }
            Ok(())
        }
        ArticlesAction::Edit {
            id,
            title,
            category,
            geotag,
            clear_geotag,
            tags,
            clear_tags,
            description,
            seo_description,
        } => {
            let tags = if clear_tags {
                Some(Vec::new())
            } else {
                tags.map(|t| {
                    t.into_iter()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                })
            };
            if tags.as_ref().is_some_and(|t| t.len() > 2) {
                return Err(eyre!("an article can carry at most 2 tags"));
            }
            let geotag = if clear_geotag { Some(None) } else { geotag.map(Some) };
            let edit = ArticleEdit {
                title,
                category,
                geotag,
                tags,
                description_improved: description,
                seo_description,
            };
            if edit.is_empty() {
                return Err(eyre!("nothing to edit. Pass at least one field flag."));
            }

            let storage = open_storage(config).await?;
            let article = storage
                .edit_article(&id, &edit)
                .await?
                .ok_or_else(|| eyre!("no article with id {id}"))?;
            println!("  Updated {}", article.id);
            if article.needs_sync {
                println!("  Queued for storefront update on next publish.");
            }
            Ok(())
        }
        ArticlesAction::Delete { id, remote } => {
            let storage = open_storage(config).await?;
            let deleted = if remote {
                let token = validate_publisher(config)?;
                let client = ShopifyClient::new(&config.publisher, token)?;
                publish::delete_article(&storage, Some(&client), &id).await?
            } else {
                publish::delete_article(&storage, None, &id).await?
            };
            if !deleted {
                return Err(eyre!("no article with id {id}"));
            }
            println!("  Deleted {id}");
            Ok(())
        }
        ArticlesAction::Purge { yes } => {
            if !yes {
                return Err(eyre!("refusing to delete every article without --yes"));
            }
            let storage = open_storage(config).await?;
            let removed = storage.delete_all().await?;
            println!("  Deleted {removed} articles");
            Ok(())
        }
    }
}

fn cmd_sources(config: &AppConfig) -> Result<()> {
    if config.sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }
    for source in &config.sources {
        println!("  {}", source.name);
        println!("    Kind:     {}", source.adapter_kind()?);
        println!("    URL:      {}", source.url);
        println!("    Timeout:  {}ms", source.timeout_ms);
        println!("    Retries:  {}", source.retry_count);
        if let Some(schedule) = &source.schedule {
            println!("    Schedule: {schedule}");
        }
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_run_report(report: &RunReport) {
    println!();
    for source in &report.sources {
        match &source.error {
            Some(error) => println!("  {:<28} failed: {error}", source.name),
            None => println!(
                "  {:<28} {} fetched, {} new, {} updated, {} rejected",
                source.name, source.fetched, source.inserted, source.updated, source.rejected
            ),
        }
    }
    println!();
    println!("  Sources:   {} ({} failed)", report.sources.len(), report.failed_sources());
    println!("  Inserted:  {}", report.inserted());
    println!("  Updated:   {}", report.updated());
    println!("  Rejected:  {}", report.rejected());
    println!("  Enriched:  {}", report.enrichment.succeeded);
    println!("  Failed:    {}", report.enrichment.failed);
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

fn print_enrich_report(report: &EnrichReport) {
    println!();
    println!("  Attempted: {}", report.attempted);
    println!("  Enriched:  {}", report.succeeded);
    println!("  Failed:    {}", report.failed);
    println!("  Skipped:   {}", report.skipped);
    for error in &report.errors {
        println!("    - {error}");
    }
    println!();
}

fn print_publish_report(report: &PublishReport) {
    println!();
    println!("  Created:    {}", report.created);
    println!("  Updated:    {}", report.updated);
    println!("  Duplicates: {}", report.duplicates);
    println!("  Failed:     {}", report.failed);
    for failure in &report.failures {
        println!("    - {} ({}): {}", failure.title, failure.id, failure.reason);
    }
    if report.failed > report.failures.len() {
        println!("    ... and {} more", report.failed - report.failures.len());
    }
    println!();
}

fn print_article_table(articles: &[Article]) {
    for a in articles {
        println!(
            "  {}  {:<8} {:<14} {}  {}",
            a.id,
            a.enrichment_status.as_str(),
            a.enrichment.category.map(|c| c.as_str()).unwrap_or("-"),
            if a.published { "P" } else { " " },
            a.title
        );
    }
}

fn print_article(a: &Article) {
    let e = &a.enrichment;
    println!();
    println!("  {}", a.title);
    println!("  ID:          {}", a.id);
    println!("  Link:        {}", a.link);
    println!("  Source:      {} ({})", a.source, a.domain);
    println!("  Published:   {}", a.published_at.to_rfc3339());
    println!("  Image:       {}", a.image.url);
    println!("  Status:      {}", a.enrichment_status.as_str());
    println!(
        "  Category:    {}",
        e.category.map(|c| c.as_str()).unwrap_or("-")
    );
    println!("  Geotag:      {}", e.geotag.as_deref().unwrap_or("-"));
    println!("  Tags:        {}", e.tags.join(", "));
    println!(
        "  Remote:      {}",
        a.remote_object_id.as_deref().unwrap_or("-")
    );
    println!("  Needs sync:  {}", a.needs_sync);
    println!();
    println!("  {}", a.best_description());
    if let Some(seo) = &e.seo_description {
        println!();
        println!("  SEO: {seo}");
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_progress(&self, current: usize, total: usize, detail: &str) {
        self.spinner
            .set_message(format!("[{current}/{total}] {detail}"));
    }
}
