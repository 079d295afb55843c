//! Application configuration for newsdesk.
//!
//! User config lives at `~/.newsdesk/newsdesk.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::{NewsdeskError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "newsdesk.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".newsdesk";

// ---------------------------------------------------------------------------
// Config structs (matching newsdesk.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Classification service settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Publishing platform settings.
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Configured content sources.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the article database.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Sources fetched concurrently.
    #[serde(default = "default_concurrency")]
    pub fetch_concurrency: u32,

    /// Classification calls in flight at once.
    #[serde(default = "default_concurrency")]
    pub enrich_concurrency: u32,

    /// Articles per enrichment batch.
    #[serde(default = "default_batch_size")]
    pub enrich_batch_size: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            fetch_concurrency: default_concurrency(),
            enrich_concurrency: default_concurrency(),
            enrich_batch_size: default_batch_size(),
        }
    }
}

fn default_database_path() -> String {
    "~/.newsdesk/newsdesk.db".into()
}
fn default_concurrency() -> u32 {
    5
}
fn default_batch_size() -> u32 {
    5
}

/// `[classifier]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_classifier_key_env")]
    pub api_key_env: String,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,

    /// Model used for classification.
    #[serde(default = "default_classifier_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,

    /// Retries on transient transport errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound on the improved description, in words.
    #[serde(default = "default_max_summary_words")]
    pub max_summary_words: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_classifier_key_env(),
            base_url: default_classifier_base_url(),
            model: default_classifier_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_classifier_timeout(),
            max_retries: default_max_retries(),
            max_summary_words: default_max_summary_words(),
        }
    }
}

fn default_classifier_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_classifier_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_classifier_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_classifier_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_summary_words() -> usize {
    300
}

/// `[publisher]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// GraphQL admin endpoint of the store (empty until configured).
    #[serde(default)]
    pub endpoint: String,

    /// Name of the env var holding the access token.
    #[serde(default = "default_publisher_token_env")]
    pub access_token_env: String,

    /// Remote object type articles are created as.
    #[serde(default = "default_object_type")]
    pub object_type: String,

    /// Suffix appended to titles in the SEO title field.
    #[serde(default = "default_seo_title_suffix")]
    pub seo_title_suffix: String,

    #[serde(default = "default_publisher_timeout")]
    pub timeout_secs: u64,

    /// Retries on transient transport errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            access_token_env: default_publisher_token_env(),
            object_type: default_object_type(),
            seo_title_suffix: default_seo_title_suffix(),
            timeout_secs: default_publisher_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_publisher_token_env() -> String {
    "SHOPIFY_ACCESS_TOKEN".into()
}
fn default_object_type() -> String {
    "news_articles".into()
}
fn default_seo_title_suffix() -> String {
    "News".into()
}
fn default_publisher_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Shape of a source, selecting which adapter parses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// RSS or Atom syndication feed.
    Feed,
    /// JSON endpoint returning a list of items.
    Array,
    /// HTML page with a repeating item structure.
    Selector,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Array => "array",
            Self::Selector => "selector",
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = NewsdeskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feed" | "rss" => Ok(Self::Feed),
            "array" | "api" => Ok(Self::Array),
            "selector" | "scrape" => Ok(Self::Selector),
            other => Err(NewsdeskError::config(format!(
                "unknown adapter kind '{other}' (expected feed, array or selector)"
            ))),
        }
    }
}

/// CSS selectors for a selector-based source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default = "default_item_selector")]
    pub item: String,
    #[serde(default = "default_title_selector")]
    pub title: String,
    #[serde(default = "default_link_selector")]
    pub link: String,
    #[serde(default = "default_summary_selector")]
    pub summary: String,
    #[serde(default = "default_image_selector")]
    pub image: String,
    #[serde(default = "default_date_selector")]
    pub date: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            item: default_item_selector(),
            title: default_title_selector(),
            link: default_link_selector(),
            summary: default_summary_selector(),
            image: default_image_selector(),
            date: default_date_selector(),
        }
    }
}

fn default_item_selector() -> String {
    ".article-item".into()
}
fn default_title_selector() -> String {
    ".article-title".into()
}
fn default_link_selector() -> String {
    "a[href]".into()
}
fn default_summary_selector() -> String {
    ".article-summary".into()
}
fn default_image_selector() -> String {
    "img[src]".into()
}
fn default_date_selector() -> String {
    ".article-date".into()
}

/// `[[sources]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique, human-readable source name.
    pub name: String,
    /// URL fetched for this source.
    pub url: String,
    /// Adapter kind: `feed`, `array` or `selector`.
    pub kind: String,
    #[serde(default = "default_source_timeout")]
    pub timeout_ms: u64,
    /// Fetch retries on transient failures.
    #[serde(default = "default_max_retries")]
    pub retry_count: u32,
    /// Cron expression used by external schedulers. Not interpreted here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Case-insensitive regexes removed from descriptions.
    #[serde(default)]
    pub boilerplate: Vec<String>,
    /// Selector overrides for `selector` sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<SelectorConfig>,
}

fn default_source_timeout() -> u64 {
    10_000
}

impl SourceConfig {
    /// Parsed adapter kind.
    pub fn adapter_kind(&self) -> Result<AdapterKind> {
        self.kind.parse::<AdapterKind>().map_err(|_| {
            NewsdeskError::config(format!(
                "source '{}': unknown adapter kind '{}' (expected feed, array or selector)",
                self.name, self.kind
            ))
        })
    }

    /// Compile the boilerplate patterns (case-insensitive).
    pub fn boilerplate_patterns(&self) -> Result<Vec<Regex>> {
        self.boilerplate
            .iter()
            .map(|p| {
                Regex::new(&format!("(?is){p}")).map_err(|e| {
                    NewsdeskError::config(format!(
                        "source '{}': invalid boilerplate pattern '{p}': {e}",
                        self.name
                    ))
                })
            })
            .collect()
    }

    /// Selectors in effect for this source.
    pub fn selectors(&self) -> SelectorConfig {
        self.selectors.clone().unwrap_or_default()
    }

    /// Compile one CSS selector for this source.
    pub fn parse_selector(&self, css: &str) -> Result<Selector> {
        Selector::parse(css).map_err(|e| {
            NewsdeskError::config(format!(
                "source '{}': invalid selector '{css}': {e}",
                self.name
            ))
        })
    }

    /// Compile every selector in effect, failing on the first invalid one.
    pub fn check_selectors(&self) -> Result<()> {
        let s = self.selectors();
        for css in [&s.item, &s.title, &s.link, &s.summary, &s.image, &s.date] {
            self.parse_selector(css)?;
        }
        Ok(())
    }
}

/// Sources written into a freshly initialized config file.
fn sample_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "SCA News".into(),
            url: "https://sca.coffee/sca-news?format=rss".into(),
            kind: "feed".into(),
            timeout_ms: default_source_timeout(),
            retry_count: default_max_retries(),
            schedule: Some("0 6 * * *".into()),
            boilerplate: vec![
                r"The Specialty Coffee Association \(SCA\) is delighted to announce that the.*?mark\.?"
                    .into(),
            ],
            selectors: None,
        },
        SourceConfig {
            name: "Daily Coffee News".into(),
            url: "https://dailycoffeenews.com/feed".into(),
            kind: "feed".into(),
            timeout_ms: default_source_timeout(),
            retry_count: default_max_retries(),
            schedule: Some("0 6 * * *".into()),
            boilerplate: vec![
                r"Welcome to DCN’s Weekly Coffee News!.*?latest coffee industry news\.?".into(),
                r"Also, check out the latest career opportunities at CoffeeIndustryJobs\.com\.?"
                    .into(),
                r"Subscribe here for all the latest coffee industry news\.?".into(),
                r"Welcome to Design Details, an ongoing editorial feature in Daily Coffee News.*?branding\.?"
                    .into(),
            ],
            selectors: None,
        },
    ]
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.newsdesk/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| NewsdeskError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.newsdesk/newsdesk.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NewsdeskError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| NewsdeskError::config(format!("failed to parse {}: {e}", path.display())))?;

    validate_sources(&config.sources)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NewsdeskError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig {
        sources: sample_sources(),
        ..AppConfig::default()
    };
    let content =
        toml::to_string_pretty(&config).map_err(|e| NewsdeskError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NewsdeskError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Reject source lists that cannot be run: unknown kinds, blank names or
/// URLs, duplicate names, and boilerplate patterns that do not compile.
pub fn validate_sources(sources: &[SourceConfig]) -> Result<()> {
    let mut seen = HashSet::new();
    for source in sources {
        if source.name.trim().is_empty() {
            return Err(NewsdeskError::config(format!(
                "source with url '{}' has an empty name",
                source.url
            )));
        }
        if url::Url::parse(&source.url).is_err() {
            return Err(NewsdeskError::config(format!(
                "source '{}': url '{}' is not a valid absolute URL",
                source.name, source.url
            )));
        }
        if !seen.insert(source.name.as_str()) {
            return Err(NewsdeskError::config(format!(
                "duplicate source name '{}'",
                source.name
            )));
        }
        if source.adapter_kind()? == AdapterKind::Selector {
            source.check_selectors()?;
        }
        source.boilerplate_patterns()?;
    }
    Ok(())
}

/// Check that the classifier API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.classifier.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(NewsdeskError::config(format!(
            "classifier API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the publisher endpoint and access token are configured.
pub fn validate_publisher(config: &AppConfig) -> Result<String> {
    if config.publisher.endpoint.trim().is_empty() {
        return Err(NewsdeskError::config(
            "publisher endpoint is not set. Add `endpoint` under [publisher].",
        ));
    }
    let var_name = &config.publisher.access_token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(NewsdeskError::config(format!(
            "publisher access token not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, kind: &str) -> SourceConfig {
        SourceConfig {
            name: name.into(),
            url: "https://ex.com/feed".into(),
            kind: kind.into(),
            timeout_ms: 1000,
            retry_count: 0,
            schedule: None,
            boilerplate: vec![],
            selectors: None,
        }
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("SHOPIFY_ACCESS_TOKEN"));
    }

    #[test]
    fn config_roundtrip_with_samples() {
        let config = AppConfig {
            sources: sample_sources(),
            ..AppConfig::default()
        };
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.fetch_concurrency, 5);
        assert_eq!(parsed.sources.len(), 2);
        validate_sources(&parsed.sources).expect("sample sources are valid");
    }

    #[test]
    fn config_with_sources() {
        let toml_str = r#"
[defaults]
enrich_batch_size = 3

[[sources]]
name = "Example API"
url = "https://api.example.com/articles"
kind = "array"

[[sources]]
name = "Example Page"
url = "https://www.example.com/news"
kind = "selector"

[sources.selectors]
item = ".story"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.enrich_batch_size, 3);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].timeout_ms, 10_000);
        assert_eq!(config.sources[0].retry_count, 3);
        let selectors = config.sources[1].selectors();
        assert_eq!(selectors.item, ".story");
        assert_eq!(selectors.title, ".article-title");
    }

    #[test]
    fn unknown_adapter_kind_is_config_error() {
        let err = validate_sources(&[source("odd", "carrier-pigeon")]).unwrap_err();
        assert!(matches!(err, NewsdeskError::Config { .. }));
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn duplicate_source_names_rejected() {
        let err = validate_sources(&[source("a", "feed"), source("a", "array")]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn bad_boilerplate_rejected() {
        let mut s = source("a", "feed");
        s.boilerplate = vec!["(unclosed".into()];
        assert!(validate_sources(&[s]).is_err());
    }

    #[test]
    fn bad_selector_rejected_before_fetch() {
        let mut s = source("page", "selector");
        s.selectors = Some(SelectorConfig {
            title: "div[".into(),
            ..SelectorConfig::default()
        });
        let err = validate_sources(&[source("feed", "feed"), s]).unwrap_err();
        assert!(matches!(err, NewsdeskError::Config { .. }));
        assert!(err.to_string().contains("div["));
    }

    #[test]
    fn default_selectors_compile() {
        validate_sources(&[source("page", "selector")]).expect("defaults are valid");
    }

    #[test]
    fn adapter_kind_aliases() {
        assert_eq!("RSS".parse::<AdapterKind>().unwrap(), AdapterKind::Feed);
        assert_eq!("api".parse::<AdapterKind>().unwrap(), AdapterKind::Array);
        assert_eq!("selector".parse::<AdapterKind>().unwrap(), AdapterKind::Selector);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.classifier.api_key_env = "ND_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn publisher_requires_endpoint() {
        let config = AppConfig::default();
        let err = validate_publisher(&config).unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }
}
