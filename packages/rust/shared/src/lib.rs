//! Shared types, error model, configuration and execution helpers for newsdesk.
//!
//! This crate is the foundation depended on by all other newsdesk crates.
//! It provides:
//! - [`NewsdeskError`] the unified error type
//! - Domain types ([`Article`], [`ArticleDraft`], [`NewArticle`], [`Category`])
//! - Configuration ([`AppConfig`], [`SourceConfig`], config loading)
//! - [`RateLimitedExecutor`] and [`retry`] for bounded, retried I/O
//! - Text normalization in [`text`]

pub mod config;
pub mod error;
pub mod executor;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AdapterKind, AppConfig, ClassifierConfig, DefaultsConfig, PublisherConfig, SelectorConfig,
    SourceConfig, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, validate_api_key, validate_publisher, validate_sources,
};
pub use error::{NewsdeskError, Result};
pub use executor::{RateLimitedExecutor, RetryPolicy, retry};
pub use types::{
    Article, ArticleDraft, ArticleId, ArticleImage, Category, EnrichmentFields, EnrichmentStatus,
    NO_DESCRIPTION, NewArticle, PLACEHOLDER_IMAGE_URL,
};
