//! Core pipeline orchestration and domain logic for newsdesk.
//!
//! This crate ties together source fetching, validation, storage,
//! enrichment and publishing into end-to-end workflows
//! (e.g., [`Pipeline::run_sources`]).

pub mod enrichment;
pub mod pipeline;
pub mod publish;
pub mod validation;

pub use enrichment::{Classifier, EnrichOptions, EnrichmentOutcome, OpenAiClassifier};
pub use pipeline::{
    EnrichReport, Pipeline, PipelineSettings, ProgressReporter, RunReport, SilentProgress,
    SourceReport,
};
pub use publish::{PublishClient, PublishReport, ShopifyClient};
pub use validation::Violation;
