// Multi-source event ingestion: adapters, polite fetching, dedup and idempotent upsert

pub mod apis;
pub mod app;
pub mod common;
pub mod config;
pub mod domain;
pub mod infra;
pub mod observability;
pub mod pipeline;

pub use common::error::{Result, ScraperError};
pub use config::Config;
pub use pipeline::{IngestionOrchestrator, RunSettings, RunStats, SourceJob};
