// Ingestion pipeline: polite fetching, normalization, dedup, upsert

pub mod ingestion;
pub mod orchestrator;
pub mod processing;
pub mod run_stats;
pub mod storage;
pub mod upsert;

pub use orchestrator::{IngestionOrchestrator, RunSettings, SourceJob};
pub use run_stats::RunStats;
