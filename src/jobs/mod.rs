/// Cron jobs for scheduled ingestion
///
/// Two jobs share one dispatcher:
/// - Market data (macro, technical, commodity, FX) on `INGEST_SCHEDULE`
/// - News sentiment on `INGEST_NEWS_SCHEDULE`

pub mod ingestion_job;

pub use ingestion_job::{IngestionJob, JobScope, RunGuard};
