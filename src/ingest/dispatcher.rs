use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::context::IngestionContext;
use crate::database::enums::{DataType, SymbolScope};
use crate::error::{ConfigError, FetchError, IngestError, PersistenceError};
use crate::ingest::fetcher::SourceFetcher;
use crate::ingest::retry::RetryPolicy;
use crate::ingest::watermark::WatermarkTracker;
use crate::ingest::writer::UpsertWriter;
use crate::models::{Instrument, RegistryEntry, RunStatus, RunSummary, SymbolOutcome, SymbolSet};

/// Fans one registry entry out over its symbols with bounded concurrency
///
/// Each symbol is one unit of work (watermark, fetch, write). Failures stay
/// with their symbol; only a registry/config failure fails the whole run.
pub struct Dispatcher {
    ctx: IngestionContext,
    fetcher: Arc<SourceFetcher>,
    tracker: Arc<WatermarkTracker>,
    writer: Arc<UpsertWriter>,
}

/// Everything one spawned worker needs
#[derive(Clone)]
struct SymbolWorker {
    entry: Arc<RegistryEntry>,
    fetcher: Arc<SourceFetcher>,
    tracker: Arc<WatermarkTracker>,
    writer: Arc<UpsertWriter>,
    health: Arc<StoreHealth>,
}

/// Set by the first worker that finds the store unreachable
#[derive(Default)]
struct StoreHealth {
    down: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl StoreHealth {
    fn mark_down(&self, reason: &str) {
        let mut current = self.reason.lock();
        if current.is_none() {
            *current = Some(reason.to_string());
        }
        self.down.store(true, Ordering::SeqCst);
    }

    fn error(&self) -> Option<IngestError> {
        if !self.down.load(Ordering::SeqCst) {
            return None;
        }
        let reason = self
            .reason
            .lock()
            .clone()
            .unwrap_or_else(|| "store unavailable".to_string());
        Some(PersistenceError::StoreUnavailable(reason).into())
    }
}

impl Dispatcher {
    pub fn new(ctx: IngestionContext) -> Self {
        let config = Arc::clone(&ctx.config);

        let fetcher = Arc::new(SourceFetcher::new(
            Arc::clone(&ctx.transport),
            Arc::clone(&ctx.rate_limiter),
            RetryPolicy::from(&config.retry),
            config.api_key.clone(),
        ));
        let tracker = Arc::new(WatermarkTracker::new(
            Arc::clone(&ctx.series),
            config.watermark_overlap(),
            config.default_epoch,
        ));
        let writer = Arc::new(UpsertWriter::new(Arc::clone(&ctx.series)));

        Self {
            ctx,
            fetcher,
            tracker,
            writer,
        }
    }

    pub fn context(&self) -> &IngestionContext {
        &self.ctx
    }

    /// Run the registry entry for one data type
    pub async fn run(&self, data_type: DataType) -> RunSummary {
        let started_at = Utc::now();
        let registry = Arc::clone(&self.ctx.registry);

        let entry = tokio::task::spawn_blocking(move || registry.load(data_type))
            .await
            .unwrap_or_else(|e| Err(ConfigError::RegistryUnavailable(e.to_string())));

        match entry {
            Ok(entry) => self.run_entry(entry).await,
            Err(err) => {
                let err = IngestError::from(err);
                tracing::error!("❌ {} run aborted: {}", data_type, err);
                RunSummary::failed(data_type, started_at, &err)
            }
        }
    }

    /// Run every active registry entry in resource id order
    pub async fn run_all(&self) -> Result<Vec<RunSummary>, ConfigError> {
        self.run_where(|_| true).await
    }

    /// Run the active registry entries accepted by `keep`, one after another
    pub async fn run_where<F>(&self, keep: F) -> Result<Vec<RunSummary>, ConfigError>
    where
        F: Fn(&RegistryEntry) -> bool,
    {
        let registry = Arc::clone(&self.ctx.registry);
        let entries: Vec<RegistryEntry> =
            tokio::task::spawn_blocking(move || registry.list_active())
                .await
                .unwrap_or_else(|e| Err(ConfigError::RegistryUnavailable(e.to_string())))?
                .into_iter()
                .filter(|entry| keep(entry))
                .collect();

        tracing::info!("Running {} active registry entries", entries.len());

        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            summaries.push(self.run_entry(entry).await);
        }

        Ok(summaries)
    }

    /// Run one registry entry across its symbol set
    pub async fn run_entry(&self, entry: RegistryEntry) -> RunSummary {
        let started_at = Utc::now();
        let deadline = Instant::now() + self.ctx.config.run_timeout();

        let symbols = match self.symbol_set(&entry).await {
            Ok(symbols) => symbols,
            Err(err) => {
                let err = IngestError::from(err);
                tracing::error!("❌ {} run aborted: {}", entry.resource_name, err);
                let mut summary = RunSummary::failed(entry.data_type, started_at, &err);
                summary.resource_name = Some(entry.resource_name.clone());
                summary.target_table = Some(entry.target_table.clone());
                return summary;
            }
        };

        tracing::info!(
            "🚀 Starting {} ({}) into {}: {} symbols, concurrency {}",
            entry.resource_name,
            entry.data_type,
            entry.target_table,
            symbols.len(),
            self.ctx.config.max_concurrency
        );

        let entry = Arc::new(entry);
        let health = Arc::new(StoreHealth::default());
        let worker = SymbolWorker {
            entry: Arc::clone(&entry),
            fetcher: Arc::clone(&self.fetcher),
            tracker: Arc::clone(&self.tracker),
            writer: Arc::clone(&self.writer),
            health: Arc::clone(&health),
        };

        let semaphore = Arc::new(Semaphore::new(self.ctx.config.max_concurrency.max(1)));
        let outcomes: Arc<Mutex<Vec<SymbolOutcome>>> =
            Arc::new(Mutex::new(Vec::with_capacity(symbols.len())));
        let mut tasks = JoinSet::new();
        let mut started = Vec::new();

        for instrument in symbols.into_vec() {
            // No new symbols once the deadline has passed
            if Instant::now() >= deadline {
                tracing::warn!("⏱️  Deadline reached, skipping {}", instrument.code);
                outcomes.lock().push(SymbolOutcome::skipped_timeout(instrument.code));
                continue;
            }

            let permit = match tokio::time::timeout_at(
                deadline,
                Arc::clone(&semaphore).acquire_owned(),
            )
            .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) | Err(_) => {
                    tracing::warn!("⏱️  Deadline reached, skipping {}", instrument.code);
                    outcomes.lock().push(SymbolOutcome::skipped_timeout(instrument.code));
                    continue;
                }
            };

            if let Some(err) = health.error() {
                tracing::warn!("Store down, not starting {}", instrument.code);
                outcomes
                    .lock()
                    .push(SymbolOutcome::failed(instrument.code, &err));
                continue;
            }

            let worker = worker.clone();
            let outcomes = Arc::clone(&outcomes);
            let code = instrument.code.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let outcome = worker.process(instrument).await;
                outcomes.lock().push(outcome);
            });
            started.push(code);
        }

        let mut aborted = None;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("❌ {} worker did not finish: {}", entry.resource_name, e);
                aborted = Some(e.to_string());
            }
        }

        let mut collected = std::mem::take(&mut *outcomes.lock());

        // A worker that panicked never reported its symbol
        if let Some(reason) = aborted {
            let reported: HashSet<String> = collected.iter().map(|o| o.symbol.clone()).collect();
            let err = IngestError::from(FetchError::Permanent(format!("worker aborted: {}", reason)));
            for symbol in started.into_iter().filter(|s| !reported.contains(s)) {
                collected.push(SymbolOutcome::failed(symbol, &err));
            }
        }

        let summary = RunSummary::finalize(&entry, started_at, collected);
        log_summary(&summary);
        summary
    }

    /// Symbols an entry fans out over; pairs are only read when needed
    async fn symbol_set(&self, entry: &RegistryEntry) -> Result<SymbolSet, ConfigError> {
        entry.validate()?;

        let pairs = match entry.data_type.symbol_scope() {
            SymbolScope::SingleSeries => Vec::new(),
            SymbolScope::CurrencyPairs | SymbolScope::Currencies => {
                let registry = Arc::clone(&self.ctx.registry);
                tokio::task::spawn_blocking(move || registry.list_symbols())
                    .await
                    .unwrap_or_else(|e| Err(ConfigError::RegistryUnavailable(e.to_string())))?
            }
        };

        SymbolSet::for_entry(entry, &pairs)
    }
}

impl SymbolWorker {
    /// One symbol end to end: watermark, fetch, write
    async fn process(&self, instrument: Instrument) -> SymbolOutcome {
        let entry = self.entry.as_ref();
        let code = instrument.code.clone();

        let resume_point = match self.tracker.resume_point(entry, &code).await {
            Ok(point) => point,
            Err(err) => return self.failed(code, err.into(), None, 0),
        };

        let batch = match self.fetcher.fetch(entry, &instrument, resume_point).await {
            Ok(batch) => batch,
            Err(err) => {
                let attempts = err.attempts();
                return self.failed(code, err.into(), Some(resume_point), attempts);
            }
        };

        let already_stored = batch.already_stored;
        let fetched = batch.len() + already_stored;
        let attempts = batch.attempts;

        match self
            .writer
            .write(entry.data_type, &entry.target_table, batch.records)
            .await
        {
            Ok(written) => {
                let skipped = written.skipped_duplicate + already_stored;
                tracing::info!(
                    "✅ {} {}: fetched {}, inserted {}, skipped {} (attempts {})",
                    entry.resource_name,
                    code,
                    fetched,
                    written.inserted,
                    skipped,
                    attempts
                );
                SymbolOutcome::success(
                    code,
                    resume_point,
                    fetched,
                    written.inserted,
                    skipped,
                    attempts,
                )
            }
            Err(err) => self.failed(code, err.into(), Some(resume_point), attempts),
        }
    }

    fn failed(
        &self,
        code: String,
        err: IngestError,
        resume_point: Option<chrono::DateTime<Utc>>,
        attempts: u32,
    ) -> SymbolOutcome {
        tracing::error!("❌ {} {} failed: {}", self.entry.resource_name, code, err);

        if let IngestError::Persistence(PersistenceError::StoreUnavailable(reason)) = &err {
            self.health.mark_down(reason);
        }

        SymbolOutcome::failed(code, &err).with_progress(resume_point, attempts)
    }
}

fn log_summary(summary: &RunSummary) {
    let elapsed = (summary.finished_at - summary.started_at).num_milliseconds();
    let name = summary.resource_name.as_deref().unwrap_or("?");

    match summary.status {
        RunStatus::Success => tracing::info!(
            "📊 {} finished in {}ms: {} symbols, {} written, {} duplicates skipped",
            name,
            elapsed,
            summary.symbols.len(),
            summary.total_records_written,
            summary.total_skipped_duplicate
        ),
        _ => tracing::warn!(
            "📊 {} finished {:?} in {}ms: {}/{} symbols not successful, {} written, {} duplicates skipped",
            name,
            summary.status,
            elapsed,
            summary.failed_symbols(),
            summary.symbols.len(),
            summary.total_records_written,
            summary.total_skipped_duplicate
        ),
    }
}
