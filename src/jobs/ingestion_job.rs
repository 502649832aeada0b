use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::database::enums::DataType;
use crate::error::ConfigError;
use crate::ingest::Dispatcher;
use crate::models::{RegistryEntry, RunStatus, RunSummary};

/// Which registry kinds a job covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobScope {
    /// Macro, technical, commodity and FX entries
    MarketData,
    /// News sentiment entries
    News,
}

impl JobScope {
    pub fn includes(&self, data_type: DataType) -> bool {
        match self {
            JobScope::MarketData => data_type != DataType::NewsSentiment,
            JobScope::News => data_type == DataType::NewsSentiment,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobScope::MarketData => "market data",
            JobScope::News => "news sentiment",
        }
    }
}

/// Scheduled ingestion for one scope
///
/// A firing that arrives while the previous run of the same job is still
/// active is skipped.
#[derive(Clone)]
pub struct IngestionJob {
    dispatcher: Arc<Dispatcher>,
    scope: JobScope,
    running: Arc<AtomicBool>,
}

/// Holds a job's running flag; clears it on drop, even on panic
pub struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl IngestionJob {
    pub fn new(dispatcher: Arc<Dispatcher>, scope: JobScope) -> Self {
        Self {
            dispatcher,
            scope,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn market_data(dispatcher: Arc<Dispatcher>) -> Self {
        Self::new(dispatcher, JobScope::MarketData)
    }

    pub fn news(dispatcher: Arc<Dispatcher>) -> Self {
        Self::new(dispatcher, JobScope::News)
    }

    pub fn scope(&self) -> JobScope {
        self.scope
    }

    /// Cron expression for this job's scope
    pub fn schedule(&self) -> String {
        let config = &self.dispatcher.context().config;
        match self.scope {
            JobScope::MarketData => config.schedule.clone(),
            JobScope::News => config.news_schedule.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the job as running, or `None` if it already is
    ///
    /// Manual triggers hold the guard too, so they never overlap a firing.
    pub fn try_start(&self) -> Option<RunGuard> {
        if self.running.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(RunGuard(Arc::clone(&self.running)))
    }

    /// Run the scope immediately
    ///
    /// Returns `None` when a run of this job is already in progress.
    pub async fn run_now(&self) -> Option<Result<Vec<RunSummary>, ConfigError>> {
        let Some(_guard) = self.try_start() else {
            tracing::warn!(
                "⏭️  {} ingestion still running, skipping this firing",
                self.scope.label()
            );
            return None;
        };

        let scope = self.scope;
        let result = self
            .dispatcher
            .run_where(|entry: &RegistryEntry| scope.includes(entry.data_type))
            .await;

        match &result {
            Ok(summaries) => {
                let partial = summaries
                    .iter()
                    .filter(|s| s.status != RunStatus::Success)
                    .count();
                tracing::info!(
                    "{} ingestion finished: {} entries, {} not fully successful",
                    scope.label(),
                    summaries.len(),
                    partial
                );
            }
            Err(e) => tracing::error!("❌ {} ingestion failed: {}", scope.label(), e),
        }

        Some(result)
    }

    /// Register this job with the scheduler
    pub async fn register(self, scheduler: &JobScheduler) -> Result<(), Box<dyn std::error::Error>> {
        let schedule = self.schedule();
        let label = self.scope.label();

        let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let job = self.clone();

            Box::pin(async move {
                if job.run_now().await.is_some() {
                    tracing::debug!("{} ingestion job completed", job.scope.label());
                }
            })
        })?;

        scheduler.add(job).await?;

        tracing::info!("{} ingestion job registered ({})", label, schedule);

        Ok(())
    }
}
