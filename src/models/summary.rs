use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::database::enums::DataType;
use crate::error::{ErrorKind, IngestError};
use crate::models::registry::RegistryEntry;

/// Overall status of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every symbol succeeded
    Success,
    /// At least one symbol failed or was skipped
    Partial,
    /// Registry or configuration could not be loaded; nothing was fetched
    Failed,
}

/// Outcome of one symbol's unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SymbolStatus {
    Success,
    Failed,
    SkippedTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SymbolOutcome {
    pub symbol: String,
    pub status: SymbolStatus,

    /// Watermark minus overlap used for this fetch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_point: Option<DateTime<Utc>>,

    pub records_fetched: usize,
    pub records_written: usize,
    pub skipped_duplicate: usize,

    /// Provider calls spent, including retries
    pub attempts: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SymbolOutcome {
    pub fn success(
        symbol: String,
        resume_point: DateTime<Utc>,
        records_fetched: usize,
        records_written: usize,
        skipped_duplicate: usize,
        attempts: u32,
    ) -> Self {
        Self {
            symbol,
            status: SymbolStatus::Success,
            resume_point: Some(resume_point),
            records_fetched,
            records_written,
            skipped_duplicate,
            attempts,
            error_kind: None,
            error: None,
        }
    }

    pub fn failed(symbol: String, error: &IngestError) -> Self {
        let status = match error {
            IngestError::Timeout => SymbolStatus::SkippedTimeout,
            _ => SymbolStatus::Failed,
        };

        Self {
            symbol,
            status,
            resume_point: None,
            records_fetched: 0,
            records_written: 0,
            skipped_duplicate: 0,
            attempts: 0,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
        }
    }

    /// Set the watermark and attempts known at the point of failure
    pub fn with_progress(mut self, resume_point: Option<DateTime<Utc>>, attempts: u32) -> Self {
        self.resume_point = resume_point;
        self.attempts = attempts;
        self
    }

    pub fn skipped_timeout(symbol: String) -> Self {
        Self::failed(symbol, &IngestError::Timeout)
    }
}

/// Structured report for one dispatch invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RunSummary {
    pub run_id: Uuid,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,

    pub data_type: DataType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_table: Option<String>,

    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub symbols: Vec<SymbolOutcome>,
    pub total_records_written: usize,
    pub total_skipped_duplicate: usize,

    /// Run-level failure reason (only for `failed` runs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    /// Summary for a run aborted before any symbol started
    pub fn failed(data_type: DataType, started_at: DateTime<Utc>, error: &IngestError) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            resource_name: None,
            data_type,
            target_table: None,
            status: RunStatus::Failed,
            started_at,
            finished_at: Utc::now(),
            symbols: Vec::new(),
            total_records_written: 0,
            total_skipped_duplicate: 0,
            error: Some(error.to_string()),
        }
    }

    /// Aggregate per-symbol outcomes into a finished summary
    pub fn finalize(
        entry: &RegistryEntry,
        started_at: DateTime<Utc>,
        mut symbols: Vec<SymbolOutcome>,
    ) -> Self {
        symbols.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let status = if symbols.iter().all(|s| s.status == SymbolStatus::Success) {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };

        Self {
            run_id: Uuid::new_v4(),
            resource_name: Some(entry.resource_name.clone()),
            data_type: entry.data_type,
            target_table: Some(entry.target_table.clone()),
            status,
            started_at,
            finished_at: Utc::now(),
            total_records_written: symbols.iter().map(|s| s.records_written).sum(),
            total_skipped_duplicate: symbols.iter().map(|s| s.skipped_duplicate).sum(),
            symbols,
            error: None,
        }
    }

    pub fn outcome(&self, symbol: &str) -> Option<&SymbolOutcome> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }

    pub fn failed_symbols(&self) -> usize {
        self.symbols
            .iter()
            .filter(|s| s.status != SymbolStatus::Success)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, FetchError};

    fn entry() -> RegistryEntry {
        RegistryEntry {
            resource_id: 6,
            resource_name: "FX Daily".to_string(),
            data_type: DataType::FxDaily,
            target_table: "FX_Daily".to_string(),
            endpoint_template: "https://example.test".to_string(),
            api_function: None,
            api_interval: None,
            description: None,
        }
    }

    #[test]
    fn test_all_success_is_success() {
        let now = Utc::now();
        let summary = RunSummary::finalize(
            &entry(),
            now,
            vec![
                SymbolOutcome::success("GBPUSD".to_string(), now, 2, 2, 0, 1),
                SymbolOutcome::success("EURUSD".to_string(), now, 3, 1, 2, 1),
            ],
        );

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.total_records_written, 3);
        assert_eq!(summary.total_skipped_duplicate, 2);
        assert_eq!(summary.symbols[0].symbol, "EURUSD");
    }

    #[test]
    fn test_any_failure_is_partial() {
        let now = Utc::now();
        let err = IngestError::from(FetchError::Permanent("HTTP 404".to_string()));
        let summary = RunSummary::finalize(
            &entry(),
            now,
            vec![
                SymbolOutcome::success("EURUSD".to_string(), now, 3, 3, 0, 1),
                SymbolOutcome::failed("GBPUSD".to_string(), &err),
            ],
        );

        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(summary.failed_symbols(), 1);
        let gbp = summary.outcome("GBPUSD").unwrap();
        assert_eq!(gbp.status, SymbolStatus::Failed);
        assert_eq!(gbp.error_kind, Some(ErrorKind::PermanentFetch));
    }

    #[test]
    fn test_timeout_outcome() {
        let outcome = SymbolOutcome::skipped_timeout("EURUSD".to_string());
        assert_eq!(outcome.status, SymbolStatus::SkippedTimeout);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Timeout));
    }

    #[test]
    fn test_failed_run_serializes_status() {
        let err = IngestError::from(ConfigError::MissingRegistryEntry(DataType::FxDaily));
        let summary = RunSummary::failed(DataType::FxDaily, Utc::now(), &err);
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["status"], "failed");
        assert_eq!(json["data_type"], "fx_daily");
        assert_eq!(
            json["error"],
            "No active registry entry for data type fx_daily"
        );
        assert!(json.get("target_table").is_none());
    }
}
