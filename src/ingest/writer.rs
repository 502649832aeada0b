use std::collections::HashSet;
use std::sync::Arc;

use crate::database::enums::DataType;
use crate::database::repositories::SeriesRepository;
use crate::error::PersistenceError;
use crate::models::{MarketRecord, WriteOutcome};

/// Idempotent writer for one symbol's batch
///
/// Keys already present in the target table, or repeated inside the batch,
/// are counted as skipped instead of inserted.
pub struct UpsertWriter {
    series: Arc<dyn SeriesRepository>,
}

impl UpsertWriter {
    pub fn new(series: Arc<dyn SeriesRepository>) -> Self {
        Self { series }
    }

    pub async fn write(
        &self,
        data_type: DataType,
        target_table: &str,
        records: Vec<MarketRecord>,
    ) -> Result<WriteOutcome, PersistenceError> {
        let (unique, repeated) = collapse_duplicates(records);

        let mut outcome = WriteOutcome {
            inserted: 0,
            skipped_duplicate: repeated,
        };

        if unique.is_empty() {
            return Ok(outcome);
        }

        let series = Arc::clone(&self.series);
        let table = target_table.to_string();

        // Diesel is blocking; run on the blocking pool
        let stored = tokio::task::spawn_blocking(move || {
            series.ensure_table(data_type, &table)?;
            series.insert_missing(data_type, &table, &unique)
        })
        .await
        .map_err(|e| PersistenceError::Write(format!("write task failed: {}", e)))??;

        outcome += stored;
        Ok(outcome)
    }
}

/// Keep the first record per dedup key; return the rest as a count
fn collapse_duplicates(records: Vec<MarketRecord>) -> (Vec<MarketRecord>, usize) {
    let total = records.len();
    let mut seen = HashSet::with_capacity(total);

    let unique: Vec<MarketRecord> = records
        .into_iter()
        .filter(|record| seen.insert(record.dedup_key()))
        .collect();

    let repeated = total - unique.len();
    (unique, repeated)
}
