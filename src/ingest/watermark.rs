use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::database::repositories::SeriesRepository;
use crate::error::PersistenceError;
use crate::models::RegistryEntry;

/// Derives where the next fetch for a symbol should start
///
/// Nothing is cached: the watermark is read from the target table on every
/// call, so it only moves when rows are actually persisted.
pub struct WatermarkTracker {
    series: Arc<dyn SeriesRepository>,
    overlap: Duration,
    default_epoch: DateTime<Utc>,
}

impl WatermarkTracker {
    pub fn new(series: Arc<dyn SeriesRepository>, overlap: Duration, default_epoch: DateTime<Utc>) -> Self {
        Self {
            series,
            overlap,
            default_epoch,
        }
    }

    /// Latest stored event time minus the overlap, or the default epoch
    pub async fn resume_point(
        &self,
        entry: &RegistryEntry,
        symbol: &str,
    ) -> Result<DateTime<Utc>, PersistenceError> {
        let series = Arc::clone(&self.series);
        let table = entry.target_table.clone();
        let data_type = entry.data_type;
        let symbol_owned = symbol.to_string();

        let latest = tokio::task::spawn_blocking(move || {
            series.ensure_table(data_type, &table)?;
            series.latest_event_time(&table, &symbol_owned)
        })
        .await
        .map_err(|e| PersistenceError::Write(format!("watermark task failed: {}", e)))??;

        let resume = self.resume_from(latest);
        tracing::debug!(
            "Watermark for {} in {}: latest={:?}, resume={}",
            symbol,
            entry.target_table,
            latest,
            resume
        );

        Ok(resume)
    }

    /// Apply overlap and epoch floor to a stored watermark
    pub fn resume_from(&self, latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
        match latest {
            Some(latest) => latest
                .checked_sub_signed(self.overlap)
                .unwrap_or(self.default_epoch)
                .max(self.default_epoch),
            None => self.default_epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::enums::DataType;
    use crate::models::{MarketRecord, SeriesPoint};
    use crate::testing::InMemorySeriesStore;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap()
    }

    fn entry() -> RegistryEntry {
        RegistryEntry {
            resource_id: 4,
            resource_name: "WTI".to_string(),
            data_type: DataType::CommodityPrice,
            target_table: "WTI_Crude".to_string(),
            endpoint_template: "https://av.test".to_string(),
            api_function: Some("WTI".to_string()),
            api_interval: None,
            description: None,
        }
    }

    fn point(day: u32) -> MarketRecord {
        MarketRecord::Commodity(SeriesPoint {
            symbol: "WTI".to_string(),
            event_time: Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap(),
            value: dec!(80.0),
        })
    }

    #[tokio::test]
    async fn test_empty_table_starts_at_epoch() {
        let store = Arc::new(InMemorySeriesStore::new());
        let tracker = WatermarkTracker::new(store, Duration::minutes(60), epoch());

        assert_eq!(tracker.resume_point(&entry(), "WTI").await.unwrap(), epoch());
    }

    #[tokio::test]
    async fn test_overlap_is_applied() {
        let store = Arc::new(InMemorySeriesStore::new());
        store.seed("WTI_Crude", vec![point(1), point(2)]);
        let tracker = WatermarkTracker::new(store, Duration::minutes(60), epoch());

        let resume = tracker.resume_point(&entry(), "WTI").await.unwrap();
        assert_eq!(resume, Utc.with_ymd_and_hms(2024, 5, 1, 23, 0, 0).unwrap());

        // Other symbols in the same table are unaffected
        assert_eq!(tracker.resume_point(&entry(), "BRENT").await.unwrap(), epoch());
    }

    #[tokio::test]
    async fn test_resume_point_is_monotonic_across_runs() {
        let store = Arc::new(InMemorySeriesStore::new());
        let tracker = WatermarkTracker::new(store.clone(), Duration::days(2), epoch());

        let mut previous = tracker.resume_point(&entry(), "WTI").await.unwrap();
        for day in [3, 1, 7, 5, 9] {
            store.seed("WTI_Crude", vec![point(day)]);
            let next = tracker.resume_point(&entry(), "WTI").await.unwrap();
            assert!(next >= previous);
            previous = next;
        }
    }

    #[test]
    fn test_overlap_never_goes_below_epoch() {
        let store = Arc::new(InMemorySeriesStore::new());
        let tracker = WatermarkTracker::new(store, Duration::days(365), epoch());

        assert_eq!(tracker.resume_from(Some(epoch() + Duration::days(1))), epoch());
    }

    #[tokio::test]
    async fn test_store_down_is_reported() {
        let store = Arc::new(InMemorySeriesStore::new());
        store.set_down(true);
        let tracker = WatermarkTracker::new(store, Duration::minutes(60), epoch());

        let err = tracker.resume_point(&entry(), "WTI").await.unwrap_err();
        assert!(err.is_store_down());
    }
}
