use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::database::enums::DataType;

/// Single-value observation (macro indicators, commodity prices)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub symbol: String,
    pub event_time: DateTime<Utc>,
    pub value: Decimal,
}

/// FX OHLC bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxBar {
    /// Pair code (e.g., "EURUSD")
    pub symbol: String,
    pub from_symbol: String,
    pub to_symbol: String,
    pub event_time: DateTime<Utc>,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub close_price: Decimal,
}

/// Technical indicator value for one pair and timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub symbol: String,
    pub event_time: DateTime<Utc>,
    /// Indicator function (e.g., "SMA")
    pub indicator: String,
    pub value: Decimal,
    pub interval: String,
    pub time_period: i32,
    pub series_type: String,
}

/// News article with its sentiment scores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsArticle {
    /// Ticker the article was fetched for (e.g., "FOREX:USD")
    pub symbol: String,
    /// Publication time
    pub event_time: DateTime<Utc>,
    pub article_url: String,
    pub title: Option<String>,
    pub topics: String,
    pub sentiment_score: Decimal,
    pub sentiment_label: String,
    pub relevance_score: Decimal,
    pub source: Option<String>,
    pub summary: Option<String>,
}

/// Typed record produced by one of the per-type parsers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketRecord {
    Macro(SeriesPoint),
    Commodity(SeriesPoint),
    Fx(FxBar),
    Indicator(IndicatorPoint),
    News(NewsArticle),
}

/// Composite natural key used to make persistence idempotent
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub symbol: String,
    pub event_time: DateTime<Utc>,
    /// Metric or article discriminator when several rows share a timestamp
    pub discriminator: Option<String>,
}

impl MarketRecord {
    pub fn symbol(&self) -> &str {
        match self {
            MarketRecord::Macro(p) | MarketRecord::Commodity(p) => &p.symbol,
            MarketRecord::Fx(bar) => &bar.symbol,
            MarketRecord::Indicator(point) => &point.symbol,
            MarketRecord::News(article) => &article.symbol,
        }
    }

    pub fn event_time(&self) -> DateTime<Utc> {
        match self {
            MarketRecord::Macro(p) | MarketRecord::Commodity(p) => p.event_time,
            MarketRecord::Fx(bar) => bar.event_time,
            MarketRecord::Indicator(point) => point.event_time,
            MarketRecord::News(article) => article.event_time,
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        let discriminator = match self {
            MarketRecord::Indicator(point) => Some(point.indicator.clone()),
            MarketRecord::News(article) => Some(article.article_url.clone()),
            _ => None,
        };

        DedupKey {
            symbol: self.symbol().to_string(),
            event_time: self.event_time(),
            discriminator,
        }
    }
}

/// Raw records returned by one fetch for one symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchBatch {
    pub symbol: String,
    pub data_type: DataType,
    pub records: Vec<MarketRecord>,
    /// Records older than the resume point, already stored by an earlier run
    pub already_stored: usize,
    /// Provider calls spent, including retries
    pub attempts: u32,
}

impl FetchBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Result of writing one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WriteOutcome {
    pub inserted: usize,
    pub skipped_duplicate: usize,
}

impl WriteOutcome {
    pub fn total(&self) -> usize {
        self.inserted + self.skipped_duplicate
    }
}

impl std::ops::AddAssign for WriteOutcome {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.skipped_duplicate += other.skipped_duplicate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn indicator(name: &str) -> MarketRecord {
        MarketRecord::Indicator(IndicatorPoint {
            symbol: "EURUSD".to_string(),
            event_time: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            indicator: name.to_string(),
            value: dec!(1.0712),
            interval: "daily".to_string(),
            time_period: 20,
            series_type: "close".to_string(),
        })
    }

    #[test]
    fn test_indicators_sharing_a_timestamp_have_distinct_keys() {
        assert_ne!(indicator("SMA").dedup_key(), indicator("EMA").dedup_key());
        assert_eq!(indicator("SMA").dedup_key(), indicator("SMA").dedup_key());
    }

    #[test]
    fn test_series_key_has_no_discriminator() {
        let record = MarketRecord::Commodity(SeriesPoint {
            symbol: "WTI".to_string(),
            event_time: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            value: dec!(81.93),
        });
        let key = record.dedup_key();
        assert_eq!(key.symbol, "WTI");
        assert_eq!(key.discriminator, None);
    }

    #[test]
    fn test_write_outcome_accumulates() {
        let mut total = WriteOutcome::default();
        total += WriteOutcome { inserted: 3, skipped_duplicate: 1 };
        total += WriteOutcome { inserted: 0, skipped_duplicate: 4 };
        assert_eq!(total.inserted, 3);
        assert_eq!(total.skipped_duplicate, 5);
        assert_eq!(total.total(), 8);
    }
}
