//! Per-type response parsers
//!
//! One strategy per data type, selected by a single match in [`parse_records`].
//! Row-level problems are logged and skipped; a missing top-level series key
//! means the provider has no data for the symbol and yields an empty batch.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::database::enums::DataType;
use crate::error::FetchError;
use crate::models::{
    FxBar, IndicatorPoint, Instrument, MarketRecord, NewsArticle, RegistryEntry, SeriesPoint,
};

const NEWS_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Turn a provider payload into typed records at or after `since`
///
/// Also returns how many well-formed records fell before `since`; those were
/// stored by an earlier run and count as duplicates.
pub fn parse_records(
    entry: &RegistryEntry,
    instrument: &Instrument,
    payload: &Value,
    since: DateTime<Utc>,
) -> Result<(Vec<MarketRecord>, usize), FetchError> {
    let records: Vec<MarketRecord> = match entry.data_type {
        DataType::MacroIndicator => observations(payload, &instrument.code)
            .into_iter()
            .map(MarketRecord::Macro)
            .collect(),
        DataType::CommodityPrice => observations(payload, &instrument.code)
            .into_iter()
            .map(MarketRecord::Commodity)
            .collect(),
        DataType::FxIntraday | DataType::FxDaily => fx_bars(entry.data_type, payload, instrument)
            .into_iter()
            .map(MarketRecord::Fx)
            .collect(),
        DataType::TechnicalIndicator => indicator_points(entry, payload, instrument)?
            .into_iter()
            .map(MarketRecord::Indicator)
            .collect(),
        DataType::NewsSentiment => news_articles(payload, instrument)
            .into_iter()
            .map(MarketRecord::News)
            .collect(),
    };

    let (fresh, stale): (Vec<MarketRecord>, Vec<MarketRecord>) = records
        .into_iter()
        .partition(|r: &MarketRecord| r.event_time() >= since);

    Ok((fresh, stale.len()))
}

/// `data[] {date, value}` series (macro indicators, commodities)
fn observations(payload: &Value, symbol: &str) -> Vec<SeriesPoint> {
    let Some(rows) = payload.get("data").and_then(Value::as_array) else {
        tracing::warn!("No data array in response for {}", symbol);
        return Vec::new();
    };

    rows.iter()
        .filter_map(|row| {
            let date = row.get("date").and_then(Value::as_str);
            let value = row.get("value").and_then(decimal);

            match (date.and_then(parse_time), value) {
                (Some(event_time), Some(value)) => Some(SeriesPoint {
                    symbol: symbol.to_string(),
                    event_time,
                    value,
                }),
                _ => {
                    // "." marks a missing observation
                    if row.get("value").and_then(Value::as_str) != Some(".") {
                        tracing::warn!("Skipping invalid {} record: {}", symbol, row);
                    }
                    None
                }
            }
        })
        .collect()
}

/// `Time Series FX (...)` map of timestamp to OHLC
fn fx_bars(data_type: DataType, payload: &Value, instrument: &Instrument) -> Vec<FxBar> {
    let Some(key) = data_type.fx_series_key() else {
        return Vec::new();
    };

    let Some(series) = payload.get(key).and_then(Value::as_object) else {
        tracing::warn!("No '{}' data for {}", key, instrument.code);
        return Vec::new();
    };

    let from_symbol = instrument.base.clone().unwrap_or_default();
    let to_symbol = instrument.quote.clone().unwrap_or_default();

    series
        .iter()
        .filter_map(|(timestamp, values)| {
            let bar = parse_time(timestamp).and_then(|event_time| {
                Some(FxBar {
                    symbol: instrument.code.clone(),
                    from_symbol: from_symbol.clone(),
                    to_symbol: to_symbol.clone(),
                    event_time,
                    open_price: field(values, "1. open")?,
                    high_price: field(values, "2. high")?,
                    low_price: field(values, "3. low")?,
                    close_price: field(values, "4. close")?,
                })
            });

            if bar.is_none() {
                tracing::warn!("Skipping malformed bar {} for {}", timestamp, instrument.code);
            }
            bar
        })
        .collect()
}

/// `Technical Analysis: <FUNCTION>` map of timestamp to `{<FUNCTION>: value}`
fn indicator_points(
    entry: &RegistryEntry,
    payload: &Value,
    instrument: &Instrument,
) -> Result<Vec<IndicatorPoint>, FetchError> {
    let params = entry
        .indicator_params()
        .map_err(|e| FetchError::Permanent(e.to_string()))?;
    let key = format!("Technical Analysis: {}", params.function);

    let Some(series) = payload.get(&key).and_then(Value::as_object) else {
        tracing::warn!("No '{}' data for {}", key, instrument.code);
        return Ok(Vec::new());
    };

    let time_period = i32::try_from(params.time_period)
        .map_err(|_| FetchError::Permanent(format!("time period {} out of range", params.time_period)))?;

    Ok(series
        .iter()
        .filter_map(|(timestamp, values)| {
            let event_time = parse_time(timestamp)?;
            let value = field(values, &params.function)?;

            Some(IndicatorPoint {
                symbol: instrument.code.clone(),
                event_time,
                indicator: params.function.clone(),
                value,
                interval: params.interval.clone(),
                time_period,
                series_type: params.series_type.clone(),
            })
        })
        .collect())
}

/// `feed[]` of news items with sentiment scores
fn news_articles(payload: &Value, instrument: &Instrument) -> Vec<NewsArticle> {
    let Some(feed) = payload.get("feed").and_then(Value::as_array) else {
        tracing::info!("No news feed items for {}", instrument.code);
        return Vec::new();
    };

    feed.iter()
        .filter_map(|item| {
            let article = news_article(item, &instrument.code);
            if article.is_none() {
                tracing::debug!("Skipping incomplete feed item for {}", instrument.code);
            }
            article
        })
        .collect()
}

/// One feed item, or `None` when its time, score or label is missing
fn news_article(item: &Value, ticker: &str) -> Option<NewsArticle> {
    let published = item.get("time_published").and_then(Value::as_str)?;
    let event_time = NaiveDateTime::parse_from_str(published, NEWS_TIME_FORMAT)
        .ok()?
        .and_utc();

    let sentiment_score = item.get("overall_sentiment_score").and_then(decimal)?;
    let sentiment_label = non_empty(item, "overall_sentiment_label")?;
    // Items without a link still count; they dedup on (ticker, time) alone
    let article_url = non_empty(item, "url").unwrap_or_default();

    let topics = item
        .get("topics")
        .and_then(Value::as_array)
        .map(|topics| {
            topics
                .iter()
                .filter_map(|t| t.get("topic").and_then(Value::as_str))
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    // Relevance for the requested ticker, else the feed-level score
    let relevance_score = item
        .get("ticker_sentiment")
        .and_then(Value::as_array)
        .and_then(|list| {
            list.iter()
                .find(|t| t.get("ticker").and_then(Value::as_str) == Some(ticker))
        })
        .and_then(|t| t.get("relevance_score"))
        .or_else(|| item.get("relevance_score"))
        .and_then(decimal)
        .unwrap_or(Decimal::ZERO);

    Some(NewsArticle {
        symbol: ticker.to_string(),
        event_time,
        article_url,
        title: non_empty(item, "title"),
        topics,
        sentiment_score,
        sentiment_label,
        relevance_score,
        source: non_empty(item, "source"),
        summary: non_empty(item, "summary"),
    })
}

/// Provider timestamps: dates, minute and second resolution, all UTC
fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
        return Some(dt.and_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn field(values: &Value, name: &str) -> Option<Decimal> {
    values.get(name).and_then(decimal)
}

/// Numbers arrive as JSON strings or numbers
fn decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    }
}

fn non_empty(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Top-level keys of a JSON object, for diagnostics
pub fn top_level_keys(payload: &Value) -> Vec<String> {
    payload
        .as_object()
        .map(Map::keys)
        .map(|keys| keys.cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CurrencyPair;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn entry(data_type: DataType) -> RegistryEntry {
        RegistryEntry {
            resource_id: 1,
            resource_name: "Test".to_string(),
            data_type,
            target_table: "target".to_string(),
            endpoint_template: "https://av.test".to_string(),
            api_function: None,
            api_interval: None,
            description: None,
        }
    }

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap()
    }

    fn eurusd() -> Instrument {
        Instrument::pair(&CurrencyPair::new("EUR", "USD"))
    }

    #[test]
    fn test_macro_skips_missing_values() {
        let payload = json!({
            "name": "Real Gross Domestic Product",
            "data": [
                {"date": "2024-01-01", "value": "22679.255"},
                {"date": "2023-10-01", "value": "."},
                {"date": "bad", "value": "1.0"},
                {"date": "2023-07-01", "value": "22225.350"}
            ]
        });

        let (records, _) = parse_records(
            &entry(DataType::MacroIndicator),
            &Instrument::series("REAL_GDP"),
            &payload,
            epoch(),
        )
        .unwrap();

        assert_eq!(records.len(), 2);
        match &records[0] {
            MarketRecord::Macro(point) => {
                assert_eq!(point.symbol, "REAL_GDP");
                assert_eq!(point.value, dec!(22679.255));
                assert_eq!(point.event_time, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_commodity_records_before_resume_point_are_dropped() {
        let payload = json!({
            "data": [
                {"date": "2024-05-03", "value": "78.11"},
                {"date": "2024-05-02", "value": "79.00"},
                {"date": "2024-05-01", "value": "79.99"}
            ]
        });

        let since = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let (records, stale) = parse_records(
            &entry(DataType::CommodityPrice),
            &Instrument::series("WTI"),
            &payload,
            since,
        )
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(stale, 1);
        assert!(records.iter().all(|r| matches!(r, MarketRecord::Commodity(_))));
        assert!(records.iter().all(|r| r.event_time() >= since));
    }

    #[test]
    fn test_fx_intraday_bars() {
        let payload = json!({
            "Meta Data": {"1. Information": "FX Intraday (5min) Time Series"},
            "Time Series FX (5min)": {
                "2024-05-01 12:05:00": {"1. open": "1.0701", "2. high": "1.0710", "3. low": "1.0699", "4. close": "1.0705"},
                "2024-05-01 12:00:00": {"1. open": "1.0698", "2. high": "1.0702", "3. low": "1.0690", "4. close": "1.0701"},
                "2024-05-01 11:55:00": {"1. open": "oops"}
            }
        });

        let (records, _) =
            parse_records(&entry(DataType::FxIntraday), &eurusd(), &payload, epoch()).unwrap();
        assert_eq!(records.len(), 2);

        let bar = records
            .iter()
            .find_map(|r| match r {
                MarketRecord::Fx(bar)
                    if bar.event_time == Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap() =>
                {
                    Some(bar)
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(bar.symbol, "EURUSD");
        assert_eq!(bar.from_symbol, "EUR");
        assert_eq!(bar.to_symbol, "USD");
        assert_eq!(bar.close_price, dec!(1.0705));
    }

    #[test]
    fn test_fx_daily_uses_its_own_series_key() {
        let payload = json!({
            "Time Series FX (5min)": {
                "2024-05-01 12:05:00": {"1. open": "1", "2. high": "1", "3. low": "1", "4. close": "1"}
            }
        });

        // Intraday payload has nothing for a daily entry
        let (records, _) =
            parse_records(&entry(DataType::FxDaily), &eurusd(), &payload, epoch()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_technical_indicator() {
        let mut sma = entry(DataType::TechnicalIndicator);
        sma.api_function = Some("SMA".to_string());
        sma.api_interval = Some("daily:20".to_string());

        let payload = json!({
            "Technical Analysis: SMA": {
                "2024-05-01": {"SMA": "1.0712"},
                "2024-04-30": {"SMA": "1.0708"},
                "2024-04-29": {"EMA": "1.0"}
            }
        });

        let (records, _) = parse_records(&sma, &eurusd(), &payload, epoch()).unwrap();
        assert_eq!(records.len(), 2);

        match &records[0] {
            MarketRecord::Indicator(point) => {
                assert_eq!(point.indicator, "SMA");
                assert_eq!(point.interval, "daily");
                assert_eq!(point.time_period, 20);
                assert_eq!(point.series_type, "close");
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_news_feed() {
        let payload = json!({
            "items": "2",
            "feed": [
                {
                    "title": "Dollar steadies",
                    "url": "https://news.test/a",
                    "time_published": "20240501T133000",
                    "summary": "The dollar held gains.",
                    "source": "Reuters",
                    "topics": [{"topic": "Economy - Monetary", "relevance_score": "0.9"}, {"topic": "Financial Markets"}],
                    "overall_sentiment_score": 0.12,
                    "overall_sentiment_label": "Neutral",
                    "ticker_sentiment": [
                        {"ticker": "FOREX:EUR", "relevance_score": "0.1"},
                        {"ticker": "FOREX:USD", "relevance_score": "0.75"}
                    ]
                },
                {
                    "url": "https://news.test/b",
                    "time_published": "20240501T120000",
                    "overall_sentiment_label": "Bullish"
                }
            ]
        });

        let (records, _) =
            parse_records(&entry(DataType::NewsSentiment), &Instrument::currency("USD"), &payload, epoch())
                .unwrap();
        assert_eq!(records.len(), 1);

        match &records[0] {
            MarketRecord::News(article) => {
                assert_eq!(article.symbol, "FOREX:USD");
                assert_eq!(article.article_url, "https://news.test/a");
                assert_eq!(article.topics, "Economy - Monetary, Financial Markets");
                assert_eq!(article.sentiment_score, dec!(0.12));
                assert_eq!(article.relevance_score, dec!(0.75));
                assert_eq!(article.title.as_deref(), Some("Dollar steadies"));
                assert_eq!(
                    article.event_time,
                    Utc.with_ymd_and_hms(2024, 5, 1, 13, 30, 0).unwrap()
                );
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_news_item_without_url_is_kept() {
        let payload = json!({
            "feed": [
                {
                    "title": "Euro slips",
                    "time_published": "20240502T090000",
                    "overall_sentiment_score": -0.2,
                    "overall_sentiment_label": "Somewhat-Bearish"
                },
                {
                    "url": "",
                    "time_published": "20240502T100000",
                    "overall_sentiment_score": 0.05,
                    "overall_sentiment_label": "Neutral"
                }
            ]
        });

        let (records, _) =
            parse_records(&entry(DataType::NewsSentiment), &Instrument::currency("EUR"), &payload, epoch())
                .unwrap();
        assert_eq!(records.len(), 2);

        let keys: Vec<_> = records.iter().map(MarketRecord::dedup_key).collect();
        assert_eq!(keys[0].symbol, "FOREX:EUR");
        assert_eq!(keys[0].discriminator.as_deref(), Some(""));
        assert_ne!(keys[0], keys[1]);
        match &records[0] {
            MarketRecord::News(article) => {
                assert!(article.article_url.is_empty());
                assert_eq!(article.title.as_deref(), Some("Euro slips"));
                assert_eq!(article.sentiment_score, dec!(-0.2));
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_missing_series_key_is_empty_batch() {
        let payload = json!({"Meta Data": {}});
        let (records, _) =
            parse_records(&entry(DataType::FxDaily), &eurusd(), &payload, epoch()).unwrap();
        assert!(records.is_empty());
        assert_eq!(top_level_keys(&payload), vec!["Meta Data".to_string()]);
    }
}
