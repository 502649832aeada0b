use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::Pg;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use utoipa::ToSchema;

/// Kind of market data a registry entry describes
///
/// Stored as TEXT in `resource_registry.data_type`. Every variant maps to one
/// fetch/parse strategy and one target table layout.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
    AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Macro-economic series (real GDP, CPI, ...)
    MacroIndicator,

    /// Technical indicator per currency pair (SMA, EMA, RSI, ...)
    TechnicalIndicator,

    /// Commodity price series (WTI, Brent, ...)
    CommodityPrice,

    /// 5-minute FX bars per currency pair
    FxIntraday,

    /// Daily FX bars per currency pair
    FxDaily,

    /// News articles with sentiment scores per currency ticker
    NewsSentiment,
}

/// Which symbols a data type fans out over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    /// One unit of work per active currency pair
    CurrencyPairs,
    /// One unit of work per distinct currency (`FOREX:USD`)
    Currencies,
    /// A single series named by the registry entry
    SingleSeries,
}

impl DataType {
    /// Convert enum to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::MacroIndicator => "macro_indicator",
            DataType::TechnicalIndicator => "technical_indicator",
            DataType::CommodityPrice => "commodity_price",
            DataType::FxIntraday => "fx_intraday",
            DataType::FxDaily => "fx_daily",
            DataType::NewsSentiment => "news_sentiment",
        }
    }

    /// Parse string to DataType enum
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "macro_indicator" => Some(DataType::MacroIndicator),
            "technical_indicator" => Some(DataType::TechnicalIndicator),
            "commodity_price" => Some(DataType::CommodityPrice),
            "fx_intraday" => Some(DataType::FxIntraday),
            "fx_daily" => Some(DataType::FxDaily),
            "news_sentiment" => Some(DataType::NewsSentiment),
            _ => None,
        }
    }

    /// Get all data type variants
    pub fn all() -> Vec<Self> {
        vec![
            DataType::MacroIndicator,
            DataType::TechnicalIndicator,
            DataType::CommodityPrice,
            DataType::FxIntraday,
            DataType::FxDaily,
            DataType::NewsSentiment,
        ]
    }

    pub fn symbol_scope(&self) -> SymbolScope {
        match self {
            DataType::MacroIndicator | DataType::CommodityPrice => SymbolScope::SingleSeries,
            DataType::TechnicalIndicator | DataType::FxIntraday | DataType::FxDaily => {
                SymbolScope::CurrencyPairs
            }
            DataType::NewsSentiment => SymbolScope::Currencies,
        }
    }

    /// Columns of the natural dedup key in the target table
    pub fn dedup_columns(&self) -> &'static [&'static str] {
        match self {
            DataType::TechnicalIndicator => &["symbol", "event_time", "indicator"],
            DataType::NewsSentiment => &["symbol", "event_time", "article_url"],
            _ => &["symbol", "event_time"],
        }
    }

    /// Provider series key for FX payloads
    pub fn fx_series_key(&self) -> Option<&'static str> {
        match self {
            DataType::FxIntraday => Some("Time Series FX (5min)"),
            DataType::FxDaily => Some("Time Series FX (Daily)"),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Diesel ToSql implementation - convert Rust enum to SQL TEXT
impl ToSql<Text, Pg> for DataType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

// Diesel FromSql implementation - convert SQL TEXT to Rust enum
impl FromSql<Text, Pg> for DataType {
    fn from_sql(bytes: <Pg as diesel::backend::Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        DataType::from_str(&text).ok_or_else(|| format!("Invalid data type value: {}", text).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_round_trips_through_text() {
        for data_type in DataType::all() {
            assert_eq!(DataType::from_str(data_type.as_str()), Some(data_type));
        }
        assert_eq!(DataType::from_str("weekly_fx"), None);
    }

    #[test]
    fn test_symbol_scope() {
        assert_eq!(DataType::FxDaily.symbol_scope(), SymbolScope::CurrencyPairs);
        assert_eq!(DataType::NewsSentiment.symbol_scope(), SymbolScope::Currencies);
        assert_eq!(DataType::CommodityPrice.symbol_scope(), SymbolScope::SingleSeries);
    }

    #[test]
    fn test_dedup_columns_include_metric_discriminator() {
        assert_eq!(
            DataType::TechnicalIndicator.dedup_columns(),
            &["symbol", "event_time", "indicator"]
        );
        assert_eq!(
            DataType::NewsSentiment.dedup_columns(),
            &["symbol", "event_time", "article_url"]
        );
        assert_eq!(DataType::FxDaily.dedup_columns(), &["symbol", "event_time"]);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&DataType::FxIntraday).unwrap();
        assert_eq!(json, "\"fx_intraday\"");
    }
}
