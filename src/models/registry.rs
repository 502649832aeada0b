use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use utoipa::ToSchema;

use crate::database::connection::validate_identifier;
use crate::database::enums::{DataType, SymbolScope};
use crate::error::ConfigError;

/// Technical indicator defaults when the registry leaves them out
pub const DEFAULT_INDICATOR_INTERVAL: &str = "daily";
pub const DEFAULT_INDICATOR_TIME_PERIOD: u32 = 20;
pub const DEFAULT_SERIES_TYPE: &str = "close";

/// Definition of one data source: what to fetch and where to store it
///
/// Loaded once at dispatch start and never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RegistryEntry {
    pub resource_id: i32,

    /// Human-readable name (e.g., "Real GDP", "SMA 20 daily")
    pub resource_name: String,

    pub data_type: DataType,

    /// Target table receiving the fetched rows
    pub target_table: String,

    /// Endpoint with `{placeholder}` slots (symbol, from_symbol, apikey, ...)
    pub endpoint_template: String,

    /// Provider function name (e.g., "SMA", "REAL_GDP")
    pub api_function: Option<String>,

    /// Provider interval; `interval:time_period` for technical indicators
    pub api_interval: Option<String>,

    pub description: Option<String>,
}

/// Resolved technical indicator parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorParams {
    pub function: String,
    pub interval: String,
    pub time_period: u32,
    pub series_type: String,
}

impl RegistryEntry {
    /// Check everything the engine relies on before a run starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier(&self.target_table).map_err(|e| self.invalid(e.to_string()))?;

        if self.endpoint_template.trim().is_empty() {
            return Err(self.invalid("empty endpoint template".to_string()));
        }

        if self.data_type == DataType::TechnicalIndicator {
            self.indicator_params()?;
        }

        Ok(())
    }

    /// Split `api_interval` into interval and time period (default `daily:20`)
    pub fn indicator_params(&self) -> Result<IndicatorParams, ConfigError> {
        let function = self
            .api_function
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| self.invalid("technical indicator needs api_function".to_string()))?
            .to_uppercase();

        let (interval, time_period) = match self.api_interval.as_deref().map(str::trim) {
            Some(raw) if raw.contains(':') => {
                let (interval, period) = raw.split_once(':').unwrap_or((raw, ""));
                let time_period = period
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|p| *p > 0)
                    .ok_or_else(|| self.invalid(format!("invalid time period in '{}'", raw)))?;
                (interval.trim().to_string(), time_period)
            }
            Some(raw) if !raw.is_empty() => (raw.to_string(), DEFAULT_INDICATOR_TIME_PERIOD),
            _ => (
                DEFAULT_INDICATOR_INTERVAL.to_string(),
                DEFAULT_INDICATOR_TIME_PERIOD,
            ),
        };

        Ok(IndicatorParams {
            function,
            interval,
            time_period,
            series_type: DEFAULT_SERIES_TYPE.to_string(),
        })
    }

    /// Symbol under which single-series rows are stored
    pub fn series_symbol(&self) -> String {
        self.api_function
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_uppercase)
            .unwrap_or_else(|| self.resource_name.clone())
    }

    fn invalid(&self, reason: String) -> ConfigError {
        ConfigError::InvalidEntry {
            resource: self.resource_name.clone(),
            reason,
        }
    }
}

/// Active currency pair from the symbol table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().trim().to_uppercase(),
            quote: quote.into().trim().to_uppercase(),
        }
    }

    /// Pair code as stored in target tables (e.g., "EURUSD")
    pub fn code(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

/// One unit of work for the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub struct Instrument {
    /// Symbol stored in the target table and reported in run summaries
    pub code: String,

    /// Base currency (pairs) or the currency itself (news tickers)
    pub base: Option<String>,

    /// Quote currency (pairs only)
    pub quote: Option<String>,
}

impl Instrument {
    pub fn pair(pair: &CurrencyPair) -> Self {
        Self {
            code: pair.code(),
            base: Some(pair.base.clone()),
            quote: Some(pair.quote.clone()),
        }
    }

    /// News ticker for a single currency (e.g., "FOREX:USD")
    pub fn currency(currency: &str) -> Self {
        Self {
            code: format!("FOREX:{}", currency),
            base: Some(currency.to_string()),
            quote: None,
        }
    }

    pub fn series(name: impl Into<String>) -> Self {
        Self {
            code: name.into(),
            base: None,
            quote: None,
        }
    }
}

/// Ordered set of unique instruments processed by one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolSet(BTreeSet<Instrument>);

impl SymbolSet {
    /// Derive the instruments a registry entry fans out over
    pub fn for_entry(entry: &RegistryEntry, pairs: &[CurrencyPair]) -> Result<Self, ConfigError> {
        let usable = pairs
            .iter()
            .filter(|p| !p.base.is_empty() && !p.quote.is_empty());

        let set: BTreeSet<Instrument> = match entry.data_type.symbol_scope() {
            SymbolScope::CurrencyPairs => usable.map(Instrument::pair).collect(),
            SymbolScope::Currencies => usable
                .flat_map(|p| [p.base.as_str(), p.quote.as_str()])
                .map(Instrument::currency)
                .collect(),
            SymbolScope::SingleSeries => {
                BTreeSet::from([Instrument::series(entry.series_symbol())])
            }
        };

        if set.is_empty() {
            return Err(ConfigError::EmptySymbolSet(entry.data_type));
        }

        Ok(Self(set))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Instrument> {
        self.0.into_iter().collect()
    }
}

impl FromIterator<Instrument> for SymbolSet {
    fn from_iter<I: IntoIterator<Item = Instrument>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
