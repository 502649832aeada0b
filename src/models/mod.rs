pub mod record;
pub mod registry;
pub mod summary;

pub use crate::database::enums::{DataType, SymbolScope};
pub use record::{
    DedupKey, FetchBatch, FxBar, IndicatorPoint, MarketRecord, NewsArticle, SeriesPoint,
    WriteOutcome,
};
pub use registry::{CurrencyPair, IndicatorParams, Instrument, RegistryEntry, SymbolSet};
pub use summary::{RunStatus, RunSummary, SymbolOutcome, SymbolStatus};
