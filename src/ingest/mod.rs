//! Ingestion engine: provider access, watermarks, idempotent writes and dispatch

pub mod dispatcher;
pub mod endpoint;
pub mod fetcher;
pub mod parser;
pub mod rate_limiter;
pub mod retry;
pub mod transport;
pub mod watermark;
pub mod writer;

pub use dispatcher::Dispatcher;
pub use fetcher::SourceFetcher;
pub use rate_limiter::{RatePermit, RateLimiter};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, ProviderResponse, ReqwestTransport};
pub use watermark::WatermarkTracker;
pub use writer::UpsertWriter;
