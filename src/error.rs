//! Error taxonomy for ingestion runs
//!
//! Errors are split by the layer that raises them so the dispatcher can decide
//! how far a failure propagates:
//!
//! - **ConfigError**: registry, symbol or environment problems. Aborts the whole run
//!   before any fetch starts.
//! - **FetchError**: provider failures for one symbol. Rate-limit and transient errors
//!   are retried by the fetcher; what reaches the dispatcher is recorded per symbol.
//! - **PersistenceError**: store failures for one symbol. A store-down condition stops
//!   new symbols from starting in the same run.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::database::connection::DatabaseError;
use crate::database::enums::DataType;

/// Missing or invalid configuration (registry, symbols, environment)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No active registry entry for data type {0}")]
    MissingRegistryEntry(DataType),

    #[error("No active registry entry with id {0}")]
    MissingResource(i32),

    #[error("Symbol set for {0} is empty")]
    EmptySymbolSet(DataType),

    #[error("No active currency pairs in the symbol table")]
    NoCurrencyPairs,

    #[error("Invalid registry entry {resource}: {reason}")]
    InvalidEntry { resource: String, reason: String },

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),
}

/// Provider-side failure for one symbol
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Provider throttled the request (HTTP 429 or a throttling note in the body)
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    /// Network error or 5xx response
    #[error("Transient fetch error: {0}")]
    Transient(String),

    /// Invalid symbol, 4xx, malformed response or bad endpoint template
    #[error("Permanent fetch error: {0}")]
    Permanent(String),

    /// Retry budget spent on rate-limit or transient failures
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// Returns true if the fetcher should try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::RateLimited(_) | FetchError::Transient(_))
    }

    /// Provider calls spent before this error surfaced
    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::RetriesExhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}

/// Store-side failure for one symbol
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// Pool exhausted or connection refused; the store is treated as down for the run
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Query or constraint failure unrelated to the dedup key
    #[error("Write failed: {0}")]
    Write(String),
}

impl PersistenceError {
    pub fn is_store_down(&self) -> bool {
        matches!(self, PersistenceError::StoreUnavailable(_))
    }
}

impl From<DatabaseError> for PersistenceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConnectionPoolError(msg) | DatabaseError::ConnectionFailed(msg) => {
                PersistenceError::StoreUnavailable(msg)
            }
            other => PersistenceError::Write(other.to_string()),
        }
    }
}

/// Any error that can end a unit of work
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Run deadline reached before the symbol was started")]
    Timeout,
}

/// Coarse error category reported in run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    RateLimit,
    TransientFetch,
    PermanentFetch,
    Persistence,
    Timeout,
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Config(_) => ErrorKind::Config,
            IngestError::Fetch(FetchError::RateLimited(_)) => ErrorKind::RateLimit,
            IngestError::Fetch(FetchError::Transient(_)) => ErrorKind::TransientFetch,
            IngestError::Fetch(FetchError::Permanent(_)) => ErrorKind::PermanentFetch,
            IngestError::Fetch(FetchError::RetriesExhausted { last, .. }) => match last.as_ref() {
                FetchError::RateLimited(_) => ErrorKind::RateLimit,
                _ => ErrorKind::TransientFetch,
            },
            IngestError::Persistence(_) => ErrorKind::Persistence,
            IngestError::Timeout => ErrorKind::Timeout,
        }
    }
}
