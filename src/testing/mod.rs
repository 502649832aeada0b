//! In-memory stand-ins for the registry, the series store and the provider
//!
//! Only compiled for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::database::connection::DatabaseError;
use crate::database::enums::DataType;
use crate::database::repositories::{RegistryRepository, SeriesRepository};
use crate::error::{ConfigError, FetchError};
use crate::ingest::transport::{HttpTransport, ProviderResponse};
use crate::models::{CurrencyPair, DedupKey, MarketRecord, RegistryEntry, WriteOutcome};

/// Registry backed by plain vectors
#[derive(Default)]
pub struct InMemoryRegistry {
    pub entries: Vec<RegistryEntry>,
    pub pairs: Vec<CurrencyPair>,
    pub unavailable: bool,
}

impl InMemoryRegistry {
    pub fn new(entries: Vec<RegistryEntry>, pairs: Vec<CurrencyPair>) -> Self {
        Self {
            entries,
            pairs,
            unavailable: false,
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.unavailable {
            return Err(ConfigError::RegistryUnavailable("registry offline".to_string()));
        }
        Ok(())
    }
}

impl RegistryRepository for InMemoryRegistry {
    fn load(&self, data_type: DataType) -> Result<RegistryEntry, ConfigError> {
        self.check()?;
        self.entries
            .iter()
            .filter(|e| e.data_type == data_type)
            .min_by_key(|e| e.resource_id)
            .cloned()
            .ok_or(ConfigError::MissingRegistryEntry(data_type))
    }

    fn find_by_id(&self, resource_id: i32) -> Result<RegistryEntry, ConfigError> {
        self.check()?;
        self.entries
            .iter()
            .find(|e| e.resource_id == resource_id)
            .cloned()
            .ok_or(ConfigError::MissingResource(resource_id))
    }

    fn list_active(&self) -> Result<Vec<RegistryEntry>, ConfigError> {
        self.check()?;
        let mut entries = self.entries.clone();
        entries.sort_by_key(|e| e.resource_id);
        Ok(entries)
    }

    fn list_symbols(&self) -> Result<Vec<CurrencyPair>, ConfigError> {
        self.check()?;
        if self.pairs.is_empty() {
            return Err(ConfigError::NoCurrencyPairs);
        }
        Ok(self.pairs.clone())
    }
}

/// Series store keyed by table and dedup key
#[derive(Default)]
pub struct InMemorySeriesStore {
    tables: Mutex<HashMap<String, BTreeMap<DedupKey, MarketRecord>>>,
    down: AtomicBool,
    writes: AtomicUsize,
    touches: AtomicUsize,
}

impl InMemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a refused connection for every call
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.lock().get(table).map(BTreeMap::len).unwrap_or(0)
    }

    /// Number of `insert_missing` calls that reached the store
    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of calls of any kind, including refused ones
    pub fn touches(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }

    pub fn seed(&self, table: &str, records: Vec<MarketRecord>) {
        let mut tables = self.tables.lock();
        let rows = tables.entry(table.to_string()).or_default();
        for record in records {
            rows.insert(record.dedup_key(), record);
        }
    }

    fn check(&self) -> Result<(), DatabaseError> {
        self.touches.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(DatabaseError::ConnectionPoolError(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

impl SeriesRepository for InMemorySeriesStore {
    fn ensure_table(&self, _data_type: DataType, table: &str) -> Result<(), DatabaseError> {
        self.check()?;
        self.tables.lock().entry(table.to_string()).or_default();
        Ok(())
    }

    fn latest_event_time(
        &self,
        table: &str,
        symbol: &str,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        self.check()?;
        Ok(self.tables.lock().get(table).and_then(|rows| {
            rows.keys()
                .filter(|k| k.symbol == symbol)
                .map(|k| k.event_time)
                .max()
        }))
    }

    fn insert_missing(
        &self,
        _data_type: DataType,
        table: &str,
        records: &[MarketRecord],
    ) -> Result<WriteOutcome, DatabaseError> {
        self.check()?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut tables = self.tables.lock();
        let rows = tables.entry(table.to_string()).or_default();
        let mut outcome = WriteOutcome::default();

        for record in records {
            let key = record.dedup_key();
            if rows.contains_key(&key) {
                outcome.skipped_duplicate += 1;
            } else {
                rows.insert(key, record.clone());
                outcome.inserted += 1;
            }
        }

        Ok(outcome)
    }

    fn count_by_symbol(&self, table: &str, symbol: &str) -> Result<i64, DatabaseError> {
        self.check()?;
        Ok(self
            .tables
            .lock()
            .get(table)
            .map(|rows| rows.keys().filter(|k| k.symbol == symbol).count() as i64)
            .unwrap_or(0))
    }
}

/// Provider stand-in answering by URL fragment
///
/// Responses queued for a fragment are served in order; the last one repeats.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, VecDeque<Result<ProviderResponse, FetchError>>)>>,
    calls: Mutex<Vec<String>>,
    call_times: Mutex<Vec<Instant>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, fragment: &str, response: ProviderResponse) {
        self.push(fragment, Ok(response));
    }

    pub fn fail(&self, fragment: &str, error: FetchError) {
        self.push(fragment, Err(error));
    }

    /// Delay every response (for deadline tests)
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Instants at which calls arrived, in arrival order
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().clone()
    }

    pub fn call_count(&self, fragment: &str) -> usize {
        self.calls.lock().iter().filter(|url| url.contains(fragment)).count()
    }

    fn push(&self, fragment: &str, response: Result<ProviderResponse, FetchError>) {
        let mut routes = self.routes.lock();
        match routes.iter_mut().find(|(f, _)| f == fragment) {
            Some((_, queue)) => queue.push_back(response),
            None => routes.push((fragment.to_string(), VecDeque::from([response]))),
        }
    }

    fn next_response(&self, url: &str) -> Result<ProviderResponse, FetchError> {
        let mut routes = self.routes.lock();
        let Some((_, queue)) = routes.iter_mut().find(|(f, _)| url.contains(f.as_str())) else {
            return Ok(ProviderResponse::new(404, "no scripted response"));
        };

        if queue.len() > 1 {
            queue
                .pop_front()
                .unwrap_or_else(|| Ok(ProviderResponse::new(404, "")))
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(ProviderResponse::new(404, "")))
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<ProviderResponse, FetchError> {
        self.calls.lock().push(url.to_string());
        self.call_times.lock().push(Instant::now());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.next_response(url)
    }
}
