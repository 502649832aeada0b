use crate::database::connection::{DatabaseError, PgPooledConnection};
use crate::database::enums::DataType;
use crate::database::models::{CurrencyPairRow, RegistryRow};
use crate::database::schema::{currency_pairs, resource_registry};
use crate::error::ConfigError;
use crate::models::{CurrencyPair, RegistryEntry};
use diesel::prelude::*;
use std::sync::Arc;

/// Registry store - read-only lookup of data-source definitions and symbols
///
/// Implementations hold no mutable state and are safe to share across
/// concurrent dispatch runs.
#[async_trait::async_trait]
pub trait RegistryRepository: Send + Sync {
    /// Lowest-id active entry for a data type
    fn load(&self, data_type: DataType) -> Result<RegistryEntry, ConfigError>;

    /// Active entry by resource id
    fn find_by_id(&self, resource_id: i32) -> Result<RegistryEntry, ConfigError>;

    /// All active entries ordered by resource id
    ///
    /// Rows with an unknown data type are logged and left out.
    fn list_active(&self) -> Result<Vec<RegistryEntry>, ConfigError>;

    /// Active currency pairs; fails when there are none
    fn list_symbols(&self) -> Result<Vec<CurrencyPair>, ConfigError>;
}

/// Concrete implementation of RegistryRepository
///
/// Uses the metadata pool from DatabasePools
pub struct RegistryRepositoryImpl {
    get_conn: Arc<dyn Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync>,
}

impl RegistryRepositoryImpl {
    /// Create new registry repository with connection provider
    pub fn new<F>(get_conn: F) -> Self
    where
        F: Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync + 'static,
    {
        Self {
            get_conn: Arc::new(get_conn),
        }
    }

    fn conn(&self) -> Result<PgPooledConnection, ConfigError> {
        (self.get_conn)().map_err(unavailable)
    }
}

fn unavailable(err: impl std::fmt::Display) -> ConfigError {
    ConfigError::RegistryUnavailable(err.to_string())
}

/// Decode listed rows, skipping any that do not name a known data type
///
/// Entries are not validated here; a malformed entry fails only its own run.
fn decode_rows(rows: Vec<RegistryRow>) -> Vec<RegistryEntry> {
    rows.into_iter()
        .filter_map(|row| {
            let resource_id = row.resource_id;
            match RegistryEntry::try_from(row) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("⚠️  Skipping registry entry {}: {}", resource_id, e);
                    None
                }
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl RegistryRepository for RegistryRepositoryImpl {
    fn load(&self, data_type: DataType) -> Result<RegistryEntry, ConfigError> {
        let mut conn = self.conn()?;

        let row = resource_registry::table
            .filter(resource_registry::data_type.eq(data_type))
            .filter(resource_registry::is_active.eq(true))
            .order(resource_registry::resource_id.asc())
            .select(RegistryRow::as_select())
            .first::<RegistryRow>(&mut conn)
            .optional()
            .map_err(unavailable)?
            .ok_or(ConfigError::MissingRegistryEntry(data_type))?;

        RegistryEntry::try_from(row)
    }

    fn find_by_id(&self, resource_id: i32) -> Result<RegistryEntry, ConfigError> {
        let mut conn = self.conn()?;

        let row = resource_registry::table
            .filter(resource_registry::resource_id.eq(resource_id))
            .filter(resource_registry::is_active.eq(true))
            .select(RegistryRow::as_select())
            .first::<RegistryRow>(&mut conn)
            .optional()
            .map_err(unavailable)?
            .ok_or(ConfigError::MissingResource(resource_id))?;

        RegistryEntry::try_from(row)
    }

    fn list_active(&self) -> Result<Vec<RegistryEntry>, ConfigError> {
        let mut conn = self.conn()?;

        let rows = resource_registry::table
            .filter(resource_registry::is_active.eq(true))
            .order(resource_registry::resource_id.asc())
            .select(RegistryRow::as_select())
            .load::<RegistryRow>(&mut conn)
            .map_err(unavailable)?;

        tracing::debug!("Loaded {} active registry entries", rows.len());

        Ok(decode_rows(rows))
    }

    fn list_symbols(&self) -> Result<Vec<CurrencyPair>, ConfigError> {
        let mut conn = self.conn()?;

        let rows = currency_pairs::table
            .filter(currency_pairs::is_active.eq(true))
            .order((currency_pairs::base_currency.asc(), currency_pairs::quote_currency.asc()))
            .select(CurrencyPairRow::as_select())
            .load::<CurrencyPairRow>(&mut conn)
            .map_err(unavailable)?;

        let pairs: Vec<CurrencyPair> = rows
            .into_iter()
            .map(CurrencyPair::from)
            .filter(|p| !p.base.is_empty() && !p.quote.is_empty())
            .collect();

        if pairs.is_empty() {
            return Err(ConfigError::NoCurrencyPairs);
        }

        Ok(pairs)
    }
}
