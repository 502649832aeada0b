use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::database::enums::DataType;
use crate::error::ConfigError;
use crate::models::{CurrencyPair, RegistryEntry};

/// Row of `resource_registry`
///
/// Maintained by an administrator; the engine only reads it.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::database::schema::resource_registry)]
#[diesel(primary_key(resource_id))]
pub struct RegistryRow {
    pub resource_id: i32,
    pub resource_name: String,
    /// Kept as text so one unknown kind does not fail a whole listing
    pub data_type: String,
    pub target_table: String,
    pub api_function: Option<String>,
    pub api_interval: Option<String>,
    pub api_endpoint: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub registered_at: DateTime<Utc>,
}

impl TryFrom<RegistryRow> for RegistryEntry {
    type Error = ConfigError;

    fn try_from(row: RegistryRow) -> Result<Self, Self::Error> {
        let data_type = DataType::from_str(row.data_type.trim()).ok_or_else(|| {
            ConfigError::InvalidEntry {
                resource: row.resource_name.clone(),
                reason: format!("unknown data type '{}'", row.data_type),
            }
        })?;

        Ok(RegistryEntry {
            resource_id: row.resource_id,
            resource_name: row.resource_name,
            data_type,
            target_table: row.target_table.trim().to_string(),
            endpoint_template: row.api_endpoint,
            api_function: row.api_function,
            api_interval: row.api_interval,
            description: row.description,
        })
    }
}

/// Row of `currency_pairs`
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::database::schema::currency_pairs)]
#[diesel(primary_key(pair_id))]
pub struct CurrencyPairRow {
    pub pair_id: i32,
    pub base_currency: String,
    pub quote_currency: String,
    pub is_active: bool,
}

impl From<CurrencyPairRow> for CurrencyPair {
    fn from(row: CurrencyPairRow) -> Self {
        CurrencyPair::new(row.base_currency, row.quote_currency)
    }
}
