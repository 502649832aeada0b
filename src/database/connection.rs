use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager, Pool, PooledConnection};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Type alias for PostgreSQL connection pool
pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Type alias for pooled connection
pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Database pools container
///
/// The registry (resource definitions, currency pairs) and the target series
/// tables may live on different servers; both URLs may also point at the same one.
#[derive(Clone)]
pub struct DatabasePools {
    /// Connection pool for the registry database
    pub metadata_pool: Arc<PgPool>,

    /// Connection pool for the target series tables
    pub timeseries_pool: Arc<PgPool>,
}

impl DatabasePools {
    /// Create new database pools from existing pool instances
    pub fn new(metadata_pool: PgPool, timeseries_pool: PgPool) -> Self {
        Self {
            metadata_pool: Arc::new(metadata_pool),
            timeseries_pool: Arc::new(timeseries_pool),
        }
    }

    /// Get a connection from the metadata pool
    pub fn get_metadata_conn(&self) -> Result<PgPooledConnection, DatabaseError> {
        self.metadata_pool
            .get()
            .map_err(|e| DatabaseError::ConnectionPoolError(e.to_string()))
    }

    /// Get a connection from the timeseries pool
    pub fn get_timeseries_conn(&self) -> Result<PgPooledConnection, DatabaseError> {
        self.timeseries_pool
            .get()
            .map_err(|e| DatabaseError::ConnectionPoolError(e.to_string()))
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    ConnectionPoolError(String),

    #[error("Database query error: {0}")]
    QueryError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Diesel error: {0}")]
    DieselError(#[from] diesel::result::Error),
}

/// Establish connection pools for both databases
///
/// # Arguments
/// * `metadata_url` - PostgreSQL connection URL for the registry database
/// * `timeseries_url` - PostgreSQL connection URL for the series tables
/// * `pool_size` - Maximum number of connections per pool
pub fn establish_connection_pools(
    metadata_url: &str,
    timeseries_url: &str,
    pool_size: u32,
) -> Result<DatabasePools, DatabaseError> {
    tracing::info!("Establishing database connection pools...");

    let metadata_pool = build_pool(metadata_url, pool_size, "Metadata")?;
    tracing::info!("Metadata database pool created with max size: {}", pool_size);

    let timeseries_pool = build_pool(timeseries_url, pool_size, "Timeseries")?;
    tracing::info!("Timeseries database pool created with max size: {}", pool_size);

    Ok(DatabasePools::new(metadata_pool, timeseries_pool))
}

fn build_pool(url: &str, pool_size: u32, label: &str) -> Result<PgPool, DatabaseError> {
    let manager = ConnectionManager::<PgConnection>::new(url);
    let pool = r2d2::Pool::builder()
        .max_size(pool_size)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)
        .map_err(|e| DatabaseError::ConnectionPoolError(format!("{} pool: {}", label, e)))?;

    // Test connection
    let _ = pool
        .get()
        .map_err(|e| DatabaseError::ConnectionFailed(format!("{} database: {}", label, e)))?;

    tracing::info!("{} database connection successful", label);

    Ok(pool)
}

/// Validate a table name taken from the registry before it is spliced into SQL
///
/// Accepts `name` or `schema.name`, each part starting with a letter or
/// underscore and containing only ASCII alphanumerics and underscores.
pub fn validate_identifier(name: &str) -> Result<(), DatabaseError> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        part.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| valid_part(p)) {
        return Err(DatabaseError::InvalidIdentifier(name.to_string()));
    }

    Ok(())
}
