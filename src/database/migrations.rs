use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::database::connection::{DatabaseError, DatabasePools};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Apply pending registry migrations on the metadata database
///
/// Returns the number of migrations applied.
pub fn run_pending_migrations(pools: &DatabasePools) -> Result<usize, DatabaseError> {
    let mut conn = pools.get_metadata_conn()?;

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;

    for version in &applied {
        tracing::info!("Applied migration {}", version);
    }

    Ok(applied.len())
}
