/// Database module for the registry and the target series tables
///
/// This module provides:
/// - Connection pooling for the registry (metadata) and series databases
/// - Embedded migrations for the registry tables
/// - Repository implementations behind traits so the ingest layer can be tested in memory
/// - Diesel schema and row models

pub mod connection;
pub mod enums;
pub mod migrations;
pub mod models;
pub mod repositories;
pub mod schema;

pub use connection::{establish_connection_pools, DatabaseError, DatabasePools};
pub use migrations::run_pending_migrations;
