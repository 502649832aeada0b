// Library Crate Root
// lib.rs

// main.rs imports through lib.rs like an external crate
pub mod api;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod models;

#[cfg(test)]
pub(crate) mod testing;

// pub use = re-export at crate root
pub use api::{create_router, AppState};
pub use config::IngestionConfig;
pub use context::IngestionContext;
pub use error::{ConfigError, FetchError, IngestError, PersistenceError};
pub use ingest::Dispatcher;
pub use models::{DataType, RegistryEntry, RunStatus, RunSummary};
