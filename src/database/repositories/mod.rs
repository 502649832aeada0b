/// Repository pattern implementations
///
/// - **RegistryRepository**: data-source definitions and currency pairs (metadata pool)
/// - **SeriesRepository**: target tables receiving fetched records (timeseries pool)
///
/// Both traits are synchronous; async callers go through `spawn_blocking`.

pub mod registry_repository;
pub mod series_repository;

pub use registry_repository::{RegistryRepository, RegistryRepositoryImpl};
pub use series_repository::{SeriesRepository, SeriesRepositoryImpl};
