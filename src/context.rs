use std::sync::Arc;

use crate::config::IngestionConfig;
use crate::database::repositories::{
    RegistryRepository, RegistryRepositoryImpl, SeriesRepository, SeriesRepositoryImpl,
};
use crate::database::DatabasePools;
use crate::error::FetchError;
use crate::ingest::rate_limiter::RateLimiter;
use crate::ingest::transport::{HttpTransport, ReqwestTransport};

/// Process-wide collaborators shared by every run
///
/// Built once at startup and handed to the dispatcher, the jobs and the API.
/// The rate limiter inside is the single throttle for all provider calls.
#[derive(Clone)]
pub struct IngestionContext {
    pub config: Arc<IngestionConfig>,
    pub rate_limiter: Arc<RateLimiter>,
    pub registry: Arc<dyn RegistryRepository>,
    pub series: Arc<dyn SeriesRepository>,
    pub transport: Arc<dyn HttpTransport>,
}

impl IngestionContext {
    pub fn new(
        config: IngestionConfig,
        registry: Arc<dyn RegistryRepository>,
        series: Arc<dyn SeriesRepository>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.max_requests,
            config.rate_limit_window(),
        ));

        Self {
            config: Arc::new(config),
            rate_limiter,
            registry,
            series,
            transport,
        }
    }

    /// Wire the diesel repositories and the reqwest transport
    pub fn from_pools(config: IngestionConfig, pools: &DatabasePools) -> Result<Self, FetchError> {
        let pools_clone = pools.clone();
        let registry = Arc::new(RegistryRepositoryImpl::new(move || {
            pools_clone.get_metadata_conn()
        })) as Arc<dyn RegistryRepository>;

        let pools_clone = pools.clone();
        let series = Arc::new(SeriesRepositoryImpl::new(move || {
            pools_clone.get_timeseries_conn()
        })) as Arc<dyn SeriesRepository>;

        let transport =
            Arc::new(ReqwestTransport::new(config.http_timeout())?) as Arc<dyn HttpTransport>;

        Ok(Self::new(config, registry, series, transport))
    }
}
