use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Ingestion engine configuration
///
/// Read once at startup from the environment (optionally seeded from `.env`).
/// Every field except the two connection URLs and the API key has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Registry database URL
    #[serde(skip_serializing, default)]
    pub database_url: String,

    /// Target series database URL (defaults to `database_url`)
    #[serde(skip_serializing, default)]
    pub timeseries_database_url: String,

    #[serde(default = "default_pool_size")]
    pub db_pool_max_size: u32,

    /// Provider API key, substituted into `{apikey}`
    #[serde(skip_serializing, default)]
    pub api_key: String,

    /// Symbols processed concurrently within one run
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Backward overlap applied to the stored watermark
    #[serde(default = "default_overlap_minutes")]
    pub watermark_overlap_minutes: i64,

    /// Resume point for a symbol with no stored rows
    #[serde(default = "default_epoch")]
    pub default_epoch: DateTime<Utc>,

    /// Overall deadline for one run
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Per-request provider timeout
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Cron expression for market data kinds (sec min hour dom mon dow)
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Cron expression for news sentiment
    #[serde(default = "default_news_schedule")]
    pub news_schedule: String,

    #[serde(default = "default_true")]
    pub scheduler_enabled: bool,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

/// Provider rate limit (requests per rolling window)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_requests")]
    pub max_requests: usize,

    #[serde(default = "default_rate_limit_window")]
    pub window_secs: u64,
}

/// Retry budget for rate-limited and transient fetch failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay")]
    pub max_delay_ms: u64,

    /// Upper bound of the random delay added to each backoff
    #[serde(default = "default_retry_jitter")]
    pub jitter_ms: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            timeseries_database_url: String::new(),
            db_pool_max_size: default_pool_size(),
            api_key: String::new(),
            max_concurrency: default_max_concurrency(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            watermark_overlap_minutes: default_overlap_minutes(),
            default_epoch: default_epoch(),
            run_timeout_secs: default_run_timeout(),
            http_timeout_secs: default_http_timeout(),
            schedule: default_schedule(),
            news_schedule: default_news_schedule(),
            scheduler_enabled: true,
            bind_addr: default_bind_addr(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_rate_limit_requests(),
            window_secs: default_rate_limit_window(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            base_delay_ms: default_retry_base_delay(),
            max_delay_ms: default_retry_max_delay(),
            jitter_ms: default_retry_jitter(),
        }
    }
}

impl IngestionConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = required(&lookup, "DATABASE_URL")?;
        let timeseries_database_url =
            optional(&lookup, "TIMESERIES_DATABASE_URL").unwrap_or_else(|| database_url.clone());

        let default_epoch = match optional(&lookup, "INGEST_DEFAULT_EPOCH") {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| invalid("INGEST_DEFAULT_EPOCH", &raw))?,
            None => defaults.default_epoch,
        };

        let config = Self {
            database_url,
            timeseries_database_url,
            db_pool_max_size: parsed(&lookup, "DB_POOL_MAX_SIZE", defaults.db_pool_max_size)?,
            api_key: required(&lookup, "ALPHAVANTAGE_API_KEY")?,
            max_concurrency: parsed(&lookup, "INGEST_MAX_CONCURRENCY", defaults.max_concurrency)?,
            rate_limit: RateLimitConfig {
                max_requests: parsed(
                    &lookup,
                    "INGEST_RATE_LIMIT_REQUESTS",
                    defaults.rate_limit.max_requests,
                )?,
                window_secs: parsed(
                    &lookup,
                    "INGEST_RATE_LIMIT_WINDOW_SECS",
                    defaults.rate_limit.window_secs,
                )?,
            },
            retry: RetryConfig {
                max_attempts: parsed(
                    &lookup,
                    "INGEST_RETRY_MAX_ATTEMPTS",
                    defaults.retry.max_attempts,
                )?,
                base_delay_ms: parsed(
                    &lookup,
                    "INGEST_RETRY_BASE_DELAY_MS",
                    defaults.retry.base_delay_ms,
                )?,
                max_delay_ms: parsed(
                    &lookup,
                    "INGEST_RETRY_MAX_DELAY_MS",
                    defaults.retry.max_delay_ms,
                )?,
                jitter_ms: parsed(&lookup, "INGEST_RETRY_JITTER_MS", defaults.retry.jitter_ms)?,
            },
            watermark_overlap_minutes: parsed(
                &lookup,
                "INGEST_WATERMARK_OVERLAP_MINUTES",
                defaults.watermark_overlap_minutes,
            )?,
            default_epoch,
            run_timeout_secs: parsed(&lookup, "INGEST_RUN_TIMEOUT_SECS", defaults.run_timeout_secs)?,
            http_timeout_secs: parsed(
                &lookup,
                "INGEST_HTTP_TIMEOUT_SECS",
                defaults.http_timeout_secs,
            )?,
            schedule: optional(&lookup, "INGEST_SCHEDULE").unwrap_or(defaults.schedule),
            news_schedule: optional(&lookup, "INGEST_NEWS_SCHEDULE")
                .unwrap_or(defaults.news_schedule),
            scheduler_enabled: parsed(
                &lookup,
                "INGEST_SCHEDULER_ENABLED",
                defaults.scheduler_enabled,
            )?,
            bind_addr: optional(&lookup, "BIND_ADDR").unwrap_or(defaults.bind_addr),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("DB_POOL_MAX_SIZE", self.db_pool_max_size as u64),
            ("INGEST_MAX_CONCURRENCY", self.max_concurrency as u64),
            ("INGEST_RATE_LIMIT_REQUESTS", self.rate_limit.max_requests as u64),
            ("INGEST_RATE_LIMIT_WINDOW_SECS", self.rate_limit.window_secs),
            ("INGEST_RETRY_MAX_ATTEMPTS", self.retry.max_attempts as u64),
            ("INGEST_RUN_TIMEOUT_SECS", self.run_timeout_secs),
            ("INGEST_HTTP_TIMEOUT_SECS", self.http_timeout_secs),
        ];

        for (key, value) in positive {
            if value == 0 {
                return Err(invalid(key, "0"));
            }
        }

        if self.watermark_overlap_minutes < 0 {
            return Err(invalid(
                "INGEST_WATERMARK_OVERLAP_MINUTES",
                &self.watermark_overlap_minutes.to_string(),
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(invalid(
                "INGEST_RETRY_MAX_DELAY_MS",
                &self.retry.max_delay_ms.to_string(),
            ));
        }

        Ok(())
    }

    pub fn watermark_overlap(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.watermark_overlap_minutes)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit.window_secs)
    }
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match optional(lookup, key) {
        Some(raw) => raw.parse::<T>().map_err(|_| invalid(key, &raw)),
        None => Ok(default),
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    }
}

// Default value functions for serde
fn default_pool_size() -> u32 {
    10
}

fn default_max_concurrency() -> usize {
    4
}

fn default_rate_limit_requests() -> usize {
    5
}

fn default_rate_limit_window() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    1000
}

fn default_retry_max_delay() -> u64 {
    30000
}

fn default_retry_jitter() -> u64 {
    250
}

fn default_overlap_minutes() -> i64 {
    60
}

fn default_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn default_run_timeout() -> u64 {
    240
}

fn default_http_timeout() -> u64 {
    15
}

fn default_schedule() -> String {
    "0 */5 * * * *".to_string()
}

fn default_news_schedule() -> String {
    "0 */3 * * * *".to_string()
}

fn default_true() -> bool {
    true
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgres://localhost/registry"),
        ("ALPHAVANTAGE_API_KEY", "demo"),
    ];

    #[test]
    fn test_defaults_apply() {
        let config = IngestionConfig::from_lookup(lookup(&BASE)).unwrap();

        assert_eq!(config.timeseries_database_url, "postgres://localhost/registry");
        assert_eq!(config.db_pool_max_size, 10);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.watermark_overlap(), ChronoDuration::minutes(60));
        assert_eq!(config.default_epoch.to_rfc3339(), "1900-01-01T00:00:00+00:00");
        assert_eq!(config.schedule, "0 */5 * * * *");
        assert_eq!(config.news_schedule, "0 */3 * * * *");
        assert!(config.scheduler_enabled);
    }

    #[test]
    fn test_overrides() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("TIMESERIES_DATABASE_URL", "postgres://localhost/series"),
            ("INGEST_MAX_CONCURRENCY", "16"),
            ("INGEST_RATE_LIMIT_REQUESTS", "75"),
            ("INGEST_DEFAULT_EPOCH", "2020-01-01T00:00:00Z"),
            ("INGEST_SCHEDULER_ENABLED", "false"),
        ]);

        let config = IngestionConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.timeseries_database_url, "postgres://localhost/series");
        assert_eq!(config.max_concurrency, 16);
        assert_eq!(config.rate_limit.max_requests, 75);
        assert_eq!(config.default_epoch.to_rfc3339(), "2020-01-01T00:00:00+00:00");
        assert!(!config.scheduler_enabled);
    }

    #[test]
    fn test_missing_required_values() {
        let err = IngestionConfig::from_lookup(lookup(&[("DATABASE_URL", "x")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingEnv("ALPHAVANTAGE_API_KEY".to_string()));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("INGEST_MAX_CONCURRENCY", "many"));
        assert!(matches!(
            IngestionConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidEnv { .. })
        ));

        let mut pairs = BASE.to_vec();
        pairs.push(("INGEST_RATE_LIMIT_REQUESTS", "0"));
        assert!(IngestionConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let config = IngestionConfig::from_lookup(lookup(&BASE)).unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("api_key").is_none());
        assert!(json.get("database_url").is_none());
        assert_eq!(json["max_concurrency"], 4);
    }
}
