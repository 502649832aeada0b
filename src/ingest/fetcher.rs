use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::error::FetchError;
use crate::ingest::endpoint::{params_for, redact, render};
use crate::ingest::parser::{parse_records, top_level_keys};
use crate::ingest::rate_limiter::RateLimiter;
use crate::ingest::retry::RetryPolicy;
use crate::ingest::transport::{HttpTransport, ProviderResponse};
use crate::models::{FetchBatch, Instrument, RegistryEntry};

/// Provider adapter: renders the endpoint, calls it under the rate limiter,
/// classifies the response and parses it per data type
pub struct SourceFetcher {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    api_key: String,
}

impl SourceFetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry,
            api_key: api_key.into(),
        }
    }

    /// Fetch records for one instrument at or after `since`
    ///
    /// Rate-limited and transient failures are retried with backoff up to the
    /// policy's attempt budget; permanent failures return immediately.
    pub async fn fetch(
        &self,
        entry: &RegistryEntry,
        instrument: &Instrument,
        since: DateTime<Utc>,
    ) -> Result<FetchBatch, FetchError> {
        let params = params_for(entry, instrument, &self.api_key)?;
        let url = render(&entry.endpoint_template, &params)?;
        let safe_url = redact(&url, &self.api_key);

        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let permit = self.limiter.acquire().await;
            if !permit.waited.is_zero() {
                tracing::debug!(
                    "⏳ {} waited {:?} for a rate limit slot",
                    instrument.code,
                    permit.waited
                );
            }

            tracing::debug!("Calling provider for {} (attempt {}): {}", instrument.code, attempt, safe_url);

            let outcome = match self.transport.get(&url).await {
                Ok(response) => classify(response),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(payload) => {
                    let (records, already_stored) =
                        parse_records(entry, instrument, &payload, since)?;
                    if records.is_empty() {
                        tracing::debug!(
                            "No new records for {} (response keys: {:?})",
                            instrument.code,
                            top_level_keys(&payload)
                        );
                    }

                    return Ok(FetchBatch {
                        symbol: instrument.code.clone(),
                        data_type: entry.data_type,
                        records,
                        already_stored,
                        attempts: attempt,
                    });
                }
                Err(err) if err.is_retryable() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        "⚠️  {} attempt {}/{} failed: {}; retrying in {:?}",
                        instrument.code,
                        attempt,
                        self.retry.max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_retryable() => {
                    return Err(FetchError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Map a provider response to a JSON payload or a fetch error category
pub fn classify(response: ProviderResponse) -> Result<Value, FetchError> {
    match response.status {
        429 => return Err(FetchError::RateLimited("HTTP 429".to_string())),
        500..=599 => return Err(FetchError::Transient(format!("HTTP {}", response.status))),
        200..=299 => {}
        status => return Err(FetchError::Permanent(format!("HTTP {}", status))),
    }

    let payload: Value = serde_json::from_str(&response.body)
        .map_err(|e| FetchError::Permanent(format!("malformed response: {}", e)))?;

    if let Some(message) = payload.get("Error Message") {
        return Err(FetchError::Permanent(message_text(message)));
    }

    // Provider signals throttling with a 200 and a note instead of data
    for key in ["Note", "Information"] {
        if let Some(message) = payload.get(key) {
            return Err(FetchError::RateLimited(message_text(message)));
        }
    }

    Ok(payload)
}

fn message_text(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}
