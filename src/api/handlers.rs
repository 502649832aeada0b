use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::database::enums::DataType;
use crate::error::ConfigError;
use crate::ingest::Dispatcher;
use crate::jobs::{IngestionJob, RunGuard};
use crate::models::{RegistryEntry, RunStatus, RunSummary};

use super::responses::*;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Scheduled jobs; manual triggers take their running guards
    pub jobs: Vec<IngestionJob>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, jobs: Vec<IngestionJob>) -> Self {
        Self { dispatcher, jobs }
    }
}

/// Convert ConfigError to HTTP response
impl IntoResponse for ConfigError {
    fn into_response(self) -> Response {
        let status = match &self {
            ConfigError::MissingRegistryEntry(_) | ConfigError::MissingResource(_) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        error_response(status, self.to_string())
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    let body = Json(ErrorResponse {
        error: status.to_string(),
        message,
    });

    (status, body).into_response()
}

/// Claim every job whose scope covers one of `data_types`
///
/// Fails with 409 if one of them is already running. Guards claimed before
/// the conflict are released on return.
fn claim_jobs(state: &AppState, data_types: &[DataType]) -> Result<Vec<RunGuard>, Response> {
    let mut guards = Vec::new();

    for job in state
        .jobs
        .iter()
        .filter(|job| data_types.iter().any(|t| job.scope().includes(*t)))
    {
        match job.try_start() {
            Some(guard) => guards.push(guard),
            None => {
                tracing::warn!(
                    "⏭️  {} ingestion already running, rejecting manual trigger",
                    job.scope().label()
                );
                return Err(error_response(
                    StatusCode::CONFLICT,
                    format!("{} ingestion is already running", job.scope().label()),
                ));
            }
        }
    }

    Ok(guards)
}

/// HTTP status for a finished run
fn run_status_code(summary: &RunSummary) -> StatusCode {
    match summary.status {
        RunStatus::Success => StatusCode::OK,
        RunStatus::Partial => StatusCode::MULTI_STATUS,
        RunStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = serde_json::to_value(state.dispatcher.context().config.as_ref())
        .unwrap_or(serde_json::Value::Null);

    let running_jobs = state
        .jobs
        .iter()
        .filter(|job| job.is_running())
        .map(|job| job.scope().label().to_string())
        .collect();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        running_jobs,
        config,
    })
}

/// List active registry entries
#[utoipa::path(
    get,
    path = "/api/v1/registry",
    tag = "Registry",
    responses(
        (status = 200, description = "Active registry entries", body = Vec<RegistryEntry>),
        (status = 500, description = "Registry unavailable", body = ErrorResponse)
    )
)]
pub async fn list_registry(
    State(state): State<AppState>,
) -> Result<Json<Vec<RegistryEntry>>, ConfigError> {
    let registry = Arc::clone(&state.dispatcher.context().registry);

    tokio::task::spawn_blocking(move || registry.list_active())
        .await
        .map_err(|e| ConfigError::RegistryUnavailable(e.to_string()))?
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to list registry: {}", e);
            e
        })
}

/// Get one registry entry by id
#[utoipa::path(
    get,
    path = "/api/v1/registry/{resource_id}",
    tag = "Registry",
    params(
        ("resource_id" = i32, Path, description = "Registry resource id")
    ),
    responses(
        (status = 200, description = "Registry entry", body = RegistryEntry),
        (status = 404, description = "No active entry with this id", body = ErrorResponse)
    )
)]
pub async fn get_registry_entry(
    State(state): State<AppState>,
    Path(resource_id): Path<i32>,
) -> Result<Json<RegistryEntry>, ConfigError> {
    let registry = Arc::clone(&state.dispatcher.context().registry);

    tokio::task::spawn_blocking(move || registry.find_by_id(resource_id))
        .await
        .map_err(|e| ConfigError::RegistryUnavailable(e.to_string()))?
        .map(Json)
}

/// Run every active registry entry
#[utoipa::path(
    post,
    path = "/api/v1/ingest",
    tag = "Ingestion",
    responses(
        (status = 200, description = "One summary per active entry", body = Vec<RunSummary>),
        (status = 409, description = "A scheduled run is in progress", body = ErrorResponse),
        (status = 500, description = "Registry unavailable", body = ErrorResponse)
    )
)]
pub async fn ingest_all(State(state): State<AppState>) -> Response {
    let _guards = match claim_jobs(&state, &DataType::all()) {
        Ok(guards) => guards,
        Err(conflict) => return conflict,
    };

    tracing::info!("Manual ingestion triggered for all active entries");

    match state.dispatcher.run_all().await {
        Ok(summaries) => Json(summaries).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Run one data type
#[utoipa::path(
    post,
    path = "/api/v1/ingest/{data_type}",
    tag = "Ingestion",
    params(
        ("data_type" = String, Path, description = "Data type, e.g. fx_daily or news_sentiment")
    ),
    responses(
        (status = 200, description = "Every symbol succeeded", body = RunSummary),
        (status = 207, description = "Some symbols failed or were skipped", body = RunSummary),
        (status = 400, description = "Unknown data type", body = ErrorResponse),
        (status = 409, description = "A run of this scope is in progress", body = ErrorResponse),
        (status = 500, description = "Registry or configuration failure", body = RunSummary)
    )
)]
pub async fn ingest_data_type(
    State(state): State<AppState>,
    Path(data_type): Path<String>,
) -> Response {
    let Some(data_type) = DataType::from_str(&data_type) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Unknown data type: {}", data_type),
        );
    };

    let _guards = match claim_jobs(&state, &[data_type]) {
        Ok(guards) => guards,
        Err(conflict) => return conflict,
    };

    tracing::info!("Manual ingestion triggered for {}", data_type);

    let summary = state.dispatcher.run(data_type).await;
    (run_status_code(&summary), Json(summary)).into_response()
}

/// Run one registry entry by id
#[utoipa::path(
    post,
    path = "/api/v1/registry/{resource_id}/ingest",
    tag = "Ingestion",
    params(
        ("resource_id" = i32, Path, description = "Registry resource id")
    ),
    responses(
        (status = 200, description = "Every symbol succeeded", body = RunSummary),
        (status = 207, description = "Some symbols failed or were skipped", body = RunSummary),
        (status = 404, description = "No active entry with this id", body = ErrorResponse),
        (status = 409, description = "A run of this scope is in progress", body = ErrorResponse),
        (status = 500, description = "Configuration failure", body = RunSummary)
    )
)]
pub async fn ingest_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<i32>,
) -> Result<Response, ConfigError> {
    let registry = Arc::clone(&state.dispatcher.context().registry);

    let entry = tokio::task::spawn_blocking(move || registry.find_by_id(resource_id))
        .await
        .map_err(|e| ConfigError::RegistryUnavailable(e.to_string()))??;

    let _guards = match claim_jobs(&state, &[entry.data_type]) {
        Ok(guards) => guards,
        Err(conflict) => return Ok(conflict),
    };

    tracing::info!("Manual ingestion triggered for {}", entry.resource_name);

    let summary = state.dispatcher.run_entry(entry).await;
    Ok((run_status_code(&summary), Json(summary)).into_response())
}
