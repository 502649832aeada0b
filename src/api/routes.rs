use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::*;
use super::openapi::ApiDoc;

/// Create the API router with Swagger UI
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/v1/health", get(health_check))
        // Registry endpoints
        .route("/api/v1/registry", get(list_registry))
        .route("/api/v1/registry/:resource_id", get(get_registry_entry))
        .route("/api/v1/registry/:resource_id/ingest", post(ingest_resource))
        // Manual triggers
        .route("/api/v1/ingest", post(ingest_all))
        .route("/api/v1/ingest/:data_type", post(ingest_data_type))
        .with_state(state)
}
