use utoipa::OpenApi;

use crate::api::handlers;
use crate::api::responses::*;
use crate::database::enums::DataType;
use crate::error::ErrorKind;
use crate::models::{RegistryEntry, RunStatus, RunSummary, SymbolOutcome, SymbolStatus};

/// OpenAPI specification
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Market Ingest API",
        version = "0.1.0",
        description = "Scheduled market data ingestion with manual triggers and run summaries",
        license(
            name = "MIT"
        )
    ),
    paths(
        handlers::health_check,
        handlers::list_registry,
        handlers::get_registry_entry,
        handlers::ingest_all,
        handlers::ingest_data_type,
        handlers::ingest_resource,
    ),
    components(
        schemas(
            DataType,
            RegistryEntry,
            RunStatus,
            RunSummary,
            SymbolStatus,
            SymbolOutcome,
            ErrorKind,
            ErrorResponse,
            HealthResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Registry", description = "Registered data sources"),
        (name = "Ingestion", description = "Manual ingestion triggers"),
    )
)]
pub struct ApiDoc;
