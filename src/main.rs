use market_ingest::database::{establish_connection_pools, run_pending_migrations};
use market_ingest::jobs::IngestionJob;
use market_ingest::{create_router, AppState, Dispatcher, IngestionConfig, IngestionContext};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_ingest=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("❌ {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = IngestionConfig::from_env()?;

    tracing::info!("🗄️  Initializing PostgreSQL connections...");
    let pools = establish_connection_pools(
        &config.database_url,
        &config.timeseries_database_url,
        config.db_pool_max_size,
    )?;

    let applied = run_pending_migrations(&pools)?;
    tracing::info!("✅ Database ready ({} migrations applied)", applied);

    let bind_addr = config.bind_addr.clone();
    let scheduler_enabled = config.scheduler_enabled;

    let ctx = IngestionContext::from_pools(config, &pools)?;
    tracing::info!(
        "📡 Provider limit: {} requests per {:?}, concurrency {}",
        ctx.rate_limiter.max_requests(),
        ctx.rate_limiter.window(),
        ctx.config.max_concurrency
    );

    let dispatcher = Arc::new(Dispatcher::new(ctx));
    let jobs = vec![
        IngestionJob::market_data(dispatcher.clone()),
        IngestionJob::news(dispatcher.clone()),
    ];

    if scheduler_enabled {
        initialize_cron_scheduler(&jobs).await;
    } else {
        tracing::info!("⏰ Scheduler disabled, manual triggers only");
    }

    let app = create_router(AppState::new(dispatcher, jobs));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("🚀 Market ingest server running on http://{}", bind_addr);
    tracing::info!("📊 Health check: http://{}/api/v1/health", bind_addr);
    tracing::info!("📚 Swagger UI: http://{}/swagger-ui", bind_addr);
    tracing::info!("🔧 Manual trigger: POST http://{}/api/v1/ingest/{{data_type}}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize cron scheduler for the ingestion jobs
async fn initialize_cron_scheduler(jobs: &[IngestionJob]) {
    use tokio_cron_scheduler::JobScheduler;

    tracing::info!("⏰ Initializing cron scheduler...");

    let scheduler = match JobScheduler::new().await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            tracing::error!("❌ Failed to create cron scheduler: {}", e);
            return;
        }
    };

    for job in jobs {
        let label = job.scope().label();
        if let Err(e) = job.clone().register(&scheduler).await {
            tracing::error!("❌ Failed to register {} job: {}", label, e);
            return;
        }
    }

    if let Err(e) = scheduler.start().await {
        tracing::error!("❌ Failed to start cron scheduler: {}", e);
        return;
    }

    tracing::info!("✅ Cron scheduler started successfully");
    for job in jobs {
        tracing::info!("   • {}: {}", job.scope().label(), job.schedule());
    }

    // Keep scheduler alive for the life of the process
    std::mem::forget(scheduler);
}
