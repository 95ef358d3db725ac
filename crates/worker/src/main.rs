use std::sync::Arc;

use anyhow::Context;
use gen3d_db::store::{PgTaskStore, TaskStore};
use gen3d_orchestrator::{OrchestratorConfig, TaskPoller, TaskService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gen3d_worker=debug,gen3d_orchestrator=debug,gen3d_providers=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = OrchestratorConfig::from_env().context("Invalid configuration")?;

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = gen3d_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    gen3d_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    gen3d_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Providers ---
    let registry = config
        .build_registry()
        .context("Failed to build provider adapters")?;
    if registry.is_empty() {
        tracing::warn!("No provider credentials configured, pending tasks will not advance");
    } else {
        tracing::info!(providers = ?registry.names(), "Provider adapters registered");
    }

    // --- Orchestration ---
    let store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(pool));
    let service = Arc::new(
        TaskService::new(store, Arc::new(registry))
            .with_query_timeout(config.query_timeout)
            .with_download_timeout(config.download_timeout),
    );
    let poller = TaskPoller::new(Arc::clone(&service), config.poller.clone());

    let pending = service.pending_count().await?;
    tracing::info!(pending, "Starting task poller");
    if !poller.start().await {
        anyhow::bail!("Task poller was already running");
    }

    shutdown_signal().await;

    if !poller.stop().await {
        tracing::warn!("Task poller had already exited");
    }
    tracing::info!("Worker stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
