//! Ferry CI server.

use anyhow::Context;
use clap::Parser;
use ferry_api::services::ProviderSources;
use ferry_api::{AppState, routes};
use ferry_config::{SystemConfig, YamlParser};
use ferry_core::Store;
use ferry_db::{MemoryStore, PgStore, create_pool, run_migrations};
use ferry_executor::DockerRunner;
use ferry_scheduler::{DispatchOptions, Dispatcher, WorkerPool};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ferry-server")]
#[command(about = "Ferry CI build server", long_about = None)]
struct Args {
    /// Path to the KDL configuration file
    #[arg(long, env = "FERRY_CONFIG", default_value = "ferry.kdl")]
    config: PathBuf,

    /// Number of concurrent build workers
    #[arg(long, env = "FERRY_WORKERS")]
    workers: Option<usize>,

    /// Address to listen on
    #[arg(long, env = "FERRY_LISTEN")]
    listen: Option<String>,

    /// PostgreSQL connection URL; builds are kept in memory when unset
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

fn load_config(args: Args) -> anyhow::Result<SystemConfig> {
    let mut config = if args.config.exists() {
        SystemConfig::load(&args.config)
            .with_context(|| format!("Failed to load {}", args.config.display()))?
    } else {
        info!(path = %args.config.display(), "No configuration file, using defaults");
        SystemConfig::default()
    };

    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if args.database_url.is_some() {
        config.database_url = args.database_url;
    }

    Ok(config)
}

async fn open_store(database_url: Option<&str>) -> anyhow::Result<Arc<dyn Store>> {
    let Some(url) = database_url else {
        warn!("No database configured, records are kept in memory only");
        return Ok(Arc::new(MemoryStore::new()));
    };

    info!("Connecting to database...");
    let pool = create_pool(url).await?;
    run_migrations(&pool).await?;
    info!("Database connected");

    Ok(Arc::new(PgStore::new(pool)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config(Args::parse())?;

    let store = open_store(config.database_url.as_deref()).await?;

    let runner = DockerRunner::new(store.clone()).context("Failed to connect to Docker")?;
    if !runner.ping().await {
        warn!("Docker daemon is not answering; builds will fail until it is");
    }

    let pool = WorkerPool::start(config.workers, Arc::new(runner))?;
    let dispatcher = Dispatcher::new(
        store,
        Arc::new(ProviderSources::default()),
        Arc::new(YamlParser),
        pool,
    )
    .with_options(DispatchOptions {
        config_path: config.config_path.clone(),
        wait_timeout: config.wait_timeout,
    });

    let mut state = AppState::new(Arc::new(dispatcher));
    if let Some(secret) = config.webhook_secret.as_deref() {
        state = state.with_webhook_secret(secret);
    }

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    info!(addr = %config.listen, workers = config.workers, "Starting server");
    let listener = TcpListener::bind(&config.listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
