mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use arbiter_common::config::GraderConfig;
use arbiter_engine::{FileCatalog, Grader};
use axum::Router;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

pub struct AppState {
    pub grader: Grader,
    pub catalog: FileCatalog,
    /// Submission record store; grading works without it
    pub redis: Option<ConnectionManager>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Arbiter API booting...");

    let config = GraderConfig::from_env().context("Invalid grader configuration")?;

    if !config.backend.isolates_host() {
        warn!(
            backend = ?config.backend,
            "Submissions can reach the host filesystem and network; set ARBITER_BACKEND=docker for untrusted code"
        );
    }

    let catalog = FileCatalog::load(&config.problems_path).with_context(|| {
        format!("Failed to load problem catalog from {}", config.problems_path.display())
    })?;
    info!(problems = catalog.len(), "Loaded problem catalog");

    let grader = Grader::from_config(&config)?;
    info!(languages = ?grader.supported_languages(), "Grader ready");

    let redis = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).context("Failed to create Redis client")?;
            let conn = ConnectionManager::new(client)
                .await
                .context("Failed to connect to Redis")?;
            info!("Connected to Redis: {}", url);
            Some(conn)
        }
        None => {
            warn!("REDIS_URL not set, submission records will not be stored");
            None
        }
    };

    let state = Arc::new(AppState {
        grader,
        catalog,
        redis,
    });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    // Start server
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("HTTP server listening on {}", config.bind_addr);
    info!("Ready to grade submissions");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Arbiter API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    warn!("Received shutdown signal, finishing in-flight submissions...");
}
