//! Entry point for the document-processing broker's HTTP surface, grounded
//! on `fourthplaces-mntogether`'s `server/main.rs`: load config, init
//! tracing, connect and migrate, build the router, serve.

mod app;
mod auth;
mod blobs;
mod config;
mod dto;
mod envelope;
mod error;
mod routes;
mod state;
mod validators;

use anyhow::Context;
use broker_core::Store;
use broker_postgres::PgStore;
use config::Config;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,sqlx=warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    config.create_dirs().context("failed to create JOBS_DIR/RESULTS_DIR")?;

    tracing::info!(host = %config.host, port = config.port, "starting document-processing broker");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let store = PgStore::new(pool);
    store.migrate().await.context("failed to run database migrations")?;

    spawn_periodic_sweeper(&store, &config);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind to address")?;
    tracing::info!(%addr, "listening");

    let app = app::build_app(AppState::new(store, config));
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

/// Optional addition beyond the lazy per-claim sweep (spec §5, §9): if
/// `SWEEPER_INTERVAL_SECONDS` is configured, runs the same sweep on a timer
/// so a stalled queue becomes visible without waiting for the next claim.
/// Purely an optimization — no operation here depends on this task running.
fn spawn_periodic_sweeper(store: &PgStore, config: &Config) {
    let Some(interval_seconds) = config.sweeper_interval_seconds else {
        return;
    };
    let store = store.clone();
    let policy = config.sweeper_policy();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_seconds));
        loop {
            ticker.tick().await;
            if let Err(error) = store.sweep(&policy).await {
                tracing::warn!(%error, "periodic sweep failed");
            }
        }
    });
}
