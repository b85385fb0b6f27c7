mod bootstrap;
mod health;
mod routes;
mod sweeper;

use std::time::Duration;

use anyhow::{Context, Result};
use safepath_core::config::{AppConfig, LoadOptions};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn init_logging(config: &AppConfig) {
    use safepath_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging comes from the loaded config, so load it before anything else.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    let server = &app.config.server;
    let address = format!("{}:{}", server.bind_address, server.port);
    let listener =
        TcpListener::bind(&address).await.with_context(|| format!("binding {address}"))?;

    let sweeper = sweeper::spawn(
        app.agents.clone(),
        Duration::from_secs(app.config.agent.idle_eviction_secs),
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let router = routes::router(app.agents.clone());
    let serving = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        bind_address = %address,
        default_agent = app.agents.default_key(),
        "safepath-server started"
    );

    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        thread_id = "unknown",
        grace_secs = server.graceful_shutdown_secs,
        "safepath-server stopping"
    );

    sweeper.abort();
    let _ = stop_tx.send(());
    let grace = Duration::from_secs(server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, serving).await {
        Ok(joined) => joined.context("server task panicked")?.context("server error")?,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            thread_id = "unknown",
            "in-flight requests did not finish within the grace period"
        ),
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
