mod api;
mod bootstrap;
mod health;
mod notify_http;
mod observe;

use std::time::Duration;

use anyhow::Result;

use alur_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use alur_core::config::LogFormat::*;
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
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let router = api::router(api::ApiState {
        service: app.service.clone(),
        queries: app.queries.clone(),
    });

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        request_id = "unknown",
        bind_address = %address,
        "alur-server started"
    );

    let server = axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown());
    tokio::select! {
        result = server => { result?; }
        _ = forced_shutdown(app.config.server.graceful_shutdown_secs) => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                request_id = "unknown",
                "drain window elapsed with requests still in flight"
            );
        }
    }

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        request_id = "unknown",
        "alur-server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        request_id = "unknown",
        "shutdown signal received, draining connections"
    );
}

/// Hard stop if graceful drain outlives the configured window.
async fn forced_shutdown(graceful_shutdown_secs: u64) {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(Duration::from_secs(graceful_shutdown_secs)).await;
}
