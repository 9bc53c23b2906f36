use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

mod api;
mod config;
mod controller;
mod db;
mod domain;
mod error;
mod oauth;
mod platform;
mod power_ranking;
mod ranking_csv;
mod refresh;

use api::AppState;
use config::Config;
use controller::Controller;
use db::Database;
use oauth::{OAuthConfig, OAuthManager, SystemClock};
use platform::{SleeperClient, YahooClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open database
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    if !config.yahoo_enabled() {
        warn!("Yahoo OAuth is not configured; yahoo leagues cannot be added");
    }
    let oauth = Arc::new(OAuthManager::new(
        OAuthConfig {
            client_id: config.yahoo_client_id.clone().unwrap_or_default(),
            client_secret: config.yahoo_client_secret.clone().unwrap_or_default(),
            redirect_url: config.yahoo_redirect_url.clone().unwrap_or_default(),
            auth_base_url: config.yahoo_auth_url.trim_end_matches('/').to_string(),
        },
        db.clone(),
        Arc::new(SystemClock),
    )?);

    let sleeper = SleeperClient::new(&config.sleeper_api_url)?;
    let yahoo = YahooClient::new(&config.yahoo_api_url, db.clone(), oauth.clone())?;
    let controller = Controller::new(db, sleeper, yahoo, oauth);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresh_task = refresh::spawn_player_refresh(
        controller.clone(),
        Duration::from_secs(config.player_refresh_interval_secs),
        Duration::from_secs(config.player_refresh_timeout_secs),
        shutdown_rx.clone(),
    );

    let app = api::router(AppState {
        controller,
        request_timeout: Duration::from_secs(config.request_timeout_secs),
        admin_timeout: Duration::from_secs(config.admin_timeout_secs),
    });
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let mut server_shutdown = shutdown_rx;
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupt received, shutting down");
        }
        exited = &mut server => {
            error!("API server exited unexpectedly: {:?}", exited);
            anyhow::bail!("API server stopped");
        }
    }

    let _ = shutdown_tx.send(true);
    let grace = Duration::from_secs(config.shutdown_grace_secs);
    let drained = tokio::time::timeout(grace, async {
        let (server, refresh) = tokio::join!(server, refresh_task);
        if let Ok(Err(e)) = server {
            warn!("API server error during shutdown: {}", e);
        }
        if let Err(e) = refresh {
            warn!("Refresh task ended abnormally: {}", e);
        }
    })
    .await;

    if drained.is_err() {
        error!("Shutdown did not complete within {}s", grace.as_secs());
        std::process::exit(1);
    }
    info!("Shutdown complete");
    Ok(())
}
