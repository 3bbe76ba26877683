//! kiosk-worker entry point.
//!
//! Installs and activates the offline cache, starts messaging, then serves
//! the kiosk pages through the worker until ctrl-c. A failed install falls
//! back to the shell partition a previous run of this version left behind.
//! Logs are JSON on stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kiosk_client::{CacheWorker, ContentClient, FetchClient, FetchConfig, MessagingClient};
use kiosk_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;
use url::Url;

mod error;
mod handler;

/// Poll interval while waiting for the broker before announcing `online`.
const ONLINE_POLL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(origin = %config.origin, version = %config.cache_version, "starting kiosk worker");

    let db = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(&config))?);

    let worker = CacheWorker::new(&config, db, network)?;
    if let Err(err) = worker.install().await {
        tracing::warn!(error = %err, "install failed, looking for an existing shell partition");
        worker
            .resume_from_shell()
            .await
            .with_context(|| format!("no usable shell partition after failed install: {err}"))?;
    }
    worker.activate().await?;

    let messaging = match MessagingClient::start(config.mqtt.clone()) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "messaging unavailable, continuing without it");
            Arc::new(MessagingClient::disabled(config.mqtt.clone()))
        }
    };
    announce_online(Arc::clone(&messaging));

    let state = Arc::new(handler::AppState {
        worker,
        content: ContentClient::from_app_config(&config)?,
        messaging: Arc::clone(&messaging),
        origin: Url::parse(&config.origin)?,
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "listening");

    axum::serve(listener, handler::create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    messaging.publish_status("offline");
    messaging.disconnect();
    tracing::info!("kiosk worker stopped");
    Ok(())
}

/// Publish `online` once the broker session is up.
fn announce_online(messaging: Arc<MessagingClient>) {
    tokio::spawn(async move {
        loop {
            if messaging.is_connected() {
                messaging.publish_status("online");
                return;
            }
            if messaging.is_closed() || !messaging.state().is_live() {
                return;
            }
            tokio::time::sleep(ONLINE_POLL).await;
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
