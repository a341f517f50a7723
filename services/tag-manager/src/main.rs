//! securetag Tag Manager
//!
//! Receives `v1.compute.instances.insert` audit events and binds secure tags
//! to the newly created VMs.
//!
//! This service:
//! - Accepts audit log entries pushed directly or via Pub/Sub
//! - Derives the desired tag values from each VM's network tags and template
//! - Creates tag bindings through the VM zone's Resource Manager endpoint

use std::sync::Arc;

use anyhow::Result;
use securetag_manager::{
    api, auth, binder::TagBinder, config, crm::HttpZoneClientFactory,
    driver::ReconciliationDriver, state::AppState, zones::ZoneClientCache,
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to SECURETAG_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting securetag tag manager");
    info!(
        listen_addr = %config.listen_addr,
        endpoint_template = %config.endpoint_template,
        network_tag_prefix = %config.network_tag_prefix,
        template_rules = config.template_tags.len(),
        static_token = config.access_token.is_some(),
        "Configuration loaded"
    );

    let token_http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;
    let token_source = auth::token_source(
        token_http,
        config.access_token.clone(),
        &config.metadata_token_url,
    );

    let factory = HttpZoneClientFactory::new(
        config.endpoint_template.clone(),
        token_source,
        config.request_timeout,
    );
    let zones = Arc::new(ZoneClientCache::new(Arc::new(factory)));
    let driver = ReconciliationDriver::new(
        Arc::new(config.tag_resolver()),
        TagBinder::new(Arc::clone(&zones)),
    );

    let app = api::create_router(AppState::new(driver, zones));

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    match server_handle.await {
        Ok(Ok(())) => info!("Server exited normally"),
        Ok(Err(e)) => error!(error = %e, "Server error"),
        Err(e) => error!(error = %e, "Server task panicked"),
    }

    info!("Tag manager shutdown complete");
    Ok(())
}
