//! VaultWatch web server - replication webhook receiver.
//!
//! This binary runs the webhook endpoint that:
//! - Receives signed pub/sub notifications from the storage provider
//! - Verifies topic authorization and message signatures
//! - Tracks attachment replication and story completion
//! - Sends the one-time archive-complete notification

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vaultwatch::notify::{MailgunNotifier, Notifier};
use vaultwatch::store::postgres::connect_pool;
use vaultwatch::store::{PgKv, PgRecordStore};
use vaultwatch::web::{health, sns_webhook, AppState, HttpCertFetcher};
use vaultwatch::{Config, ProcessContext, SignatureVerifier};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        environment = %config.environment,
        topic_allowlist_size = config.topic_allowlist.len(),
        mailgun_configured = config.mailgun_api_key.is_some(),
        "config_loaded"
    );

    if config.topic_allowlist.is_empty() && !config.topic_validation_bypassed() {
        warn!("topic_allowlist_empty_all_messages_rejected");
    }

    // Shared HTTP client for certificate fetches, subscription confirmations
    // and the notification sender
    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .build()
        .context("Failed to build HTTP client")?;

    // Connect storage collaborators
    let pool = connect_pool(&config.database_url, 10)
        .await
        .context("Failed to connect to Postgres")?;
    let records = Arc::new(PgRecordStore::new(pool.clone()));
    let kv = Arc::new(PgKv::new(pool));
    info!("storage_connected");

    let notifier: Arc<dyn Notifier> = Arc::new(MailgunNotifier::new(
        http.clone(),
        config.mailgun_base_url.clone(),
        config.mailgun_domain.clone().unwrap_or_default(),
        config.mailgun_api_key.clone().unwrap_or_default(),
        config.mail_from.clone(),
    ));

    let verifier = SignatureVerifier::new(
        Arc::new(HttpCertFetcher::new(http.clone())),
        Duration::from_secs(config.cert_cache_ttl_secs),
    );

    let ctx = ProcessContext {
        kv,
        records,
        notifier,
    };

    let port = config.port;
    let state = AppState::new(config, verifier, http, ctx);

    // Build the router
    let app = Router::new()
        .route("/health", get(health))
        .route("/webhooks/sns", post(sns_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
