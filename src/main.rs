//! protect-bridge daemon
//!
//! Main entry point: wires the store, NVR client, reconciler and
//! poller together and serves the admin API.

use protect_bridge::poller::Poller;
use protect_bridge::protect::ProtectClient;
use protect_bridge::reconciler::ReconciliationQueue;
use protect_bridge::settings::SettingsStore;
use protect_bridge::state::{AppConfig, AppState};
use protect_bridge::tree::WritablePaths;
use protect_bridge::value_store::{SqliteStore, ValueStore};
use protect_bridge::web_api;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "protect_bridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting protect-bridge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        database_url = %config.database_url,
        settings_path = %config.settings_path.display(),
        "Configuration loaded"
    );

    // State mirror backend
    let store: Arc<dyn ValueStore> = Arc::new(SqliteStore::connect(&config.database_url).await?);
    tracing::info!("Value store connected");

    // Bridge settings (admin surface)
    let settings = Arc::new(
        SettingsStore::load(config.settings_path.clone(), config.secret.clone()).await?,
    );
    let bridge = settings.get().await;

    // NVR client with the decrypted credentials
    let client = Arc::new(ProtectClient::new(
        bridge.base_url(),
        settings.credentials().await,
    )?);

    // First login is best-effort; the poll loop retries every tick
    if let Err(e) = client.login().await {
        tracing::warn!(error = %e, "Initial NVR login failed, will retry on poll");
    }

    // Reconciliation queue over the shared store
    let queue = Arc::new(ReconciliationQueue::new(store.clone()));

    let poller = Arc::new(Poller::new(
        client,
        store.clone(),
        queue,
        WritablePaths::default(),
        settings.clone(),
    ));
    poller.clone().start().await;
    tracing::info!("Poller started");

    let state = AppState {
        config: config.clone(),
        settings,
        store,
        poller: poller.clone(),
    };

    let app = web_api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(addr = %addr, "Admin API listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(poller))
        .await?;

    Ok(())
}

/// Stop the poller before the process exits
async fn shutdown(poller: Arc<Poller>) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("Failed to install ctrl-c handler");
        return;
    }
    tracing::info!("Shutdown signal received, cleaning up");
    poller.stop().await;
}
