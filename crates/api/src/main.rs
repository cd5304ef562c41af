//! Tubeline API server

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tubeline_api::{
    media::{BlobStorage, CloudinaryStorage, DisabledBlobStorage},
    routes::create_router,
    store::PgStore,
    AppState, Config,
};
use tubeline_shared::db;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tubeline_api=debug,tower_http=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_json);

    tracing::info!(bind_address = %config.bind_address, "Starting Tubeline API");

    let pool = db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let blobs: Arc<dyn BlobStorage> = match CloudinaryStorage::from_config(
        config.cloudinary_cloud_name.clone(),
        config.cloudinary_api_key.clone(),
        config.cloudinary_api_secret.clone(),
    ) {
        Some(cloudinary) => Arc::new(cloudinary),
        None => Arc::new(DisabledBlobStorage),
    };

    tokio::fs::create_dir_all(&config.upload_temp_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.upload_temp_dir))?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, store.clone(), store, blobs, Some(pool));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!(address = %bind_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
