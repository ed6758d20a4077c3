use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use temple_assets::{
    api,
    blob_store::{BlobStore, GcsStore, LocalStore, TimeoutStore},
    config::{Config, StorageBackend, StorageConfig},
    storage::Database,
    AppState,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "temple-assets starting");

    let config = Config::load()?;
    if config.test_mode {
        tracing::warn!("TEST_MODE is on; never run this configuration in production");
    }

    let db = Database::open(&config.node.data_dir)?;
    info!(data_dir = %config.node.data_dir, "Metadata store opened");

    let blob_store = open_blob_store(&config.storage).await?;

    let bind_address = config.node.bind_address.clone();
    let state = Arc::new(AppState {
        config,
        db,
        blob_store,
    });

    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// `LOG_FORMAT=gcp` for Cloud Logging, `json` for plain JSON lines,
/// anything else for human-readable text. Levels come from `RUST_LOG`.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT")
        .unwrap_or_default()
        .to_lowercase();
    let (gcp, json, text) = match log_format.as_str() {
        "gcp" => (Some(tracing_stackdriver::layer()), None, None),
        "json" => (
            None,
            Some(fmt::layer().json().with_target(true).with_span_list(false)),
            None,
        ),
        _ => (None, None, Some(fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(gcp)
        .with(json)
        .with(text)
        .init();
}

/// Build the configured backend with every call bounded by the blob timeout.
async fn open_blob_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match storage.backend {
        StorageBackend::Local => {
            let store = LocalStore::new(&storage.local_storage_path)?;
            info!(path = %storage.local_storage_path, "Using local blob storage");
            Arc::new(TimeoutStore::new(store, storage.timeout))
        }
        StorageBackend::Gcs => {
            let bucket = storage
                .gcs_bucket
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("GCS_BUCKET is required for the gcs backend"))?;
            let store = GcsStore::new(bucket, storage.gcs_credentials_file.as_deref()).await?;
            info!(bucket, "Using GCS blob storage");
            Arc::new(TimeoutStore::new(store, storage.timeout))
        }
    };
    Ok(store)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
