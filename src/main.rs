use anyhow::{Context, Result};
use axum::Router;
use media_library::{
    config::{AppConfig, StorageBackend},
    db, routes,
    services::{
        batch_tracker::BatchTracker,
        clock::{Clock, SystemClock},
        content_store::StorageProvider,
        deletion_service::DeletionService,
        local_storage::LocalStorage,
        s3_storage::{S3Settings, S3Storage},
        upload_registry::{SessionLimits, UploadSessionRegistry},
        upload_service::UploadService,
        url_cache::UrlSigningCache,
    },
    state::AppState,
};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting media-library with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url, 5).await?);

    // --- Handle migration mode ---
    if migrate {
        db::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Content store ---
    let (store, local): (Arc<dyn StorageProvider>, Option<Arc<LocalStorage>>) =
        match cfg.storage_backend {
            StorageBackend::Local => {
                if !Path::new(&cfg.storage_dir).exists() {
                    fs::create_dir_all(&cfg.storage_dir)?;
                    tracing::info!("Created storage directory at {}", cfg.storage_dir);
                }
                let local = Arc::new(LocalStorage::new(
                    &cfg.storage_dir,
                    &cfg.public_base_url,
                    cfg.signing_secret.as_bytes(),
                ));
                (local.clone(), Some(local))
            }
            StorageBackend::S3 => {
                let settings = S3Settings {
                    bucket: cfg.s3_bucket.clone().unwrap_or_default(),
                    region: Some(cfg.s3_region.clone()),
                    endpoint: cfg.s3_endpoint.clone(),
                    prefix: cfg.s3_prefix.clone(),
                    access_key_id: cfg.s3_access_key_id.clone(),
                    secret_access_key: cfg.s3_secret_access_key.clone(),
                    force_path_style: cfg.s3_force_path_style,
                };
                let s3 = S3Storage::new(settings)
                    .await
                    .context("initializing S3 content store")?;
                (Arc::new(s3), None)
            }
        };
    tracing::info!(backend = store.name(), "content store ready");

    // --- Initialize core services ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(UploadSessionRegistry::new(
        SessionLimits {
            max_sessions: cfg.max_sessions,
            max_age: cfg.session_ttl,
            max_chunk_len: cfg.max_chunk_len,
            ..SessionLimits::default()
        },
        clock.clone(),
    ));
    let urls = Arc::new(UrlSigningCache::new(
        store.clone(),
        cfg.url_cache_duration,
        clock.clone(),
    ));
    let batches = Arc::new(BatchTracker::new(cfg.session_ttl, clock));
    registry.start(cfg.sweep_interval);
    urls.start(cfg.sweep_interval);
    batches.start(cfg.sweep_interval);

    let state = AppState {
        db: db.clone(),
        store: store.clone(),
        local,
        uploads: UploadService::new(
            db.clone(),
            store.clone(),
            registry.clone(),
            urls.clone(),
            batches.clone(),
            cfg.default_url_ttl,
        ),
        deletions: DeletionService::new(db.clone(), store),
        urls: urls.clone(),
        default_url_ttl: cfg.default_url_ttl,
    };

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_body_bytes).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Stop background sweeps ---
    registry.stop().await;
    urls.stop().await;
    batches.stop().await;
    tracing::info!("Shutdown complete.");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received.");
}
