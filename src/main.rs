use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use photo_ia_backend::app_state::AppState;
use photo_ia_backend::config::AppConfig;
use photo_ia_backend::db::{self, PgPhotoRepository};
use photo_ia_backend::routes;
use photo_ia_backend::services::job_monitor::JobMonitor;
use photo_ia_backend::services::name_allocator::NameAllocator;
use photo_ia_backend::services::photo_service::PhotoService;
use photo_ia_backend::services::post_processor::FrameSet;
use photo_ia_backend::services::providers;
use photo_ia_backend::services::storage::S3Storage;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!(provider = %config.image_provider, "Initializing photo-ia-backend");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to build HTTP client");

    tracing::info!(bucket = %config.s3_bucket, "Initializing S3 storage client");
    let storage = S3Storage::new(config.s3_settings(), http.clone())
        .expect("Failed to initialize S3 client");

    let provider =
        providers::from_config(&config, http).expect("Failed to initialize generation provider");

    let frames = FrameSet::from_dir(&config.frame_dir);
    for name in ["1", "2"] {
        if let Err(e) = frames.select(name) {
            tracing::error!(frame_dir = %config.frame_dir, error = %e, "Frame assets missing");
        }
    }

    let monitor = JobMonitor::new(
        config.monitor_max_attempts,
        Duration::from_millis(config.monitor_interval_ms),
    )
    .with_submit_retries(config.submit_max_retries, Duration::from_secs(2));

    let photos = PhotoService::new(
        Arc::new(PgPhotoRepository::new(db_pool.clone())),
        Arc::new(storage),
        provider,
        monitor,
        frames,
        NameAllocator::new(config.photo_name_prefix.clone()),
    );
    let state = AppState::new(db_pool, photos);

    let app = Router::new()
        .merge(routes::api_router(state))
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(routes::MAX_UPLOAD_BYTES));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
