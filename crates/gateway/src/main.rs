//! Docshelf API Gateway
//!
//! The HTTP front of the document library.
//! Handles:
//! - Catalog search, uploads and edits
//! - Registration, login and sessions
//! - Rate limiting
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use docshelf_common::{
    auth::Accounts,
    config::{AppConfig, ObservabilityConfig},
    email::{EmailSender, RecordingEmailSender, SmtpEmailSender},
    lookup::{HttpMetadataLookup, MetadataLookup},
    metrics::{self, LATENCY_BUCKETS},
    thumbnail::ThumbnailRenderer,
    Library,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{create_rate_limiter, rate_limit_middleware, GlobalRateLimiter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub library: Arc<Library>,
    pub accounts: Arc<Accounts>,
    pub lookup: Arc<dyn MetadataLookup>,
    pub thumbnails: Arc<ThumbnailRenderer>,
    pub metrics: PrometheusHandle,
    pub login_limiter: Arc<GlobalRateLimiter>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        library: Arc<Library>,
        mailer: Arc<dyn EmailSender>,
        lookup: Arc<dyn MetadataLookup>,
        metrics: PrometheusHandle,
    ) -> Self {
        let accounts = Arc::new(Accounts::new(
            library.clone(),
            config.auth.clone(),
            mailer,
        ));
        let thumbnails = Arc::new(ThumbnailRenderer::new(config.thumbnail.clone()));
        let login_limiter = create_rate_limiter(
            config.auth.login_rate_per_second,
            config.auth.login_burst,
        );

        Self {
            config,
            library,
            accounts,
            lookup,
            thumbnails,
            metrics,
            login_limiter,
        }
    }
}

impl FromRef<AppState> for Arc<Accounts> {
    fn from_ref(state: &AppState) -> Self {
        state.accounts.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize tracing
    init_tracing(&config.observability);
    info!(
        service = %config.observability.service_name,
        "Starting Docshelf API Gateway v{}",
        docshelf_common::VERSION
    );

    // Initialize metrics
    let metrics_handle = PrometheusBuilder::new()
        .set_buckets(LATENCY_BUCKETS)?
        .install_recorder()?;
    metrics::register_metrics();

    // Open the store and reconcile it with the artifact directory
    let library = Arc::new(Library::open(&config.storage)?);
    let report = library.startup().await?;
    info!(
        documents = report.total,
        missing = report.missing.len(),
        duplicates = report.duplicates.len(),
        "Startup reconciliation complete"
    );

    let mailer: Arc<dyn EmailSender> = match &config.email {
        Some(email) => Arc::new(SmtpEmailSender::new(email.clone())?),
        None => {
            warn!("No SMTP relay configured, confirmation emails will only be logged");
            Arc::new(RecordingEmailSender::new())
        }
    };
    let lookup = Arc::new(HttpMetadataLookup::new(config.lookup.clone())?);

    let state = AppState::new(config.clone(), library.clone(), mailer, lookup, metrics_handle);
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    match Arc::try_unwrap(library) {
        Ok(library) => library.close()?,
        Err(_) => warn!("Library still shared at shutdown, skipping final flush"),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    use handlers::{accounts, documents, health, lookup};

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let login = post(accounts::login).route_layer(from_fn_with_state(
        state.login_limiter.clone(),
        rate_limit_middleware,
    ));
    let upload_limit = state.config.server.max_upload_bytes;
    let timeout = state.config.request_timeout();

    Router::new()
        // Health endpoints (no auth)
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(health::metrics))

        // Catalog endpoints
        .route(
            "/documents",
            get(documents::search)
                .post(documents::publish)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/documents/{id}",
            get(documents::get_document)
                .patch(documents::update_document)
                .delete(documents::delete_document),
        )
        .route("/documents/{id}/file", get(documents::get_file))
        .route("/documents/{id}/thumbnail", get(documents::get_thumbnail))
        .route("/documents/{id}/restore", post(documents::restore_document))
        .route("/duplicates", get(documents::duplicates))
        .route("/orphans", get(documents::orphans))

        // Metadata lookup
        .route("/lookup/{*identifier}", get(lookup::lookup))

        // Account endpoints
        .route("/register", post(accounts::register))
        .route("/register/confirm", get(accounts::confirm))
        .route("/login", login)
        .route("/logout", post(accounts::logout))

        .route_layer(from_fn(middleware::metrics::track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
