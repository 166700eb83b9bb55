//! PDF Segmentation Server
//!
//! Splits uploaded PDFs at their largest vertical whitespace gaps and
//! returns the pieces as a ZIP archive. Provides REST endpoints for:
//!
//! - Segmentation (multipart upload)
//! - Metadata lookup, update and deletion per segmented PDF
//!
//! ## Architecture
//!
//! Segmentation itself lives in `pdfsegment-core`; this binary adds:
//!
//! - Upload validation (type, size, cut count)
//! - A metadata store, in memory or backed by a JSON file
//! - Rate limiting via tower-governor

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
    Router,
};
use clap::Parser;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod store;

use api::{
    handle_delete_pdf, handle_get_metadata, handle_health, handle_modify_segmentation,
    handle_segment_pdf, handle_update_segmentation,
};
use store::{InMemoryMetadataStore, JsonFileMetadataStore, MetadataStore};

/// Multipart framing allowance on top of the file size limit
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Command-line arguments for the segmentation server
#[derive(Parser, Debug)]
#[command(name = "pdfsegment-server")]
#[command(about = "Split PDFs at their largest vertical whitespace gaps")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PDFSEGMENT_PORT", default_value = "3000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "PDFSEGMENT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Maximum accepted PDF size in bytes
    #[arg(long, env = "PDFSEGMENT_MAX_UPLOAD_BYTES", default_value = "10485760")]
    max_upload_bytes: usize,

    /// Segmentation timeout in milliseconds
    #[arg(long, env = "PDFSEGMENT_TIMEOUT_MS", default_value = "10000")]
    timeout_ms: u64,

    /// Rate limit: requests per second per IP
    #[arg(long, env = "PDFSEGMENT_RATE_LIMIT", default_value = "10")]
    rate_limit: u32,

    /// Persist metadata to this JSON file instead of keeping it in memory
    #[arg(long, env = "PDFSEGMENT_METADATA_FILE")]
    metadata_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    /// Largest accepted PDF in bytes
    pub max_upload_bytes: usize,
    /// Segmentation timeout in milliseconds
    pub timeout_ms: u64,
}

/// Routes and per-request middleware, without rate limiting
pub fn app_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // Segmentation
        .route("/api/pdf/segment-pdf", post(handle_segment_pdf))
        // Metadata
        .route("/api/pdf/pdf-metadata/:id", get(handle_get_metadata))
        .route(
            "/api/pdf/update-segmentation/:id",
            put(handle_update_segmentation),
        )
        .route(
            "/api/pdf/modify-segmentation/:id",
            patch(handle_modify_segmentation),
        )
        .route("/api/pdf/delete-pdf/:id", delete(handle_delete_pdf))
        // Apply middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pdfsegment server on {}:{}", args.host, args.port);

    let store: Arc<dyn MetadataStore> = match &args.metadata_file {
        Some(path) => {
            info!("Metadata store: {}", path.display());
            Arc::new(JsonFileMetadataStore::open(path)?)
        }
        None => {
            info!("Metadata store: in-memory");
            Arc::new(InMemoryMetadataStore::new())
        }
    };

    // Create rate limiter configuration
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(args.rate_limit.into())
            .burst_size(args.rate_limit * 2)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limit: {}", args.rate_limit))?,
    );

    let state = AppState {
        store,
        max_upload_bytes: args.max_upload_bytes,
        timeout_ms: args.timeout_ms,
    };

    let app = app_router(state).layer(GovernorLayer {
        config: governor_conf,
    });

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Rate limit: {} requests/second per IP", args.rate_limit);
    info!("Upload limit: {} bytes", args.max_upload_bytes);
    info!("Segmentation timeout: {}ms", args.timeout_ms);

    // Peer addresses feed the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
