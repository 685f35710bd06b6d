//! pdfcrop Server
//!
//! HTTP front end for keep-zone cropping: clients upload a PDF together with
//! per-page rectangles, and get back the same document with everything
//! outside those rectangles painted white.
//!
//! ## Endpoints
//!
//! - `POST /crop-pdf`: multipart form with `pdf` and `annotations`
//! - `GET /health`

use std::net::SocketAddr;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod config;
mod error;

use api::{handle_crop_pdf, handle_health};
use config::{CorsConfig, ServerConfig};

/// Command-line arguments for the pdfcrop server
#[derive(Parser, Debug)]
#[command(name = "pdfcrop-server")]
#[command(about = "Whitens everything outside keep zones on PDF pages")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Allowed CORS origin, repeatable; `*` allows any
    #[arg(long = "allowed-origin", default_value = "*")]
    allowed_origins: Vec<String>,

    /// Allowed CORS method, repeatable; `*` allows any
    #[arg(long = "allowed-method", default_value = "*")]
    allowed_methods: Vec<String>,

    /// Largest accepted upload in megabytes
    #[arg(long, default_value = "50")]
    max_upload_mb: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            cors: CorsConfig {
                allowed_origins: args.allowed_origins,
                allowed_methods: args.allowed_methods,
            },
            max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
        }
    }
}

/// Build the application router from an explicit configuration
pub fn build_router(config: &ServerConfig) -> Result<Router> {
    let cors = config.cors.layer()?;

    Ok(Router::new()
        .route("/health", get(handle_health))
        .route("/crop-pdf", post(handle_crop_pdf))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from(args);
    info!("Starting pdfcrop server on {}:{}", config.host, config.port);

    let app = build_router(&config)?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!(
        "CORS origins: {:?}, methods: {:?}",
        config.cors.allowed_origins, config.cors.allowed_methods
    );
    info!("Upload limit: {} bytes", config.max_upload_bytes);

    axum::serve(listener, app).await?;

    Ok(())
}
