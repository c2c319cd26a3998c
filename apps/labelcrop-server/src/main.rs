//! labelcrop server
//!
//! Upload endpoint in front of the `labelcrop-core` pipeline. Accepts one or
//! more shipping-label PDFs and returns them cropped, sorted by courier,
//! split by order id and with a summary report appended, as requested.
//!
//! ## Endpoints
//!
//! - `POST /crop-pdf` - multipart upload, returns a PDF or a zip archive
//! - `GET /health` - liveness and rasterizer status
//!
//! Whitespace cropping needs a page rasterizer. Build with `--features pdfium`
//! and make the pdfium library available to enable it; without one the crop
//! stage passes pages through unchanged.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use labelcrop_core::config::{DEFAULT_DPI, DEFAULT_MARGIN};
use labelcrop_core::{CropConfig, Pipeline, PipelineConfig, RasterEncoding};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;

/// Command-line arguments for the labelcrop server
#[derive(Parser, Debug)]
#[command(name = "labelcrop-server")]
#[command(about = "Crop, sort and split shipping-label PDFs over HTTP")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Rasterization resolution for cropped pages
    #[arg(long, default_value_t = DEFAULT_DPI)]
    dpi: f64,

    /// JPEG quality for cropped page images (1-100)
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Margin in points kept around the detected content
    #[arg(long, default_value_t = DEFAULT_MARGIN)]
    margin: f64,

    /// Maximum request body size in megabytes
    #[arg(long, default_value = "100")]
    max_upload_mb: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Name of the active page rasterizer, if any
    pub rasterizer: Option<&'static str>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: Pipeline, max_upload_bytes: usize) -> Self {
        let rasterizer = pipeline.rasterizer_name();
        Self {
            pipeline: Arc::new(pipeline),
            rasterizer,
            max_upload_bytes,
        }
    }
}

#[cfg(feature = "pdfium")]
fn with_rasterizer(pipeline: Pipeline) -> Pipeline {
    match labelcrop_core::PdfiumRasterizer::new() {
        Ok(rasterizer) => pipeline.with_rasterizer(Arc::new(rasterizer)),
        Err(e) => {
            tracing::warn!("Whitespace cropping disabled: {}", e);
            pipeline
        }
    }
}

#[cfg(not(feature = "pdfium"))]
fn with_rasterizer(pipeline: Pipeline) -> Pipeline {
    tracing::warn!("Built without pdfium; whitespace cropping disabled");
    pipeline
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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

    info!("Starting labelcrop server on {}:{}", args.host, args.port);

    let config = PipelineConfig {
        crop: CropConfig {
            dpi: args.dpi,
            margin: args.margin,
            encoding: RasterEncoding::Jpeg {
                quality: args.jpeg_quality,
            },
        },
        ..PipelineConfig::default()
    };
    let pipeline = with_rasterizer(Pipeline::new(config));
    let state = AppState::new(pipeline, args.max_upload_mb * 1024 * 1024);

    let app = api::build_router(state.clone());

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!(
        "Rasterizer: {}, {} dpi, {}pt margin, upload limit {} MB",
        state.rasterizer.unwrap_or("none"),
        args.dpi,
        args.margin,
        args.max_upload_mb
    );

    axum::serve(listener, app).await?;

    Ok(())
}
