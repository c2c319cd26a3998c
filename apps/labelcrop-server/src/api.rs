//! API handlers for the labelcrop server
//!
//! Provides REST endpoints for:
//! - Label processing (`POST /crop-pdf`)
//! - Health checks

use std::io::{Cursor, Write};

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderName},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use labelcrop_core::{FilterOptions, OutputFile, PipelineInput, PipelineOutput};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::error::ServerError;
use crate::AppState;

/// Name of the archive returned when more than one file is produced
pub const ARCHIVE_NAME: &str = "processed_files.zip";

/// Response header listing stages that ran in degraded mode
pub const DEGRADED_HEADER: &str = "x-labelcrop-degraded";

/// Build the router with all endpoints and middleware.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/health", get(handle_health))
        .route("/crop-pdf", post(handle_crop_pdf))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub rasterizer: Option<&'static str>,
}

/// Handler: GET /health
pub async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "labelcrop-server",
        version: env!("CARGO_PKG_VERSION"),
        rasterizer: state.rasterizer,
    })
}

/// Form fields of a crop request, collected from the multipart body
#[derive(Debug, Default)]
pub struct CropForm {
    pub files: Vec<PipelineInput>,
    pub merge: bool,
    pub sort_courier: bool,
    pub remove_white: bool,
    pub keep_invoice_no_crop: bool,
    pub bottom_of_the_table: bool,
    pub separate_order_list: String,
}

impl CropForm {
    /// Read every part of the upload. Unknown fields are ignored.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ServerError> {
        let mut form = CropForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "files" => {
                    let file_name = field
                        .file_name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("input_{}.pdf", form.files.len() + 1));
                    let bytes = field.bytes().await?;
                    debug!(file = %file_name, bytes = bytes.len(), "Received upload");
                    form.files.push(PipelineInput::new(file_name, bytes.to_vec()));
                }
                "merge" => form.merge = parse_flag(&field.text().await?)?,
                "sort_courier" => form.sort_courier = parse_flag(&field.text().await?)?,
                "remove_white" => form.remove_white = parse_flag(&field.text().await?)?,
                "keep_invoice_no_crop" => {
                    form.keep_invoice_no_crop = parse_flag(&field.text().await?)?
                }
                "bottom_of_the_table" => {
                    form.bottom_of_the_table = parse_flag(&field.text().await?)?
                }
                "separate_order_list" => form.separate_order_list = field.text().await?,
                other => debug!(field = other, "Ignoring unknown form field"),
            }
        }

        Ok(form)
    }

    pub fn options(&self) -> FilterOptions {
        FilterOptions {
            merge_all: self.merge,
            remove_whitespace: self.remove_white,
            sort_by_courier: self.sort_courier,
            keep_invoice_uncropped: self.keep_invoice_no_crop,
            append_summary: self.bottom_of_the_table,
        }
    }
}

/// Parse an HTML form boolean.
pub fn parse_flag(value: &str) -> Result<bool, ServerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "off" | "no" => Ok(false),
        "true" | "1" | "on" | "yes" => Ok(true),
        other => Err(ServerError::InvalidRequest(format!(
            "'{}' is not a boolean",
            other
        ))),
    }
}

/// Handler: POST /crop-pdf
pub async fn handle_crop_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ServerError> {
    let form = CropForm::from_multipart(multipart).await?;
    if form.files.is_empty() {
        return Err(ServerError::NoFiles);
    }

    let options = form.options();
    info!(
        files = form.files.len(),
        filter = ?options,
        order_ids = !form.separate_order_list.trim().is_empty(),
        "Crop request"
    );

    let pipeline = state.pipeline.clone();
    let order_list = form.separate_order_list;
    let payload = tokio::task::spawn_blocking(move || {
        Payload::build(pipeline.run(form.files, &options, &order_list)?)
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))??;
    let Payload {
        body,
        file_name,
        content_type,
        degraded,
    } = payload;
    info!(file = %file_name, bytes = body.len(), "Returning processed output");

    let mut response = (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response();
    if !degraded.is_empty() {
        warn!(stages = %degraded, "Output produced with degraded stages");
        if let Ok(value) = degraded.parse() {
            response
                .headers_mut()
                .insert(HeaderName::from_static(DEGRADED_HEADER), value);
        }
    }
    Ok(response)
}

/// Response body and framing for one pipeline output
struct Payload {
    body: Vec<u8>,
    file_name: String,
    content_type: &'static str,
    degraded: String,
}

impl Payload {
    fn build(output: PipelineOutput) -> Result<Self, ServerError> {
        let degraded = degraded_stages(output.files());
        match output {
            PipelineOutput::Single(file) => Ok(Self {
                body: file.bytes,
                file_name: file.name,
                content_type: "application/pdf",
                degraded,
            }),
            PipelineOutput::Archive(files) => Ok(Self {
                body: zip_outputs(&files)?,
                file_name: ARCHIVE_NAME.to_string(),
                content_type: "application/zip",
                degraded,
            }),
        }
    }
}

/// Pack every output file into a deflated zip archive.
pub fn zip_outputs(files: &[OutputFile]) -> Result<Vec<u8>, ServerError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in files {
        zip.start_file(file.name.as_str(), options)?;
        zip.write_all(&file.bytes)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Comma-separated `file:stage` pairs for every degraded stage.
fn degraded_stages(files: &[OutputFile]) -> String {
    files
        .iter()
        .flat_map(|file| {
            file.stages
                .iter()
                .filter(|report| !report.outcome.is_applied())
                .map(move |report| format!("{}:{:?}", file.name, report.stage).to_lowercase())
        })
        .collect::<Vec<_>>()
        .join(",")
}
