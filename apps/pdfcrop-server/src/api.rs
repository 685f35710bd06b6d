//! API handlers for the pdfcrop server

use axum::{
    extract::Multipart,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use pdfcrop_core::{crop_document, KeepZoneMap};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ApiError;

/// Fixed download name; never derived from the upload
const OUTPUT_FILENAME: &str = "cropped.pdf";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pdfcrop-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// The two form fields of a crop request, held in memory
struct CropForm {
    pdf: Vec<u8>,
    annotations: String,
}

impl CropForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut pdf = None;
        let mut annotations = None;

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "pdf" => pdf = Some(field.bytes().await?.to_vec()),
                "annotations" => annotations = Some(field.text().await?),
                other => debug!("Ignoring form field '{}'", other),
            }
        }

        Ok(Self {
            pdf: pdf.ok_or_else(|| ApiError::InvalidRequest("Missing 'pdf' field".into()))?,
            annotations: annotations
                .ok_or_else(|| ApiError::InvalidRequest("Missing 'annotations' field".into()))?,
        })
    }
}

/// Handler: POST /crop-pdf
///
/// Whitens everything outside the requested keep zones and returns the
/// resulting PDF as an attachment.
pub async fn handle_crop_pdf(multipart: Multipart) -> Result<Response, ApiError> {
    let form = CropForm::read(multipart).await?;
    let zones = KeepZoneMap::from_json(&form.annotations)?;

    info!(
        "Cropping {} byte PDF with {} page entries",
        form.pdf.len(),
        zones.len()
    );

    let output = tokio::task::spawn_blocking(move || crop_document(&form.pdf, &zones))
        .await
        .map_err(|e| ApiError::Internal(format!("Crop task failed: {}", e)))??;

    info!(
        "Returning {}-page PDF, {} bytes",
        output.page_count,
        output.pdf.len()
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", OUTPUT_FILENAME),
            ),
        ],
        output.pdf,
    )
        .into_response())
}
