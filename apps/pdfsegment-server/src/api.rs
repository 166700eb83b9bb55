//! API handlers for the segmentation server
//!
//! Provides REST endpoints for:
//! - PDF segmentation (multipart upload, ZIP download)
//! - Segmentation metadata lookup, update and deletion

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use pdfsegment_core::{
    package_zip, segment_document_cancellable, CutCount, PartitionMode, SegmentError,
    ARCHIVE_FILE_NAME,
};

use crate::error::ServerError;
use crate::store::PdfMetadata;
use crate::AppState;

const PDF_MIME_TYPE: &str = "application/pdf";
const CUTS_MESSAGE: &str = "The number of cuts must be a positive integer.";

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
        service: "pdfsegment-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Fields collected from the segmentation upload form
#[derive(Default)]
struct SegmentUpload {
    file_name: Option<String>,
    content_type: Option<String>,
    data: Option<Bytes>,
    cuts: Option<String>,
    mode: Option<String>,
}

impl SegmentUpload {
    async fn read(mut multipart: Multipart) -> Result<Self, ServerError> {
        let mut upload = SegmentUpload::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ServerError::InvalidRequest(format!("Multipart error: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    upload.file_name = field.file_name().map(str::to_string);
                    upload.content_type = field.content_type().map(str::to_string);
                    upload.data = Some(field.bytes().await.map_err(|e| {
                        ServerError::InvalidRequest(format!("Failed to read file: {}", e))
                    })?);
                }
                "cuts" | "mode" => {
                    let text = field.text().await.map_err(|e| {
                        ServerError::InvalidRequest(format!("Failed to read '{}': {}", name, e))
                    })?;
                    if name == "cuts" {
                        upload.cuts = Some(text);
                    } else {
                        upload.mode = Some(text);
                    }
                }
                other => debug!("Ignoring multipart field '{}'", other),
            }
        }

        Ok(upload)
    }
}

/// Parse a client supplied cut count, rejecting anything but a positive integer
fn parse_cuts(raw: Option<&str>) -> Result<CutCount, ServerError> {
    let value: i64 = raw
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| ServerError::InvalidRequest(CUTS_MESSAGE.into()))?;
    validate_cuts(value)
}

fn validate_cuts(value: i64) -> Result<CutCount, ServerError> {
    CutCount::new(value).map_err(|_| ServerError::InvalidRequest(CUTS_MESSAGE.into()))
}

/// Derive the metadata id from an uploaded file name
///
/// Directory components are stripped and the result is limited to
/// printable ASCII so it can be echoed in a response header. Uploads
/// without a usable name get a random id.
pub fn pdf_id_from_file_name(file_name: Option<&str>) -> String {
    let base = file_name
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .map(str::trim)
        .unwrap_or_default();

    if base.is_empty() || base == "." || base == ".." {
        return format!("{}.pdf", uuid::Uuid::new_v4());
    }

    base.chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect()
}

/// Handler: POST /api/pdf/segment-pdf
///
/// Multipart fields: `file` (the PDF), `cuts` (positive integer) and an
/// optional `mode` (`positional` or `spatial`). Responds `201 Created` with
/// a ZIP archive of the segments.
pub async fn handle_segment_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ServerError> {
    let upload = SegmentUpload::read(multipart).await?;

    let data = upload
        .data
        .ok_or_else(|| ServerError::InvalidRequest("No file provided".into()))?;

    if upload.content_type.as_deref() != Some(PDF_MIME_TYPE) {
        return Err(ServerError::InvalidRequest(
            "Invalid file type. Only PDF files are accepted.".into(),
        ));
    }

    if data.len() > state.max_upload_bytes {
        return Err(ServerError::InvalidRequest(format!(
            "File size exceeds the limit of {} MB.",
            state.max_upload_bytes / (1024 * 1024)
        )));
    }

    let cuts = parse_cuts(upload.cuts.as_deref())?;
    let mode = match upload.mode.as_deref() {
        Some(raw) => raw
            .parse::<PartitionMode>()
            .map_err(ServerError::InvalidRequest)?,
        None => PartitionMode::default(),
    };

    let pdf_id = pdf_id_from_file_name(upload.file_name.as_deref());
    info!(
        "Segment request: pdf_id={}, size={} bytes, cuts={}, mode={:?}",
        pdf_id,
        data.len(),
        cuts.get(),
        mode
    );

    // CPU-bound work runs off the async executor
    let name = pdf_id.clone();
    let cancel = Arc::new(AtomicBool::new(false));
    let job_cancel = cancel.clone();
    let job = tokio::task::spawn_blocking(move || -> Result<_, SegmentError> {
        let result = segment_document_cancellable(&data, cuts, mode, &job_cancel)?;
        let archive = package_zip(&name, &result.segments)?;
        Ok((result, archive))
    });

    let (result, archive) = tokio::time::timeout(Duration::from_millis(state.timeout_ms), job)
        .await
        .map_err(|_| {
            // The blocking task stops at its next checkpoint
            cancel.store(true, Ordering::Relaxed);
            ServerError::Timeout(state.timeout_ms)
        })?
        .map_err(|e| ServerError::Internal(format!("Segmentation task failed: {}", e)))??;

    state.store.put(PdfMetadata {
        pdf_id: pdf_id.clone(),
        segment_count: result.segment_count(),
        cuts: cuts.get(),
    })?;

    info!(
        "Segmented {} into {} parts ({} bytes archived)",
        pdf_id,
        result.segment_count(),
        archive.len()
    );

    Response::builder()
        .status(StatusCode::CREATED)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", ARCHIVE_FILE_NAME),
        )
        .header("x-pdf-id", pdf_id.as_str())
        .header("x-segment-count", result.segment_count().to_string())
        .header("x-page-count", result.metrics.page_count.to_string())
        .header(
            "x-processing-time-ms",
            result.metrics.processing_time_ms.to_string(),
        )
        .body(Body::from(archive))
        .map_err(|e| ServerError::Internal(format!("Failed to build response: {}", e)))
}

/// Handler: GET /api/pdf/pdf-metadata/:id
pub async fn handle_get_metadata(
    State(state): State<AppState>,
    Path(pdf_id): Path<String>,
) -> Result<Json<PdfMetadata>, ServerError> {
    let metadata = state
        .store
        .get(&pdf_id)?
        .ok_or(ServerError::PdfNotFound(pdf_id))?;
    Ok(Json(metadata))
}

/// Query string of the full segmentation update
#[derive(Deserialize)]
pub struct UpdateSegmentationQuery {
    pub cuts: i64,
}

/// Handler: PUT /api/pdf/update-segmentation/:id?cuts=N
pub async fn handle_update_segmentation(
    State(state): State<AppState>,
    Path(pdf_id): Path<String>,
    Query(query): Query<UpdateSegmentationQuery>,
) -> Result<(StatusCode, &'static str), ServerError> {
    let cuts = validate_cuts(query.cuts)?;
    state.store.set_cuts(&pdf_id, cuts.get())?;

    info!("Updated segmentation of {}: cuts={}", pdf_id, cuts.get());
    Ok((StatusCode::OK, "Segmentation updated successfully"))
}

/// Body of the partial segmentation update
#[derive(Deserialize)]
pub struct ModifySegmentationRequest {
    #[serde(default)]
    pub cuts: Option<i64>,
}

/// Handler: PATCH /api/pdf/modify-segmentation/:id
///
/// Only the fields present in the body are changed.
pub async fn handle_modify_segmentation(
    State(state): State<AppState>,
    Path(pdf_id): Path<String>,
    Json(req): Json<ModifySegmentationRequest>,
) -> Result<(StatusCode, &'static str), ServerError> {
    if state.store.get(&pdf_id)?.is_none() {
        return Err(ServerError::PdfNotFound(pdf_id));
    }

    if let Some(raw) = req.cuts {
        let cuts = validate_cuts(raw)?;
        state.store.set_cuts(&pdf_id, cuts.get())?;
        info!("Modified segmentation of {}: cuts={}", pdf_id, cuts.get());
    }

    Ok((StatusCode::OK, "Segmentation details modified successfully"))
}

/// Handler: DELETE /api/pdf/delete-pdf/:id
pub async fn handle_delete_pdf(
    State(state): State<AppState>,
    Path(pdf_id): Path<String>,
) -> Result<StatusCode, ServerError> {
    match state.store.remove(&pdf_id)? {
        Some(_) => {
            info!("Deleted metadata for {}", pdf_id);
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ServerError::PdfNotFound(pdf_id)),
    }
}
