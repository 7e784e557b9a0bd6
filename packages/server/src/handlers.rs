//! HTTP handler functions for the site progress API.

use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use site_progress_analysis::{AnalysisError, ErrorKind};
use site_progress_server_models::{ApiError, ApiHealth};

use crate::AppState;
use crate::upload::{self, UploadError};

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /api/analyze-progress`
///
/// Accepts a multipart upload with an `image` part and a JSON `metadata`
/// part, runs the analysis pipeline, and returns the stored report.
pub async fn analyze_progress(state: web::Data<AppState>, mut payload: Multipart) -> HttpResponse {
    log::info!("Received new analysis request");

    let request = match upload::read_request(&mut payload, state.max_upload_bytes).await {
        Ok(request) => request,
        Err(e) => {
            log::warn!("Rejected upload: {e}");
            return upload_error_response(&e);
        }
    };

    match state.analyzer.analyze(request).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => analysis_error_response(&e),
    }
}

/// `GET /api/reports/{location}`
///
/// Returns the latest stored report for a location.
pub async fn latest_report(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let location = path.into_inner();

    match state.analyzer.store().load_latest(&location).await {
        Ok(Some(report)) => HttpResponse::Ok().json(report),
        Ok(None) => HttpResponse::NotFound().json(ApiError::new(
            "not_found",
            format!("No report stored for location '{location}'"),
        )),
        Err(e) => analysis_error_response(&AnalysisError::from(e)),
    }
}

/// HTTP status for each error kind: caller mistakes are 400, everything
/// else is a server-side failure.
#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    if kind.is_caller_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn analysis_error_response(e: &AnalysisError) -> HttpResponse {
    let kind = e.kind();
    HttpResponse::build(status_for(kind)).json(ApiError::new(kind.as_ref(), e.to_string()))
}

fn upload_error_response(e: &UploadError) -> HttpResponse {
    let status = match e {
        UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    HttpResponse::build(status).json(ApiError::new(ErrorKind::InvalidInput.as_ref(), e.to_string()))
}
