use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use portal_core::PortalError;
use portal_core::images;
use portal_core::reports::{ImagePatch, ReportPatch};
use portal_types::api::{Claims, CreateReportRequest, ListReportsQuery, SendReportResponse, UpdateReportRequest};
use portal_types::models::Report;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

pub async fn create_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let image = req.image_url.as_deref().map(images::resolve_url).transpose()?;
    let report = state
        .reports
        .create(claims.sub, req.student_id, &req.body_text, req.rating, image)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn list_reports(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListReportsQuery>,
) -> Result<Json<Vec<Report>>, ApiError> {
    let reports = state
        .reports
        .list(claims.sub, query.student_id, query.status)
        .await?;
    Ok(Json(reports))
}

pub async fn get_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
) -> Result<Json<Report>, ApiError> {
    let report = state.reports.get(claims.sub, report_id).await?;
    Ok(Json(report))
}

pub async fn update_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
    Json(req): Json<UpdateReportRequest>,
) -> Result<Json<Report>, ApiError> {
    let image = match (&req.image_url, req.clear_image) {
        (Some(url), _) => ImagePatch::Replace(images::resolve_url(url)?),
        (None, true) => ImagePatch::Clear,
        (None, false) => ImagePatch::Keep,
    };
    let report = state
        .reports
        .update(
            claims.sub,
            report_id,
            ReportPatch {
                body_text: req.body_text,
                rating: req.rating,
                image,
            },
        )
        .await?;
    Ok(Json(report))
}

pub async fn delete_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.reports.delete(claims.sub, report_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /reports/{id}/image — raw image bytes; the Content-Type header
/// declares the type, validated against the image allow-list.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<Json<Report>, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PortalError::InvalidImage("missing Content-Type header".into()))?;

    let report = state
        .reports
        .attach_upload(claims.sub, report_id, &bytes, content_type)
        .await?;
    Ok(Json(report))
}

/// POST /reports/{id}/send — one synchronous delivery attempt.
pub async fn send_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
) -> Result<Json<SendReportResponse>, ApiError> {
    let report = state.dispatcher.send(report_id, claims.sub).await?;
    Ok(Json(SendReportResponse {
        report_id: report.id,
        send_status: report.send_status,
        sent_at: report.sent_at,
    }))
}
