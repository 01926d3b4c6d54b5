use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use portal_core::PortalError;

use crate::AppState;
use crate::error::ApiError;

/// GET /uploads/{name} — serves stored image bytes for the web view and
/// for mail clients following an uploaded-image link. Names are the
/// server-generated ones only; anything else reads as missing.
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state
        .storage
        .read(&name)
        .await
        .map_err(PortalError::Internal)?
        .ok_or(PortalError::NotFound)?;

    let content_type = match name.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}
