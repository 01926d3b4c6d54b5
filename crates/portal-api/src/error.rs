use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use portal_core::PortalError;
use tracing::error;

/// HTTP rendering of the domain taxonomy. `Forbidden` deliberately
/// answers exactly like `NotFound` so clients cannot probe whether a
/// record exists under another owner; the distinction is logged where
/// the error was raised.
pub struct ApiError(pub PortalError);

impl From<PortalError> for ApiError {
    fn from(err: PortalError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            PortalError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            PortalError::Forbidden | PortalError::NotFound => {
                (StatusCode::NOT_FOUND, "not found".to_string())
            }
            PortalError::Validation(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            PortalError::InvalidImage(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.0.to_string())
            }
            PortalError::Conflict(_) => (StatusCode::CONFLICT, self.0.to_string()),
            PortalError::Precondition(_) => {
                (StatusCode::PRECONDITION_FAILED, self.0.to_string())
            }
            PortalError::DeliveryFailed(_) => (StatusCode::BAD_GATEWAY, self.0.to_string()),
            PortalError::ConfigurationMissing(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.0.to_string())
            }
            PortalError::Internal(e) => {
                error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
