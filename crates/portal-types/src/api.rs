use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::SendStatus;

// -- Session claims --

/// JWT claims carried by the session token. Canonical definition lives
/// here so the API middleware and the handlers share one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeUrlResponse {
    pub authorize_url: String,
}

#[derive(Debug, Deserialize)]
pub struct OauthCallbackQuery {
    pub code: String,
    #[serde(default)]
    pub state: Option<String>,
}

// -- Students --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStudentRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStudentRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ListStudentsQuery {
    /// Case-insensitive substring over name and email.
    #[serde(default)]
    pub q: Option<String>,
}

// -- Reports --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReportRequest {
    pub student_id: Uuid,
    pub body_text: String,
    /// Performance rating, 1-5.
    #[serde(default)]
    pub rating: Option<u8>,
    /// Optional external image URL; uploads go through a separate endpoint.
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateReportRequest {
    #[serde(default)]
    pub body_text: Option<String>,
    /// New rating; absent keeps the current one.
    #[serde(default)]
    pub rating: Option<u8>,
    /// Replaces the current image with an external reference.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Detaches the current image. Ignored when image_url is also given.
    #[serde(default)]
    pub clear_image: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListReportsQuery {
    #[serde(default)]
    pub student_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<SendStatus>,
}

#[derive(Debug, Serialize)]
pub struct SendReportResponse {
    pub report_id: Uuid,
    pub send_status: SendStatus,
    pub sent_at: Option<chrono::DateTime<chrono::Utc>>,
}
