use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a user identity came from. Dev identities only exist when the
/// dev-mode capability was enabled at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthSource {
    Google,
    Dev,
}

impl AuthSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthSource::Google => "google",
            AuthSource::Dev => "dev",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "google" => Some(AuthSource::Google),
            "dev" => Some(AuthSource::Dev),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Stored lowercase; matched case-insensitively at login.
    pub email: String,
    pub display_name: String,
    pub auth_source: AuthSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A report's image attachment. Every consumer (API responses, the email
/// composer) matches on the kind rather than sniffing nullable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImageRef {
    /// An absolute http/https URL. Never fetched by the server; emails
    /// carry it as a link.
    External { url: String },
    /// Bytes stored under a server-generated unique name.
    Uploaded {
        storage_path: String,
        content_type: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Draft,
    Sent,
    Failed,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Draft => "draft",
            SendStatus::Sent => "sent",
            SendStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(SendStatus::Draft),
            "sent" => Some(SendStatus::Sent),
            "failed" => Some(SendStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub student_id: Uuid,
    pub author_user_id: Uuid,
    pub body_text: String,
    /// Performance rating, 1 (poor) to 5 (excellent).
    pub rating: Option<u8>,
    pub image: Option<ImageRef>,
    pub send_status: SendStatus,
    /// Present only after a failed send attempt.
    pub last_send_error: Option<String>,
    /// Present only once the report has been sent.
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
