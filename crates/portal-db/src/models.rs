//! Database row types — these map directly to SQLite rows.
//! Conversion into the shared domain models lives here so the string
//! parsing (UUIDs, timestamps, enums) happens in exactly one place.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use portal_types::models::{AuthSource, ImageRef, Report, SendStatus, Student, User};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub auth_source: String,
    pub created_at: String,
}

pub struct StudentRow {
    pub id: String,
    pub owner_user_id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

pub struct ReportRow {
    pub id: String,
    pub student_id: String,
    pub author_user_id: String,
    pub body_text: String,
    pub rating: Option<i64>,
    pub image_kind: Option<String>,
    pub image_url: Option<String>,
    pub image_path: Option<String>,
    pub image_content_type: Option<String>,
    pub send_status: String,
    pub last_send_error: Option<String>,
    pub sent_at: Option<String>,
    pub created_at: String,
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp in row: {}", s))?
        .with_timezone(&Utc))
}

impl UserRow {
    pub fn into_model(self) -> Result<User> {
        Ok(User {
            id: self.id.parse::<Uuid>()?,
            auth_source: AuthSource::parse(&self.auth_source)
                .ok_or_else(|| anyhow!("unknown auth_source: {}", self.auth_source))?,
            created_at: parse_timestamp(&self.created_at)?,
            email: self.email,
            display_name: self.display_name,
        })
    }
}

impl StudentRow {
    pub fn into_model(self) -> Result<Student> {
        Ok(Student {
            id: self.id.parse::<Uuid>()?,
            owner_user_id: self.owner_user_id.parse::<Uuid>()?,
            name: self.name,
            email: self.email,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

impl ReportRow {
    pub fn into_model(self) -> Result<Report> {
        let image = match self.image_kind.as_deref() {
            None => None,
            Some("external") => Some(ImageRef::External {
                url: self
                    .image_url
                    .ok_or_else(|| anyhow!("external image row missing url"))?,
            }),
            Some("uploaded") => Some(ImageRef::Uploaded {
                storage_path: self
                    .image_path
                    .ok_or_else(|| anyhow!("uploaded image row missing path"))?,
                content_type: self
                    .image_content_type
                    .ok_or_else(|| anyhow!("uploaded image row missing content type"))?,
            }),
            Some(other) => return Err(anyhow!("unknown image_kind: {}", other)),
        };

        Ok(Report {
            id: self.id.parse::<Uuid>()?,
            student_id: self.student_id.parse::<Uuid>()?,
            author_user_id: self.author_user_id.parse::<Uuid>()?,
            body_text: self.body_text,
            rating: self
                .rating
                .map(u8::try_from)
                .transpose()
                .context("rating column out of range")?,
            image,
            send_status: SendStatus::parse(&self.send_status)
                .ok_or_else(|| anyhow!("unknown send_status: {}", self.send_status))?,
            last_send_error: self.last_send_error,
            sent_at: self.sent_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Flattened image columns for writes.
pub struct ImageColumns {
    pub kind: Option<String>,
    pub url: Option<String>,
    pub path: Option<String>,
    pub content_type: Option<String>,
}

impl ImageColumns {
    pub fn from_ref(image: Option<&ImageRef>) -> Self {
        match image {
            None => Self {
                kind: None,
                url: None,
                path: None,
                content_type: None,
            },
            Some(ImageRef::External { url }) => Self {
                kind: Some("external".into()),
                url: Some(url.clone()),
                path: None,
                content_type: None,
            },
            Some(ImageRef::Uploaded {
                storage_path,
                content_type,
            }) => Self {
                kind: Some("uploaded".into()),
                url: None,
                path: Some(storage_path.clone()),
                content_type: Some(content_type.clone()),
            },
        }
    }
}
