//! Report delivery. One send call is one synchronous transport attempt:
//! no queue, no retry, no background worker. The per-report guard keeps
//! two concurrent sends of the same report from both reaching the relay.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use portal_db::Database;
use portal_types::models::{ImageRef, Report, SendStatus, Student};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PortalError, Result};
use crate::images::UploadStorage;
use crate::mailer::{InlineImage, MailTransport, OutgoingMail};
use crate::task;

pub struct ReportDispatcher {
    db: Arc<Database>,
    storage: Arc<UploadStorage>,
    /// `None` when SMTP was never configured; every send then fails fast
    /// with `ConfigurationMissing` before touching any state.
    mailer: Option<Arc<dyn MailTransport>>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl ReportDispatcher {
    pub fn new(
        db: Arc<Database>,
        storage: Arc<UploadStorage>,
        mailer: Option<Arc<dyn MailTransport>>,
    ) -> Self {
        Self {
            db,
            storage,
            mailer,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Draft → Sent | Failed; Failed → Sent | Failed; Sent is terminal.
    pub async fn send(&self, report_id: Uuid, requester: Uuid) -> Result<Report> {
        let mailer = self
            .mailer
            .as_ref()
            .ok_or(PortalError::ConfigurationMissing("mail transport"))?;

        let _guard = SendGuard::acquire(&self.in_flight, report_id)?.ok_or_else(|| {
            PortalError::Conflict("a send for this report is already in progress".into())
        })?;

        let report = self.load_owned(report_id, requester).await?;
        if report.send_status == SendStatus::Sent {
            return Err(PortalError::Conflict(
                "this report has already been sent".into(),
            ));
        }

        // Orphaned report: its student was deleted after authoring.
        let db = self.db.clone();
        let student_id = report.student_id;
        let student = task::blocking(move || Ok(db.get_student(&student_id.to_string())?))
            .await?
            .map(|row| row.into_model())
            .transpose()?
            .ok_or_else(|| {
                PortalError::Precondition(
                    "the student this report refers to no longer exists".into(),
                )
            })?;
        if student.owner_user_id != requester {
            warn!(
                "User {} attempted to send report {} for student owned by {}",
                requester, report_id, student.owner_user_id
            );
            return Err(PortalError::Forbidden);
        }

        let mail = match self.compose(&report, &student).await {
            Ok(mail) => mail,
            Err(PortalError::DeliveryFailed(message)) => {
                self.mark_failed(report_id, message.clone()).await?;
                return Err(PortalError::DeliveryFailed(message));
            }
            Err(e) => return Err(e),
        };

        match mailer.deliver(&mail).await {
            Ok(()) => {
                let sent_at = Utc::now();
                let db = self.db.clone();
                task::blocking(move || {
                    db.mark_report_sent(&report_id.to_string(), &sent_at.to_rfc3339())?;
                    Ok(())
                })
                .await?;
                info!("Report {} sent to {}", report_id, student.email);
                self.load_owned(report_id, requester).await
            }
            Err(e) => {
                let message = e.to_string();
                self.mark_failed(report_id, message.clone()).await?;
                warn!("Report {} delivery failed: {}", report_id, message);
                Err(PortalError::DeliveryFailed(message))
            }
        }
    }

    async fn mark_failed(&self, report_id: Uuid, message: String) -> Result<()> {
        let db = self.db.clone();
        task::blocking(move || {
            db.mark_report_failed(&report_id.to_string(), &message)?;
            Ok(())
        })
        .await
    }

    async fn load_owned(&self, report_id: Uuid, requester: Uuid) -> Result<Report> {
        let db = self.db.clone();
        let report = task::blocking(move || Ok(db.get_report(&report_id.to_string())?))
            .await?
            .ok_or(PortalError::NotFound)?
            .into_model()?;
        if report.author_user_id != requester {
            warn!(
                "User {} attempted to send report {} authored by {}",
                requester, report_id, report.author_user_id
            );
            return Err(PortalError::Forbidden);
        }
        Ok(report)
    }

    /// Subject from student name + date, plain-text body from the report.
    /// Uploaded images are embedded from storage; external URLs are only
    /// linked, never fetched, so a dead link cannot fail the send.
    async fn compose(&self, report: &Report, student: &Student) -> Result<OutgoingMail> {
        let date = report.created_at.format("%Y-%m-%d");
        let subject = format!("Daily Report - {} - {}", student.name, date);

        let mut text_body = format!(
            "Dorm Daily Report\n\nStudent: {}\nDate: {}\n",
            student.name, date
        );
        if let Some(rating) = report.rating {
            text_body.push_str(&format!("Rating: {}/5\n", rating));
        }
        text_body.push_str(&format!("\nNotes:\n{}\n", report.body_text));

        let mut inline_image = None;
        let mut image_link = None;
        match &report.image {
            None => {}
            Some(ImageRef::External { url }) => {
                text_body.push_str(&format!("\nImage link: {}\n", url));
                image_link = Some(url.clone());
            }
            Some(ImageRef::Uploaded {
                storage_path,
                content_type,
            }) => {
                let bytes = self.storage.read(storage_path).await?.ok_or_else(|| {
                    PortalError::DeliveryFailed(format!(
                        "stored image {} is missing",
                        storage_path
                    ))
                })?;
                inline_image = Some(InlineImage {
                    bytes,
                    content_type: content_type.clone(),
                });
            }
        }

        Ok(OutgoingMail {
            to: student.email.clone(),
            subject,
            text_body,
            inline_image,
            image_link,
        })
    }
}

/// Membership in the in-flight set is the per-report single-writer
/// discipline; dropping the guard releases the slot.
struct SendGuard {
    set: Arc<Mutex<HashSet<Uuid>>>,
    id: Uuid,
}

impl SendGuard {
    fn acquire(set: &Arc<Mutex<HashSet<Uuid>>>, id: Uuid) -> Result<Option<Self>> {
        let mut locked = set
            .lock()
            .map_err(|e| anyhow::anyhow!("send lock poisoned: {}", e))?;
        if !locked.insert(id) {
            return Ok(None);
        }
        Ok(Some(Self {
            set: set.clone(),
            id,
        }))
    }
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        if let Ok(mut locked) = self.set.lock() {
            locked.remove(&self.id);
        }
    }
}
