use std::sync::Arc;

use chrono::Utc;
use portal_db::Database;
use portal_db::models::ImageColumns;
use portal_types::models::{ImageRef, Report, SendStatus};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PortalError, Result};
use crate::images::{self, UploadStorage};
use crate::task;

/// CRUD over reports, scoped by author. A report's image is write-once:
/// replacing it attaches a fresh `ImageRef` and orphans the old one
/// (uploaded bytes are cleaned up best-effort).
pub struct ReportStore {
    db: Arc<Database>,
    storage: Arc<UploadStorage>,
}

/// What an update may change. Body and image edits are rejected once a
/// report has been sent.
#[derive(Debug, Default)]
pub struct ReportPatch {
    pub body_text: Option<String>,
    /// New 1-5 rating; `None` keeps the current one.
    pub rating: Option<u8>,
    pub image: ImagePatch,
}

#[derive(Debug, Default)]
pub enum ImagePatch {
    /// Leave the current attachment alone.
    #[default]
    Keep,
    /// Detach the current attachment.
    Clear,
    /// Attach this instead, orphaning the previous one.
    Replace(ImageRef),
}

impl ReportStore {
    pub fn new(db: Arc<Database>, storage: Arc<UploadStorage>) -> Self {
        Self { db, storage }
    }

    /// Referential integrity is checked here, at write time: the student
    /// must exist and belong to the author.
    pub async fn create(
        &self,
        author: Uuid,
        student_id: Uuid,
        body_text: &str,
        rating: Option<u8>,
        image: Option<ImageRef>,
    ) -> Result<Report> {
        let body_text = body_text.trim().to_string();
        if body_text.is_empty() {
            return Err(PortalError::Validation("report body must not be empty".into()));
        }
        validate_rating(rating)?;

        let db = self.db.clone();
        let student_row = task::blocking(move || Ok(db.get_student(&student_id.to_string())?))
            .await?
            .ok_or(PortalError::NotFound)?;
        let student = student_row.into_model()?;
        if student.owner_user_id != author {
            warn!(
                "User {} attempted to report on student {} owned by {}",
                author, student_id, student.owner_user_id
            );
            return Err(PortalError::Forbidden);
        }

        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let db = self.db.clone();
        {
            let body_text = body_text.clone();
            let image = image.clone();
            task::blocking(move || {
                db.insert_report(
                    &id.to_string(),
                    &student_id.to_string(),
                    &author.to_string(),
                    &body_text,
                    rating,
                    &ImageColumns::from_ref(image.as_ref()),
                    SendStatus::Draft.as_str(),
                    &created_at.to_rfc3339(),
                )?;
                Ok(())
            })
            .await?;
        }
        info!("Report {} created for student {}", id, student_id);

        Ok(Report {
            id,
            student_id,
            author_user_id: author,
            body_text,
            rating,
            image,
            send_status: SendStatus::Draft,
            last_send_error: None,
            sent_at: None,
            created_at,
        })
    }

    pub async fn get(&self, owner: Uuid, report_id: Uuid) -> Result<Report> {
        let db = self.db.clone();
        let row = task::blocking(move || Ok(db.get_report(&report_id.to_string())?))
            .await?
            .ok_or(PortalError::NotFound)?;
        let report = row.into_model()?;
        if report.author_user_id != owner {
            warn!(
                "User {} attempted to access report {} authored by {}",
                owner, report_id, report.author_user_id
            );
            return Err(PortalError::Forbidden);
        }
        Ok(report)
    }

    /// Author's reports, most recent first, optionally narrowed to one
    /// student and/or one status.
    pub async fn list(
        &self,
        owner: Uuid,
        student_id: Option<Uuid>,
        status: Option<SendStatus>,
    ) -> Result<Vec<Report>> {
        let db = self.db.clone();
        let rows = task::blocking(move || {
            let student_id = student_id.map(|id| id.to_string());
            Ok(db.list_reports(
                &owner.to_string(),
                student_id.as_deref(),
                status.map(|s| s.as_str()),
            )?)
        })
        .await?;
        rows.into_iter()
            .map(|row| row.into_model().map_err(PortalError::from))
            .collect()
    }

    /// Sent reports are append-only: any content edit fails `Conflict`.
    pub async fn update(&self, owner: Uuid, report_id: Uuid, patch: ReportPatch) -> Result<Report> {
        let current = self.get(owner, report_id).await?;
        if current.send_status == SendStatus::Sent {
            return Err(PortalError::Conflict(
                "a sent report can no longer be edited".into(),
            ));
        }

        let body_text = match &patch.body_text {
            Some(body) => {
                let body = body.trim();
                if body.is_empty() {
                    return Err(PortalError::Validation("report body must not be empty".into()));
                }
                body.to_string()
            }
            None => current.body_text.clone(),
        };

        let rating = match patch.rating {
            Some(r) => {
                validate_rating(Some(r))?;
                Some(r)
            }
            None => current.rating,
        };

        let (image, orphaned) = match patch.image {
            ImagePatch::Keep => (current.image.clone(), None),
            ImagePatch::Clear => (None, current.image.clone()),
            ImagePatch::Replace(new_image) => (Some(new_image), current.image.clone()),
        };

        let db = self.db.clone();
        let n = {
            let body_text = body_text.clone();
            let image = image.clone();
            task::blocking(move || {
                Ok(db.update_report_content(
                    &report_id.to_string(),
                    &body_text,
                    rating,
                    &ImageColumns::from_ref(image.as_ref()),
                )?)
            })
            .await?
        };
        if n == 0 {
            // Raced a concurrent send; the report flipped to sent between
            // our read and the guarded write.
            return Err(PortalError::Conflict(
                "a sent report can no longer be edited".into(),
            ));
        }

        if let Some(ImageRef::Uploaded { storage_path, .. }) = orphaned {
            self.storage.remove(&storage_path).await;
        }

        self.get(owner, report_id).await
    }

    /// Attach freshly uploaded bytes as the report's image.
    pub async fn attach_upload(
        &self,
        owner: Uuid,
        report_id: Uuid,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<Report> {
        let image = images::resolve_upload(&self.storage, bytes, content_type).await?;
        let stored_name = match &image {
            ImageRef::Uploaded { storage_path, .. } => Some(storage_path.clone()),
            ImageRef::External { .. } => None,
        };

        let result = self
            .update(
                owner,
                report_id,
                ReportPatch {
                    image: ImagePatch::Replace(image),
                    ..ReportPatch::default()
                },
            )
            .await;

        // The attach failed (missing report, sent report); don't leave
        // the fresh upload stranded on disk.
        if result.is_err()
            && let Some(name) = stored_name
        {
            self.storage.remove(&name).await;
        }
        result
    }

    /// Idempotent like student deletion; an uploaded image is removed
    /// best-effort alongside the row.
    pub async fn delete(&self, owner: Uuid, report_id: Uuid) -> Result<()> {
        let db = self.db.clone();
        let row = task::blocking(move || Ok(db.get_report(&report_id.to_string())?)).await?;
        let report = match row {
            None => return Ok(()),
            Some(row) => row.into_model()?,
        };
        if report.author_user_id != owner {
            warn!(
                "User {} attempted to delete report {} authored by {}",
                owner, report_id, report.author_user_id
            );
            return Err(PortalError::Forbidden);
        }

        let db = self.db.clone();
        task::blocking(move || {
            db.delete_report(&report_id.to_string())?;
            Ok(())
        })
        .await?;
        if let Some(ImageRef::Uploaded { storage_path, .. }) = report.image {
            self.storage.remove(&storage_path).await;
        }
        Ok(())
    }
}

fn validate_rating(rating: Option<u8>) -> Result<()> {
    match rating {
        Some(r) if !(1..=5).contains(&r) => Err(PortalError::Validation(format!(
            "rating must be between 1 and 5, got {}",
            r
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::students::StudentRegistry;
    use crate::testutil::{scratch_env, seed_user};

    async fn setup() -> (
        tempfile::TempDir,
        Arc<Database>,
        Arc<UploadStorage>,
        ReportStore,
        Uuid,
        Uuid,
    ) {
        let (dir, db, storage) = scratch_env().await;
        let owner = seed_user(&db, "staff@example.com");
        let student = StudentRegistry::new(db.clone())
            .create(owner.id, "Alice Doe", "alice@example.com")
            .await
            .unwrap();
        let store = ReportStore::new(db.clone(), storage.clone());
        (dir, db, storage, store, owner.id, student.id)
    }

    #[tokio::test]
    async fn create_requires_live_owned_student() {
        let (_dir, db, _storage, store, owner, student) = setup().await;

        let report = store
            .create(owner, student, "Great day", None, None)
            .await
            .unwrap();
        assert_eq!(report.send_status, SendStatus::Draft);

        // Unknown student
        assert!(matches!(
            store.create(owner, Uuid::new_v4(), "body", None, None).await,
            Err(PortalError::NotFound)
        ));

        // Someone else's student
        let other = seed_user(&db, "other@example.com");
        assert!(matches!(
            store.create(other.id, student, "body", None, None).await,
            Err(PortalError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn rating_is_validated_and_persisted() {
        let (_dir, _db, _storage, store, owner, student) = setup().await;

        for bad in [0, 6, 200] {
            assert!(matches!(
                store.create(owner, student, "body", Some(bad), None).await,
                Err(PortalError::Validation(_))
            ));
        }

        let report = store
            .create(owner, student, "body", Some(4), None)
            .await
            .unwrap();
        assert_eq!(report.rating, Some(4));
        let fetched = store.get(owner, report.id).await.unwrap();
        assert_eq!(fetched.rating, Some(4));

        // An update without a rating keeps the stored one.
        let patched = store
            .update(
                owner,
                report.id,
                ReportPatch {
                    body_text: Some("better".into()),
                    ..ReportPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(patched.rating, Some(4));

        let rerated = store
            .update(
                owner,
                report.id,
                ReportPatch {
                    rating: Some(2),
                    ..ReportPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rerated.rating, Some(2));

        let err = store
            .update(
                owner,
                report.id,
                ReportPatch {
                    rating: Some(9),
                    ..ReportPatch::default()
                },
            )
            .await;
        assert!(matches!(err, Err(PortalError::Validation(_))));
    }

    #[tokio::test]
    async fn update_succeeds_for_draft_and_failed_but_not_sent() {
        let (_dir, db, _storage, store, owner, student) = setup().await;

        let report = store
            .create(owner, student, "first", None, None)
            .await
            .unwrap();

        let patched = store
            .update(
                owner,
                report.id,
                ReportPatch {
                    body_text: Some("second".into()),
                    ..ReportPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(patched.body_text, "second");

        db.mark_report_failed(&report.id.to_string(), "relay refused")
            .unwrap();
        store
            .update(
                owner,
                report.id,
                ReportPatch {
                    body_text: Some("third".into()),
                    ..ReportPatch::default()
                },
            )
            .await
            .unwrap();

        db.mark_report_sent(&report.id.to_string(), &Utc::now().to_rfc3339())
            .unwrap();
        let err = store
            .update(
                owner,
                report.id,
                ReportPatch {
                    body_text: Some("fourth".into()),
                    ..ReportPatch::default()
                },
            )
            .await;
        assert!(matches!(err, Err(PortalError::Conflict(_))));
    }

    #[tokio::test]
    async fn replacing_an_upload_orphans_the_old_file() {
        let (_dir, _db, storage, store, owner, student) = setup().await;

        let report = store
            .create(owner, student, "body", None, None)
            .await
            .unwrap();
        let with_image = store
            .attach_upload(owner, report.id, b"png bytes", "image/png")
            .await
            .unwrap();
        let Some(ImageRef::Uploaded { storage_path: first, .. }) = with_image.image.clone() else {
            panic!("expected an uploaded image");
        };
        assert!(storage.read(&first).await.unwrap().is_some());

        let replaced = store
            .attach_upload(owner, report.id, b"webp bytes", "image/webp")
            .await
            .unwrap();
        let Some(ImageRef::Uploaded { storage_path: second, .. }) = replaced.image else {
            panic!("expected an uploaded image");
        };

        assert_ne!(first, second);
        assert!(storage.read(&first).await.unwrap().is_none());
        assert!(storage.read(&second).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_filters_by_student_and_status() {
        let (_dir, db, _storage, store, owner, student) = setup().await;
        let other_student = StudentRegistry::new(db.clone())
            .create(owner, "Bob", "bob@example.com")
            .await
            .unwrap();

        let r1 = store.create(owner, student, "one", None, None).await.unwrap();
        let r2 = store
            .create(owner, other_student.id, "two", None, None)
            .await
            .unwrap();
        db.mark_report_failed(&r2.id.to_string(), "boom").unwrap();

        let all = store.list(owner, None, None).await.unwrap();
        // Most recent first.
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![r2.id, r1.id]);

        let for_student = store.list(owner, Some(student), None).await.unwrap();
        assert_eq!(for_student.len(), 1);
        assert_eq!(for_student[0].id, r1.id);

        let failed = store.list(owner, None, Some(SendStatus::Failed)).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, r2.id);
    }
}
