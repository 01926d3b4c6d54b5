use std::sync::Arc;

use chrono::Utc;
use portal_db::Database;
use portal_types::models::Student;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PortalError, Result};
use crate::task;

/// CRUD over a user's student roster. Every operation takes the owner
/// explicitly; a record that belongs to someone else surfaces as
/// `Forbidden`, which the HTTP layer collapses into not-found.
pub struct StudentRegistry {
    db: Arc<Database>,
}

impl StudentRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn create(&self, owner: Uuid, name: &str, email: &str) -> Result<Student> {
        let name = name.trim().to_string();
        let email = email.trim().to_string();
        validate_student(&name, &email)?;

        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let db = self.db.clone();
        {
            let (name, email) = (name.clone(), email.clone());
            task::blocking(move || {
                db.insert_student(
                    &id.to_string(),
                    &owner.to_string(),
                    &name,
                    &email,
                    &created_at.to_rfc3339(),
                )?;
                Ok(())
            })
            .await?;
        }
        info!("Student {} registered by {}", id, owner);

        Ok(Student {
            id,
            owner_user_id: owner,
            name,
            email,
            created_at,
        })
    }

    /// Owner's roster in insertion order, optionally filtered by a
    /// case-insensitive substring over name and email.
    pub async fn list(&self, owner: Uuid, filter: Option<&str>) -> Result<Vec<Student>> {
        let filter = filter
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        let db = self.db.clone();
        let rows = task::blocking(move || {
            Ok(db.list_students(&owner.to_string(), filter.as_deref())?)
        })
        .await?;
        rows.into_iter()
            .map(|row| row.into_model().map_err(PortalError::from))
            .collect()
    }

    pub async fn get(&self, owner: Uuid, student_id: Uuid) -> Result<Student> {
        let db = self.db.clone();
        let row = task::blocking(move || Ok(db.get_student(&student_id.to_string())?))
            .await?
            .ok_or(PortalError::NotFound)?;
        let student = row.into_model()?;
        if student.owner_user_id != owner {
            warn!(
                "User {} attempted to access student {} owned by {}",
                owner, student_id, student.owner_user_id
            );
            return Err(PortalError::Forbidden);
        }
        Ok(student)
    }

    pub async fn update(
        &self,
        owner: Uuid,
        student_id: Uuid,
        name: &str,
        email: &str,
    ) -> Result<Student> {
        let name = name.trim().to_string();
        let email = email.trim().to_string();
        validate_student(&name, &email)?;

        // Ownership check first; the update itself is unconditional.
        let mut student = self.get(owner, student_id).await?;
        let db = self.db.clone();
        {
            let (name, email) = (name.clone(), email.clone());
            task::blocking(move || {
                db.update_student(&student_id.to_string(), &name, &email)?;
                Ok(())
            })
            .await?;
        }
        student.name = name;
        student.email = email;
        Ok(student)
    }

    /// Idempotent: deleting an id that no longer exists is a success, so
    /// double submits from the web client stay harmless. Reports that
    /// referenced the student remain as orphans and are rejected at send
    /// time.
    pub async fn delete(&self, owner: Uuid, student_id: Uuid) -> Result<()> {
        let db = self.db.clone();
        let row = task::blocking(move || Ok(db.get_student(&student_id.to_string())?)).await?;
        match row {
            None => Ok(()),
            Some(row) => {
                let student = row.into_model()?;
                if student.owner_user_id != owner {
                    warn!(
                        "User {} attempted to delete student {} owned by {}",
                        owner, student_id, student.owner_user_id
                    );
                    return Err(PortalError::Forbidden);
                }
                let db = self.db.clone();
                task::blocking(move || {
                    db.delete_student(&student_id.to_string())?;
                    Ok(())
                })
                .await?;
                info!("Student {} deleted by {}", student_id, owner);
                Ok(())
            }
        }
    }
}

fn validate_student(name: &str, email: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PortalError::Validation("student name must not be empty".into()));
    }
    validate_email(email)
}

/// Exactly one `@` with non-empty local and domain parts.
pub(crate) fn validate_email(email: &str) -> Result<()> {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(PortalError::Validation(format!(
            "'{}' is not a valid email address",
            email
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{scratch_env, seed_user};

    #[tokio::test]
    async fn create_then_get_roundtrip() {
        let (_dir, db, _storage) = scratch_env().await;
        let owner = seed_user(&db, "staff@example.com");
        let registry = StudentRegistry::new(db);

        let created = registry
            .create(owner.id, "Alice Doe", "alice@example.com")
            .await
            .unwrap();
        let fetched = registry.get(owner.id, created.id).await.unwrap();

        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.name, "Alice Doe");
        assert_eq!(fetched.email, "alice@example.com");
    }

    #[tokio::test]
    async fn rejects_empty_name_and_malformed_email() {
        let (_dir, db, _storage) = scratch_env().await;
        let owner = seed_user(&db, "staff@example.com");
        let registry = StudentRegistry::new(db);

        for (name, email) in [
            ("", "alice@example.com"),
            ("Alice", "no-at-sign"),
            ("Alice", "@example.com"),
            ("Alice", "alice@"),
            ("Alice", "alice@@example.com"),
        ] {
            assert!(
                matches!(
                    registry.create(owner.id, name, email).await,
                    Err(PortalError::Validation(_))
                ),
                "expected validation failure for {:?}/{:?}",
                name,
                email
            );
        }
    }

    #[tokio::test]
    async fn cross_owner_access_is_forbidden() {
        let (_dir, db, _storage) = scratch_env().await;
        let owner = seed_user(&db, "a@example.com");
        let other = seed_user(&db, "b@example.com");
        let registry = StudentRegistry::new(db);

        let student = registry
            .create(owner.id, "Alice", "alice@example.com")
            .await
            .unwrap();

        assert!(matches!(
            registry.get(other.id, student.id).await,
            Err(PortalError::Forbidden)
        ));
        assert!(matches!(
            registry.delete(other.id, student.id).await,
            Err(PortalError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, db, _storage) = scratch_env().await;
        let owner = seed_user(&db, "staff@example.com");
        let registry = StudentRegistry::new(db);

        let student = registry
            .create(owner.id, "Alice", "alice@example.com")
            .await
            .unwrap();

        registry.delete(owner.id, student.id).await.unwrap();
        // Second delete of the same id, and a delete of a never-existing
        // id, are both no-op successes.
        registry.delete(owner.id, student.id).await.unwrap();
        registry.delete(owner.id, Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn list_preserves_insertion_order_and_filters() {
        let (_dir, db, _storage) = scratch_env().await;
        let owner = seed_user(&db, "staff@example.com");
        let registry = StudentRegistry::new(db);

        let a = registry
            .create(owner.id, "Alice", "alice@example.com")
            .await
            .unwrap();
        let b = registry.create(owner.id, "Bob", "bob@example.com").await.unwrap();

        let all = registry.list(owner.id, None).await.unwrap();
        assert_eq!(all.iter().map(|s| s.id).collect::<Vec<_>>(), vec![a.id, b.id]);

        let filtered = registry.list(owner.id, Some("bOb")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, b.id);
    }
}
