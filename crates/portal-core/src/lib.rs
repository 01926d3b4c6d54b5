pub mod config;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod images;
pub mod mailer;
pub mod oauth;
pub mod reports;
pub mod students;

pub use error::PortalError;

pub(crate) mod task {
    use crate::error::{PortalError, Result};

    /// Run a blocking database closure off the async runtime. rusqlite
    /// calls hold the connection mutex for their duration, so they go
    /// through here rather than blocking an executor thread.
    pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| PortalError::Internal(anyhow::anyhow!("blocking task join: {}", e)))?
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use portal_db::Database;
    use portal_types::models::User;
    use uuid::Uuid;

    use crate::images::UploadStorage;

    /// Scratch database plus upload directory; the TempDir must stay
    /// alive for the duration of the test.
    pub async fn scratch_env() -> (tempfile::TempDir, Arc<Database>, Arc<UploadStorage>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("portal.db")).unwrap());
        let storage = Arc::new(UploadStorage::new(dir.path().join("uploads")).await.unwrap());
        (dir, db, storage)
    }

    pub fn seed_user(db: &Database, email: &str) -> User {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        db.create_user(&id.to_string(), email, "Staff", "dev", &now.to_rfc3339())
            .unwrap();
        db.get_user_by_id(&id.to_string())
            .unwrap()
            .unwrap()
            .into_model()
            .unwrap()
    }
}
