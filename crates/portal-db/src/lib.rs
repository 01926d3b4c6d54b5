//! SQLite persistence for the portal. One bundled-SQLite connection
//! serves the whole process, serialized behind a mutex; the async
//! layers above run their queries on blocking tasks so the lock is
//! never held on a runtime thread.

pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database file, creating and migrating it as needed.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("could not open database at {}", path.display()))?;

        // WAL lets readers proceed while a write is in flight; the busy
        // timeout rides out another process still holding the file.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        migrations::run(&conn)?;
        info!("Database ready at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("connection mutex poisoned: {}", e))?;
        f(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopening_an_existing_file_keeps_its_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portal.db");
        let now = chrono::Utc::now().to_rfc3339();

        let db = Database::open(&path).unwrap();
        db.create_user("u1", "staff@example.com", "Staff", "dev", &now)
            .unwrap();
        drop(db);

        // Migrations are idempotent over an already-migrated file.
        let db = Database::open(&path).unwrap();
        let row = db.get_user_by_email("staff@example.com").unwrap().unwrap();
        assert_eq!(row.id, "u1");
    }
}
