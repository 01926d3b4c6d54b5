use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id           TEXT PRIMARY KEY,
            email        TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            auth_source  TEXT NOT NULL,
            created_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS students (
            id            TEXT PRIMARY KEY,
            owner_user_id TEXT NOT NULL REFERENCES users(id),
            name          TEXT NOT NULL,
            email         TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_students_owner
            ON students(owner_user_id, created_at);

        -- No foreign key on student_id: deleting a student leaves its
        -- reports behind as orphans, which are rejected at send time.
        CREATE TABLE IF NOT EXISTS reports (
            id                 TEXT PRIMARY KEY,
            student_id         TEXT NOT NULL,
            author_user_id     TEXT NOT NULL REFERENCES users(id),
            body_text          TEXT NOT NULL,
            rating             INTEGER,
            image_kind         TEXT,
            image_url          TEXT,
            image_path         TEXT,
            image_content_type TEXT,
            send_status        TEXT NOT NULL DEFAULT 'draft',
            last_send_error    TEXT,
            sent_at            TEXT,
            created_at         TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reports_author
            ON reports(author_user_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_reports_student
            ON reports(student_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
