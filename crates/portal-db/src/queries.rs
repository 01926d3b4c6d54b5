use crate::Database;
use crate::models::{ImageColumns, ReportRow, StudentRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, types::ToSql};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        display_name: &str,
        auth_source: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, display_name, auth_source, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, email, display_name, auth_source, created_at),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, display_name, auth_source, created_at
                 FROM users WHERE email = ?1",
            )?;
            stmt.query_row([email], user_from_row).optional()
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, display_name, auth_source, created_at
                 FROM users WHERE id = ?1",
            )?;
            stmt.query_row([id], user_from_row).optional()
        })
    }

    pub fn update_user_display_name(&self, id: &str, display_name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET display_name = ?2 WHERE id = ?1",
                (id, display_name),
            )?;
            Ok(())
        })
    }

    // -- Students --

    pub fn insert_student(
        &self,
        id: &str,
        owner_user_id: &str,
        name: &str,
        email: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO students (id, owner_user_id, name, email, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, owner_user_id, name, email, created_at),
            )?;
            Ok(())
        })
    }

    pub fn get_student(&self, id: &str) -> Result<Option<StudentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_user_id, name, email, created_at
                 FROM students WHERE id = ?1",
            )?;
            stmt.query_row([id], student_from_row).optional()
        })
    }

    /// Students owned by a user, insertion order. An optional filter
    /// matches case-insensitively against name and email.
    pub fn list_students(&self, owner_user_id: &str, filter: Option<&str>) -> Result<Vec<StudentRow>> {
        self.with_conn(|conn| {
            let rows = match filter {
                Some(q) => {
                    let pattern = format!("%{}%", q.to_lowercase());
                    let mut stmt = conn.prepare(
                        "SELECT id, owner_user_id, name, email, created_at
                         FROM students
                         WHERE owner_user_id = ?1
                           AND (lower(name) LIKE ?2 OR lower(email) LIKE ?2)
                         ORDER BY created_at ASC, id ASC",
                    )?;
                    collect_students(&mut stmt, rusqlite::params![owner_user_id, pattern])?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, owner_user_id, name, email, created_at
                         FROM students
                         WHERE owner_user_id = ?1
                         ORDER BY created_at ASC, id ASC",
                    )?;
                    collect_students(&mut stmt, rusqlite::params![owner_user_id])?
                }
            };
            Ok(rows)
        })
    }

    pub fn update_student(&self, id: &str, name: &str, email: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE students SET name = ?2, email = ?3 WHERE id = ?1",
                (id, name, email),
            )?;
            Ok(n)
        })
    }

    /// Returns the number of rows removed; 0 means the id did not exist.
    pub fn delete_student(&self, id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM students WHERE id = ?1", [id])?;
            Ok(n)
        })
    }

    // -- Reports --

    #[allow(clippy::too_many_arguments)]
    pub fn insert_report(
        &self,
        id: &str,
        student_id: &str,
        author_user_id: &str,
        body_text: &str,
        rating: Option<u8>,
        image: &ImageColumns,
        send_status: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reports
                   (id, student_id, author_user_id, body_text, rating,
                    image_kind, image_url, image_path, image_content_type,
                    send_status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    id,
                    student_id,
                    author_user_id,
                    body_text,
                    rating,
                    image.kind,
                    image.url,
                    image.path,
                    image.content_type,
                    send_status,
                    created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_report(&self, id: &str) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"
            ))?;
            stmt.query_row([id], report_from_row).optional()
        })
    }

    /// Reports authored by a user, most recent first (ties broken by id
    /// ascending so the ordering is stable under concurrent creates).
    pub fn list_reports(
        &self,
        author_user_id: &str,
        student_id: Option<&str>,
        send_status: Option<&str>,
    ) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| {
            let mut sql = format!(
                "SELECT {REPORT_COLUMNS} FROM reports WHERE author_user_id = ?1"
            );
            let mut params: Vec<&dyn ToSql> = vec![&author_user_id];

            if let Some(ref sid) = student_id {
                params.push(sid);
                sql.push_str(&format!(" AND student_id = ?{}", params.len()));
            }
            if let Some(ref status) = send_status {
                params.push(status);
                sql.push_str(&format!(" AND send_status = ?{}", params.len()));
            }
            sql.push_str(" ORDER BY created_at DESC, id ASC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), report_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Rewrites body, rating and image, but only while the report is
    /// still editable. Returns 0 when the row is missing or already sent.
    pub fn update_report_content(
        &self,
        id: &str,
        body_text: &str,
        rating: Option<u8>,
        image: &ImageColumns,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE reports
                 SET body_text = ?2, rating = ?3,
                     image_kind = ?4, image_url = ?5,
                     image_path = ?6, image_content_type = ?7
                 WHERE id = ?1 AND send_status != 'sent'",
                rusqlite::params![
                    id,
                    body_text,
                    rating,
                    image.kind,
                    image.url,
                    image.path,
                    image.content_type,
                ],
            )?;
            Ok(n)
        })
    }

    pub fn mark_report_sent(&self, id: &str, sent_at: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE reports
                 SET send_status = 'sent', sent_at = ?2, last_send_error = NULL
                 WHERE id = ?1 AND send_status != 'sent'",
                (id, sent_at),
            )?;
            Ok(n)
        })
    }

    pub fn mark_report_failed(&self, id: &str, error: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE reports
                 SET send_status = 'failed', last_send_error = ?2
                 WHERE id = ?1 AND send_status != 'sent'",
                (id, error),
            )?;
            Ok(n)
        })
    }

    pub fn delete_report(&self, id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM reports WHERE id = ?1", [id])?;
            Ok(n)
        })
    }
}

const REPORT_COLUMNS: &str = "id, student_id, author_user_id, body_text, rating, \
     image_kind, image_url, image_path, image_content_type, \
     send_status, last_send_error, sent_at, created_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        auth_source: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn student_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn report_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get(0)?,
        student_id: row.get(1)?,
        author_user_id: row.get(2)?,
        body_text: row.get(3)?,
        rating: row.get(4)?,
        image_kind: row.get(5)?,
        image_url: row.get(6)?,
        image_path: row.get(7)?,
        image_content_type: row.get(8)?,
        send_status: row.get(9)?,
        last_send_error: row.get(10)?,
        sent_at: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn collect_students(
    stmt: &mut rusqlite::Statement<'_>,
    params: impl rusqlite::Params,
) -> Result<Vec<StudentRow>> {
    let rows = stmt
        .query_map(params, student_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use portal_types::models::ImageRef;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("portal.db")).unwrap();
        (dir, db)
    }

    fn seed_user(db: &Database) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        db.create_user(
            &id,
            "staff@example.com",
            "Staff",
            "dev",
            &chrono::Utc::now().to_rfc3339(),
        )
        .unwrap();
        id
    }

    #[test]
    fn user_roundtrip_by_email() {
        let (_dir, db) = open_db();
        let id = seed_user(&db);

        let row = db.get_user_by_email("staff@example.com").unwrap().unwrap();
        assert_eq!(row.id, id);
        let user = row.into_model().unwrap();
        assert_eq!(user.display_name, "Staff");
    }

    #[test]
    fn report_image_columns_roundtrip() {
        let (_dir, db) = open_db();
        let owner = seed_user(&db);
        let now = chrono::Utc::now().to_rfc3339();

        let sid = uuid::Uuid::new_v4().to_string();
        db.insert_student(&sid, &owner, "Alice Doe", "alice@example.com", &now)
            .unwrap();

        let rid = uuid::Uuid::new_v4().to_string();
        let image = ImageRef::Uploaded {
            storage_path: "abc.png".into(),
            content_type: "image/png".into(),
        };
        db.insert_report(
            &rid,
            &sid,
            &owner,
            "Great day",
            Some(4),
            &ImageColumns::from_ref(Some(&image)),
            "draft",
            &now,
        )
        .unwrap();

        let report = db.get_report(&rid).unwrap().unwrap().into_model().unwrap();
        assert_eq!(report.image, Some(image));
        assert_eq!(report.body_text, "Great day");
        assert_eq!(report.rating, Some(4));
    }

    #[test]
    fn mark_sent_is_terminal() {
        let (_dir, db) = open_db();
        let owner = seed_user(&db);
        let now = chrono::Utc::now().to_rfc3339();
        let rid = uuid::Uuid::new_v4().to_string();
        db.insert_report(
            &rid,
            &uuid::Uuid::new_v4().to_string(),
            &owner,
            "body",
            None,
            &ImageColumns::from_ref(None),
            "draft",
            &now,
        )
        .unwrap();

        assert_eq!(db.mark_report_sent(&rid, &now).unwrap(), 1);
        // Already sent: neither a failure nor content edits land.
        assert_eq!(db.mark_report_failed(&rid, "late error").unwrap(), 0);
        assert_eq!(
            db.update_report_content(&rid, "edit", None, &ImageColumns::from_ref(None))
                .unwrap(),
            0
        );
    }
}
