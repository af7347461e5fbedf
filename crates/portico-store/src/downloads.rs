//! The download ledger and the accounting transaction that feeds it.
//!
//! [`Database::record_download`] is the only writer of the catalog's
//! download counter and the only appender to the ledger, and it does both
//! inside one SQLite transaction.  The counter therefore always equals the
//! number of ledger entries for the document, no matter how many callers
//! record downloads of it at once.

use chrono::{DateTime, Utc};
use rusqlite::{params, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{DownloadLogEntry, UserProfile};

/// Ledger page size used when the caller does not pick one.
pub const DEFAULT_RECENT_LIMIT: u32 = 100;

/// Bounded attempts for the accounting transaction before the conflict is
/// surfaced to the caller.
const MAX_ATTEMPTS: u32 = 5;

impl Database {
    /// Record one download: increment the document's counter and append a
    /// ledger entry, atomically.
    ///
    /// `document_title` is the snapshot the caller captured before invoking
    /// this; it is written as-is, not re-read, so the ledger keeps the
    /// title as it was at click time.  The student's name and program are
    /// denormalized onto the entry the same way.
    ///
    /// If the document does not exist the whole operation aborts with
    /// [`StoreError::NotFound`] and neither collection is touched.  A lost
    /// write lock restarts the sequence from the counter read, up to 5
    /// attempts; exhaustion surfaces
    /// [`StoreError::ConflictRetriesExhausted`].
    pub fn record_download(
        &mut self,
        document_id: Uuid,
        student: &UserProfile,
        document_title: &str,
    ) -> Result<()> {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_record_download(document_id, student, document_title) {
                Ok(new_count) => {
                    tracing::debug!(
                        document_id = %document_id,
                        student = %student.uid,
                        new_count,
                        "download recorded"
                    );
                    return Ok(());
                }
                Err(StoreError::Sqlite(e)) if is_busy(&e) => {
                    tracing::debug!(
                        document_id = %document_id,
                        attempt,
                        "accounting transaction lost the write lock, retrying"
                    );
                }
                Err(other) => return Err(other),
            }
        }
        Err(StoreError::ConflictRetriesExhausted(MAX_ATTEMPTS))
    }

    fn try_record_download(
        &mut self,
        document_id: Uuid,
        student: &UserProfile,
        document_title: &str,
    ) -> Result<i64> {
        // Immediate mode takes the write lock up front, so the counter read
        // below cannot be invalidated by a concurrent writer.
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let new_count = increment_download_count(&tx, document_id)?;

        tx.execute(
            "INSERT INTO downloads (id, document_id, document_title, student_id,
                                    student_name, student_program, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Uuid::new_v4().to_string(),
                document_id.to_string(),
                document_title,
                student.uid,
                student.display_name,
                student.program,
                Utc::now().to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        Ok(new_count)
    }

    /// List the most recent ledger entries, newest first, bounded to
    /// `limit` rows.
    pub fn list_recent_downloads(&self, limit: u32) -> Result<Vec<DownloadLogEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, document_id, document_title, student_id, student_name,
                    student_program, timestamp
             FROM downloads
             ORDER BY timestamp DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], row_to_entry)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

/// Read the current counter and write the incremented value.
///
/// Only the accounting transaction calls this; it is not part of the public
/// surface, so presentation code cannot bump the counter without also
/// appending a ledger entry.
fn increment_download_count(tx: &Transaction<'_>, document_id: Uuid) -> Result<i64> {
    let current: i64 = tx
        .query_row(
            "SELECT download_count FROM documents WHERE id = ?1",
            params![document_id.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Sqlite(other),
        })?;

    let new_count = current + 1;
    tx.execute(
        "UPDATE documents SET download_count = ?2 WHERE id = ?1",
        params![document_id.to_string(), new_count],
    )?;
    Ok(new_count)
}

/// Whether the error is SQLite reporting write-lock contention.
fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`DownloadLogEntry`].
fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<DownloadLogEntry> {
    let id_str: String = row.get(0)?;
    let document_id_str: String = row.get(1)?;
    let document_title: String = row.get(2)?;
    let student_id: String = row.get(3)?;
    let student_name: String = row.get(4)?;
    let student_program: Option<String> = row.get(5)?;
    let ts_str: String = row.get(6)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let document_id = Uuid::parse_str(&document_id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(DownloadLogEntry {
        id,
        document_id,
        document_title,
        student_id,
        student_name,
        student_program,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountStatus, NewDocument, Role};

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    fn student(uid: &str) -> UserProfile {
        UserProfile {
            uid: uid.into(),
            email: format!("{uid}@example.edu"),
            display_name: format!("Student {uid}"),
            photo_url: None,
            role: Role::Student,
            status: AccountStatus::Active,
            program: Some("BSCS".into()),
            created_at: Utc::now(),
            last_login: Utc::now(),
        }
    }

    fn sample_document(db: &Database, title: &str) -> crate::Document {
        db.insert_document(&NewDocument {
            title: title.into(),
            description: String::new(),
            category: "Memo".into(),
            file_url: "/files/sample.pdf".into(),
            file_type: "application/pdf".into(),
            uploaded_by: "uid-adm".into(),
        })
        .unwrap()
    }

    fn ledger_rows_for(db: &Database, document_id: Uuid) -> i64 {
        db.conn()
            .query_row(
                "SELECT COUNT(*) FROM downloads WHERE document_id = ?1",
                params![document_id.to_string()],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn missing_document_aborts_without_writes() {
        let (mut db, _dir) = test_db();

        let result = db.record_download(Uuid::new_v4(), &student("s1"), "Ghost");
        assert!(matches!(result, Err(StoreError::NotFound)));

        let total: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM downloads", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn counter_equals_ledger_after_sequential_downloads() {
        let (mut db, _dir) = test_db();
        let doc = sample_document(&db, "Handbook");

        for i in 0..5 {
            db.record_download(doc.id, &student(&format!("s{i}")), &doc.title)
                .unwrap();
        }

        let fetched = db.get_document(doc.id).unwrap();
        assert_eq!(fetched.download_count, 5);
        assert_eq!(ledger_rows_for(&db, doc.id), 5);
    }

    #[test]
    fn counter_equals_ledger_under_concurrent_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let doc = {
            let db = Database::open_at(&path).unwrap();
            sample_document(&db, "Popular Form")
        };

        const THREADS: usize = 10;
        const PER_THREAD: usize = 10;

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let path = path.clone();
                let doc_id = doc.id;
                std::thread::spawn(move || {
                    let mut db = Database::open_at(&path).unwrap();
                    let profile = student(&format!("s{t}"));
                    for _ in 0..PER_THREAD {
                        db.record_download(doc_id, &profile, "Popular Form").unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        let fetched = db.get_document(doc.id).unwrap();
        assert_eq!(fetched.download_count, (THREADS * PER_THREAD) as i64);
        assert_eq!(ledger_rows_for(&db, doc.id), (THREADS * PER_THREAD) as i64);
    }

    #[test]
    fn ledger_keeps_title_snapshot_across_edits() {
        let (mut db, _dir) = test_db();
        let doc = sample_document(&db, "Old Title");

        db.record_download(doc.id, &student("s1"), "Old Title").unwrap();
        db.update_document_metadata(doc.id, "New Title", "", "Memo")
            .unwrap();

        let entries = db.list_recent_downloads(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].document_title, "Old Title");
        assert_eq!(db.get_document(doc.id).unwrap().title, "New Title");
    }

    #[test]
    fn entry_denormalizes_student_fields() {
        let (mut db, _dir) = test_db();
        let doc = sample_document(&db, "Curriculum Map");

        let profile = student("s9");
        db.record_download(doc.id, &profile, &doc.title).unwrap();

        let entries = db.list_recent_downloads(1).unwrap();
        assert_eq!(entries[0].student_id, "s9");
        assert_eq!(entries[0].student_name, "Student s9");
        assert_eq!(entries[0].student_program.as_deref(), Some("BSCS"));
    }

    #[test]
    fn recent_listing_is_bounded_and_newest_first() {
        let (mut db, _dir) = test_db();
        let doc = sample_document(&db, "Bulletin");

        for i in 0..120 {
            db.record_download(doc.id, &student(&format!("s{i}")), &doc.title)
                .unwrap();
        }

        let entries = db.list_recent_downloads(DEFAULT_RECENT_LIMIT).unwrap();
        assert_eq!(entries.len(), DEFAULT_RECENT_LIMIT as usize);
        for pair in entries.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }
}
