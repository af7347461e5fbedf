//! Account directory operations for [`UserProfile`] records.
//!
//! Authorization note: none of these operations check the caller's
//! privileges.  Gating mutations behind [`Database::is_admin`] is the
//! calling boundary's documented responsibility.
//!
//! [`Database::is_admin`]: crate::Database::is_admin

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{AccountStatus, ProfilePatch, Role, UserProfile};

impl Database {
    /// Fetch a single profile by uid.  No side effects.
    pub fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        self.conn()
            .query_row(
                "SELECT uid, email, display_name, photo_url, role, status, program,
                        created_at, last_login
                 FROM users
                 WHERE uid = ?1",
                params![uid],
                row_to_profile,
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    /// Create or update a profile.
    ///
    /// On first touch the profile is created with `role = student`,
    /// `status = active` and both timestamps set to the server clock, then
    /// the patch is overlaid.  On later calls the patch is overlaid onto
    /// the existing fields and `last_login` is refreshed; fields the patch
    /// leaves unset are untouched.  Calling twice with the same patch
    /// yields the same terminal state.
    pub fn upsert_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<()> {
        let now = Utc::now();

        let exists: Option<i64> = self
            .conn()
            .query_row("SELECT 1 FROM users WHERE uid = ?1", params![uid], |row| {
                row.get(0)
            })
            .optional()?;

        if exists.is_none() {
            self.conn().execute(
                "INSERT INTO users (uid, email, display_name, photo_url, role, status,
                                    program, created_at, last_login)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    uid,
                    patch.email.as_deref().unwrap_or(""),
                    patch.display_name.as_deref().unwrap_or(""),
                    patch.photo_url,
                    Role::Student.as_str(),
                    AccountStatus::Active.as_str(),
                    patch.program,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )?;
            tracing::debug!(uid, "created profile");
        } else {
            self.conn().execute(
                "UPDATE users
                 SET email        = COALESCE(?2, email),
                     display_name = COALESCE(?3, display_name),
                     photo_url    = COALESCE(?4, photo_url),
                     program      = COALESCE(?5, program),
                     last_login   = ?6
                 WHERE uid = ?1",
                params![
                    uid,
                    patch.email,
                    patch.display_name,
                    patch.photo_url,
                    patch.program,
                    now.to_rfc3339(),
                ],
            )?;
        }
        Ok(())
    }

    /// List all student profiles, ordered by display name.
    ///
    /// Unbounded scan; acceptable at institutional scale.
    pub fn list_students(&self) -> Result<Vec<UserProfile>> {
        let mut stmt = self.conn().prepare(
            "SELECT uid, email, display_name, photo_url, role, status, program,
                    created_at, last_login
             FROM users
             WHERE role = ?1
             ORDER BY display_name ASC",
        )?;

        let rows = stmt.query_map(params![Role::Student.as_str()], row_to_profile)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Overwrite the account status.  Fails with [`StoreError::NotFound`]
    /// if no such profile exists.
    ///
    /// Precondition: the caller has already confirmed admin privilege via
    /// [`Database::is_admin`]; this operation performs no check of its own.
    ///
    /// [`Database::is_admin`]: crate::Database::is_admin
    pub fn set_status(&self, uid: &str, status: AccountStatus) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET status = ?2 WHERE uid = ?1",
            params![uid, status.as_str()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        tracing::info!(uid, status = status.as_str(), "account status changed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`UserProfile`].
fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    let uid: String = row.get(0)?;
    let email: String = row.get(1)?;
    let display_name: String = row.get(2)?;
    let photo_url: Option<String> = row.get(3)?;
    let role_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let program: Option<String> = row.get(6)?;
    let created_str: String = row.get(7)?;
    let login_str: String = row.get(8)?;

    let role = Role::parse(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown role: {role_str}").into(),
        )
    })?;
    let status = AccountStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown status: {status_str}").into(),
        )
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let last_login: DateTime<Utc> = DateTime::parse_from_rfc3339(&login_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(UserProfile {
        uid,
        email,
        display_name,
        photo_url,
        role,
        status,
        program,
        created_at,
        last_login,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn upsert_creates_with_defaults() {
        let (db, _dir) = test_db();

        db.upsert_profile(
            "uid-1",
            &ProfilePatch {
                email: Some("a@example.edu".into()),
                display_name: Some("Ana".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let profile = db.get_profile("uid-1").unwrap().unwrap();
        assert_eq!(profile.role, Role::Student);
        assert_eq!(profile.status, AccountStatus::Active);
        assert_eq!(profile.email, "a@example.edu");
        assert_eq!(profile.program, None);
    }

    #[test]
    fn upsert_twice_is_idempotent_and_preserves_role() {
        let (db, _dir) = test_db();

        // Seed a profile whose role was fixed as admin at creation.
        db.conn()
            .execute(
                "INSERT INTO users (uid, email, display_name, role, status, created_at, last_login)
                 VALUES ('uid-adm', 'adm@example.edu', 'Dean', 'admin', 'active',
                         '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00')",
                [],
            )
            .unwrap();

        let patch = ProfilePatch {
            program: Some("BSCS".into()),
            ..Default::default()
        };
        db.upsert_profile("uid-adm", &patch).unwrap();
        db.upsert_profile("uid-adm", &patch).unwrap();

        let profile = db.get_profile("uid-adm").unwrap().unwrap();
        assert_eq!(profile.program.as_deref(), Some("BSCS"));
        assert_eq!(profile.role, Role::Admin);
        assert_eq!(profile.display_name, "Dean");
    }

    #[test]
    fn upsert_update_leaves_unset_fields_alone() {
        let (db, _dir) = test_db();

        db.upsert_profile(
            "uid-2",
            &ProfilePatch {
                email: Some("b@example.edu".into()),
                display_name: Some("Ben".into()),
                program: Some("BSIT".into()),
                ..Default::default()
            },
        )
        .unwrap();

        db.upsert_profile(
            "uid-2",
            &ProfilePatch {
                display_name: Some("Benjamin".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let profile = db.get_profile("uid-2").unwrap().unwrap();
        assert_eq!(profile.display_name, "Benjamin");
        assert_eq!(profile.email, "b@example.edu");
        assert_eq!(profile.program.as_deref(), Some("BSIT"));
    }

    #[test]
    fn get_profile_absent_is_none() {
        let (db, _dir) = test_db();
        assert!(db.get_profile("nobody").unwrap().is_none());
    }

    #[test]
    fn set_status_flips_and_requires_existing_profile() {
        let (db, _dir) = test_db();

        db.upsert_profile("uid-3", &ProfilePatch::default()).unwrap();
        db.set_status("uid-3", AccountStatus::Blocked).unwrap();
        let profile = db.get_profile("uid-3").unwrap().unwrap();
        assert_eq!(profile.status, AccountStatus::Blocked);

        assert!(matches!(
            db.set_status("nobody", AccountStatus::Active),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn set_status_performs_no_admin_check() {
        // Authorization is a composition contract: calling set_status
        // directly, with no is_admin consultation anywhere, still executes.
        let (db, _dir) = test_db();

        db.upsert_profile("uid-4", &ProfilePatch::default()).unwrap();
        assert!(!db.is_admin("anyone").unwrap());
        db.set_status("uid-4", AccountStatus::Blocked).unwrap();
        assert_eq!(
            db.get_profile("uid-4").unwrap().unwrap().status,
            AccountStatus::Blocked
        );
    }

    #[test]
    fn list_students_excludes_admin_roles() {
        let (db, _dir) = test_db();

        db.upsert_profile(
            "uid-s",
            &ProfilePatch {
                display_name: Some("Student".into()),
                ..Default::default()
            },
        )
        .unwrap();
        db.conn()
            .execute(
                "INSERT INTO users (uid, email, display_name, role, status, created_at, last_login)
                 VALUES ('uid-a', '', 'Admin', 'admin', 'active',
                         '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00')",
                [],
            )
            .unwrap();

        let students = db.list_students().unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].uid, "uid-s");
    }
}
