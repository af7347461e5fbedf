//! Admin registry operations.
//!
//! The registry is a second authority, independent of the `role` field on
//! the profile: privileged writes are permitted only when this collection
//! also affirms the uid.  Keep both signals; do not collapse them.

use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Whether the uid is an active registered admin.
    ///
    /// Returns `false` for unknown uids and for registry rows whose
    /// `active` flag is cleared.  Never fails on absence.
    pub fn is_admin(&self, uid: &str) -> Result<bool> {
        let active: Option<bool> = self
            .conn()
            .query_row(
                "SELECT active FROM admin_roles WHERE uid = ?1",
                params![uid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(active.unwrap_or(false))
    }

    /// Insert or update a registry row.
    ///
    /// The registry is maintained out-of-band (deployment bootstrap), not
    /// through any portal-facing operation.
    pub fn set_admin(&self, uid: &str, active: bool) -> Result<()> {
        self.conn().execute(
            "INSERT INTO admin_roles (uid, active) VALUES (?1, ?2)
             ON CONFLICT(uid) DO UPDATE SET active = excluded.active",
            params![uid, active],
        )?;
        tracing::info!(uid, active, "admin registry updated");
        Ok(())
    }
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
    fn absent_uid_is_not_admin() {
        let (db, _dir) = test_db();
        assert!(!db.is_admin("nobody").unwrap());
    }

    #[test]
    fn registry_flag_round_trip() {
        let (db, _dir) = test_db();

        db.set_admin("uid-adm", true).unwrap();
        assert!(db.is_admin("uid-adm").unwrap());

        db.set_admin("uid-adm", false).unwrap();
        assert!(!db.is_admin("uid-adm").unwrap());
    }

    #[test]
    fn registry_is_independent_of_profile_role() {
        let (db, _dir) = test_db();

        // An admin-role profile without a registry row is still refused.
        db.conn()
            .execute(
                "INSERT INTO users (uid, email, display_name, role, status, created_at, last_login)
                 VALUES ('uid-x', '', 'X', 'admin', 'active',
                         '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00')",
                [],
            )
            .unwrap();
        assert!(!db.is_admin("uid-x").unwrap());
    }
}
