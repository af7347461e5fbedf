//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `users`, `admin_roles`, `documents`, and
//! `downloads`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    uid          TEXT PRIMARY KEY NOT NULL,   -- identity-provider uid
    email        TEXT NOT NULL DEFAULT '',
    display_name TEXT NOT NULL DEFAULT '',
    photo_url    TEXT,
    role         TEXT NOT NULL,               -- 'admin' | 'student'
    status       TEXT NOT NULL,               -- 'active' | 'blocked'
    program      TEXT,
    created_at   TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    last_login   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

-- ----------------------------------------------------------------
-- Admin registry (second authority, independent of users.role)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS admin_roles (
    uid    TEXT PRIMARY KEY NOT NULL,
    active INTEGER NOT NULL DEFAULT 0         -- boolean 0/1
);

-- ----------------------------------------------------------------
-- Documents (the catalog)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS documents (
    id             TEXT PRIMARY KEY NOT NULL, -- UUID v4
    title          TEXT NOT NULL,
    description    TEXT NOT NULL DEFAULT '',
    category       TEXT NOT NULL,
    file_url       TEXT NOT NULL,
    file_type      TEXT NOT NULL DEFAULT '',
    uploaded_by    TEXT NOT NULL,             -- admin uid
    created_at     TEXT NOT NULL,
    download_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_documents_created
    ON documents(created_at DESC);

-- ----------------------------------------------------------------
-- Downloads (the append-only ledger)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS downloads (
    id              TEXT PRIMARY KEY NOT NULL, -- UUID v4
    document_id     TEXT NOT NULL,             -- FK -> documents(id)
    document_title  TEXT NOT NULL,             -- snapshot at download time
    student_id      TEXT NOT NULL,
    student_name    TEXT NOT NULL,             -- snapshot at download time
    student_program TEXT,                      -- snapshot at download time
    timestamp       TEXT NOT NULL,             -- ISO-8601

    FOREIGN KEY (document_id) REFERENCES documents(id)
);

CREATE INDEX IF NOT EXISTS idx_downloads_ts
    ON downloads(timestamp DESC);

CREATE INDEX IF NOT EXISTS idx_downloads_document
    ON downloads(document_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
