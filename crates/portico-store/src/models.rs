//! Domain model structs persisted in the portal database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

/// Account role.  Assigned at profile creation and never changed afterwards
/// by anything in this crate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

/// Whether the account may currently use the portal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Blocked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AccountStatus::Active),
            "blocked" => Some(AccountStatus::Blocked),
            _ => None,
        }
    }
}

/// A portal account.  The primary key is the uid issued by the external
/// authentication provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    /// Identity-provider uid, immutable once created.
    pub uid: String,
    /// Contact email.
    pub email: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Optional avatar URL.
    pub photo_url: Option<String>,
    /// Account role, fixed at creation.
    pub role: Role,
    /// Active / blocked flag, flipped only by administrative action.
    pub status: AccountStatus,
    /// Optional academic track, e.g. "BSCS".
    pub program: Option<String>,
    /// When the profile was first created (server clock).
    pub created_at: DateTime<Utc>,
    /// Refreshed on every profile upsert (server clock).
    pub last_login: DateTime<Utc>,
}

/// Partial profile data overlaid by [`Database::upsert_profile`].
///
/// Deliberately has no `role` or `status` field: an update can never erase
/// or change either one.
///
/// [`Database::upsert_profile`]: crate::Database::upsert_profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub program: Option<String>,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A published document in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Unique document identifier, assigned by the catalog on insert.
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Free-form tag, e.g. "Memo", "Form", "Curriculum", "News".
    pub category: String,
    /// Opaque retrieval URL issued by the blob store.
    pub file_url: String,
    /// MIME type of the stored file.
    pub file_type: String,
    /// uid of the admin who published the document.
    pub uploaded_by: String,
    /// Server-assigned creation time; client-supplied values are ignored.
    pub created_at: DateTime<Utc>,
    /// Number of recorded downloads.  Equals the count of ledger entries
    /// referencing this document; mutated only by the accounting
    /// transaction.
    pub download_count: i64,
}

/// Metadata for a catalog insert.  Id, creation time and the zeroed counter
/// are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub description: String,
    pub category: String,
    pub file_url: String,
    pub file_type: String,
    pub uploaded_by: String,
}

// ---------------------------------------------------------------------------
// Download ledger
// ---------------------------------------------------------------------------

/// One successful download, as recorded by the accounting transaction.
///
/// Title, name and program are denormalized on purpose: they freeze what was
/// true at download time, so later edits to the document or the profile do
/// not rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadLogEntry {
    /// Unique entry identifier, assigned on append.
    pub id: Uuid,
    pub document_id: Uuid,
    /// Document title as it was at download time.
    pub document_title: String,
    pub student_id: String,
    /// Student display name as it was at download time.
    pub student_name: String,
    /// Student program as it was at download time, if any.
    pub student_program: Option<String>,
    /// Server-assigned event time.
    pub timestamp: DateTime<Utc>,
}
