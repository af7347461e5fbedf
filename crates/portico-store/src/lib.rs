//! # portico-store
//!
//! Document repository and download-accounting layer for the Portico portal,
//! backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for every collection:
//! user profiles, the admin registry, the document catalog, and the
//! append-only download ledger.  The one cross-collection operation,
//! [`Database::record_download`], runs as a single SQLite transaction so the
//! catalog counter and the ledger can never diverge.

pub mod admins;
pub mod database;
pub mod documents;
pub mod downloads;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
