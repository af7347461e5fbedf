//! REST API surface.
//!
//! Authentication itself is external: callers arrive with their
//! identity-provider uid in the `x-user-id` header, and this layer is
//! responsible for the authorization contract the store deliberately does
//! not enforce — every mutating route consults the admin registry before
//! touching the store, and document routes refuse blocked accounts.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use portico_store::downloads::DEFAULT_RECENT_LIMIT;
use portico_store::{
    AccountStatus, Database, Document, DownloadLogEntry, NewDocument, ProfilePatch, UserProfile,
};

use crate::blob_store::{BlobStore, ACCEPTED_CONTENT_TYPE};
use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    /// Resolved database file; every request opens its own handle so no
    /// connection state is shared between calls.
    pub db_path: PathBuf,
    pub blob_store: Arc<BlobStore>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let max_upload = state.config.max_upload_size;

    Router::new()
        .route("/health", get(health_check))
        .route("/profile", put(profile_upsert))
        .route("/documents", get(documents_search).post(document_upload))
        .route("/documents/:id", patch(document_update))
        .route("/documents/:id/download", post(document_download))
        .route("/downloads/recent", get(downloads_recent))
        .route("/students", get(students_list))
        .route("/students/:uid/status", put(student_status))
        .route("/files/:name", get(file_serve))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
}

#[derive(Deserialize)]
struct RecentParams {
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct DocumentMetadataRequest {
    title: String,
    #[serde(default)]
    description: String,
    category: String,
}

#[derive(Deserialize)]
struct StatusRequest {
    status: AccountStatus,
}

#[derive(Serialize)]
struct DownloadResponse {
    file_url: String,
}

// ---------------------------------------------------------------------------
// Identity and authorization helpers
// ---------------------------------------------------------------------------

/// Pull the externally-authenticated caller uid out of the request.
fn caller_uid(headers: &HeaderMap) -> Result<String, ServerError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or(ServerError::Unauthorized)
}

/// The caller must have a profile and not be blocked.
fn require_active(db: &Database, uid: &str) -> Result<UserProfile, ServerError> {
    let profile = db.get_profile(uid)?.ok_or(ServerError::Unauthorized)?;
    if profile.status != AccountStatus::Active {
        return Err(ServerError::Forbidden("account is blocked".to_string()));
    }
    Ok(profile)
}

/// The caller must be an active registered admin.  Checked before every
/// mutating store call; the store operations themselves stay unguarded.
fn require_admin(db: &Database, uid: &str) -> Result<(), ServerError> {
    if db.is_admin(uid)? {
        Ok(())
    } else {
        Err(ServerError::Forbidden("admin privilege required".to_string()))
    }
}

/// Run a store closure on the blocking pool with a fresh handle.
async fn with_db<T, F>(state: &AppState, f: F) -> Result<T, ServerError>
where
    F: FnOnce(&mut Database) -> Result<T, ServerError> + Send + 'static,
    T: Send + 'static,
{
    let path = state.db_path.clone();
    tokio::task::spawn_blocking(move || {
        let mut db = Database::open_at(&path)?;
        f(&mut db)
    })
    .await?
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn profile_upsert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(patch): Json<ProfilePatch>,
) -> Result<StatusCode, ServerError> {
    let uid = caller_uid(&headers)?;
    with_db(&state, move |db| {
        db.upsert_profile(&uid, &patch)?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn documents_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Document>>, ServerError> {
    let uid = caller_uid(&headers)?;
    let documents = with_db(&state, move |db| {
        require_active(db, &uid)?;
        Ok(db.search_documents(params.q.as_deref().unwrap_or(""))?)
    })
    .await?;
    Ok(Json(documents))
}

async fn document_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Document>, ServerError> {
    let uid = caller_uid(&headers)?;

    // Authorization precedes every write, the blob store included.
    {
        let uid = uid.clone();
        with_db(&state, move |db| require_admin(db, &uid)).await?;
    }

    let mut title = String::new();
    let mut description = String::new();
    let mut category = String::new();
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "title" => title = read_text_field(field).await?,
            "description" => description = read_text_field(field).await?,
            "category" => category = read_text_field(field).await?,
            "file" => {
                let file_name = field.file_name().unwrap_or("document.pdf").to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                if content_type != ACCEPTED_CONTENT_TYPE {
                    return Err(ServerError::UnsupportedFileType(content_type));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;
                file = Some((file_name, content_type, data.to_vec()));
            }
            _ => {}
        }
    }

    let (file_name, content_type, data) = file.ok_or_else(|| {
        ServerError::BadRequest("Missing 'file' field in multipart form".to_string())
    })?;

    // Blob first: the catalog row must never point at a missing file.  If
    // the insert below fails, the stored blob stays behind as an accepted
    // orphan.
    let blob = state.blob_store.store(&data, &file_name).await?;

    let new = NewDocument {
        title,
        description,
        category,
        file_url: blob.url,
        file_type: content_type,
        uploaded_by: uid,
    };
    let document = with_db(&state, move |db| Ok(db.insert_document(&new)?)).await?;

    info!(id = %document.id, size = data.len(), "Document uploaded via API");
    Ok(Json(document))
}

async fn document_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<DocumentMetadataRequest>,
) -> Result<StatusCode, ServerError> {
    let uid = caller_uid(&headers)?;
    with_db(&state, move |db| {
        require_admin(db, &uid)?;
        db.update_document_metadata(id, &req.title, &req.description, &req.category)?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn document_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<DownloadResponse>, ServerError> {
    let uid = caller_uid(&headers)?;
    let file_url = with_db(&state, move |db| {
        let profile = require_active(db, &uid)?;
        // Snapshot the title before the accounting transaction runs; the
        // ledger keeps it even if the document is renamed later.
        let document = db.get_document(id)?;
        db.record_download(id, &profile, &document.title)?;
        Ok(document.file_url)
    })
    .await?;
    Ok(Json(DownloadResponse { file_url }))
}

async fn downloads_recent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<DownloadLogEntry>>, ServerError> {
    let uid = caller_uid(&headers)?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .min(DEFAULT_RECENT_LIMIT);
    let entries = with_db(&state, move |db| {
        require_admin(db, &uid)?;
        Ok(db.list_recent_downloads(limit)?)
    })
    .await?;
    Ok(Json(entries))
}

async fn students_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserProfile>>, ServerError> {
    let uid = caller_uid(&headers)?;
    let students = with_db(&state, move |db| {
        require_admin(db, &uid)?;
        Ok(db.list_students()?)
    })
    .await?;
    Ok(Json(students))
}

async fn student_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(target): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<StatusCode, ServerError> {
    let uid = caller_uid(&headers)?;
    with_db(&state, move |db| {
        require_admin(db, &uid)?;
        db.set_status(&target, req.status)?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn file_serve(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ServerError> {
    let data = state.blob_store.open(&name).await?;
    Ok(([(header::CONTENT_TYPE, ACCEPTED_CONTENT_TYPE)], data).into_response())
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ServerError> {
    field
        .text()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))
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
    fn caller_uid_requires_nonempty_header() {
        let mut headers = HeaderMap::new();
        assert!(matches!(caller_uid(&headers), Err(ServerError::Unauthorized)));

        headers.insert("x-user-id", "  ".parse().unwrap());
        assert!(matches!(caller_uid(&headers), Err(ServerError::Unauthorized)));

        headers.insert("x-user-id", "uid-1".parse().unwrap());
        assert_eq!(caller_uid(&headers).unwrap(), "uid-1");
    }

    #[test]
    fn blocked_and_unknown_accounts_are_refused() {
        let (db, _dir) = test_db();

        db.upsert_profile("s1", &ProfilePatch::default()).unwrap();
        assert!(require_active(&db, "s1").is_ok());

        db.set_status("s1", AccountStatus::Blocked).unwrap();
        assert!(matches!(
            require_active(&db, "s1"),
            Err(ServerError::Forbidden(_))
        ));

        assert!(matches!(
            require_active(&db, "ghost"),
            Err(ServerError::Unauthorized)
        ));
    }

    #[test]
    fn admin_gate_consults_the_registry() {
        let (db, _dir) = test_db();

        db.set_admin("adm", true).unwrap();
        assert!(require_admin(&db, "adm").is_ok());
        assert!(matches!(
            require_admin(&db, "s1"),
            Err(ServerError::Forbidden(_))
        ));
    }
}
