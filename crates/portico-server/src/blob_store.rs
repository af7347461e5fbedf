//! Filesystem-backed blob store.
//!
//! The catalog never holds file bytes, only the retrieval URL issued here.
//! A stored file is named `{uuid}_{sanitized original name}` under the base
//! directory, and the URL points at the server's `/files/{name}` route.

use std::path::PathBuf;

use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;

/// The single MIME type the portal accepts for uploads.
pub const ACCEPTED_CONTENT_TYPE: &str = "application/pdf";

/// Replace anything outside `[A-Za-z0-9._-]` so a client-supplied name can
/// never escape the blob directory.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(['_', '.']).is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// A stored file and the URL under which it can be retrieved.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub id: Uuid,
    pub file_name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
    public_url: String,
    max_size: usize,
}

impl BlobStore {
    pub async fn new(
        base_path: PathBuf,
        public_url: String,
        max_size: usize,
    ) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::BlobStorage(format!(
                "Failed to create blob directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Blob store initialized");

        Ok(Self {
            base_path,
            public_url,
            max_size,
        })
    }

    /// Persist a file payload and issue its retrieval URL.
    pub async fn store(&self, data: &[u8], suggested_name: &str) -> Result<StoredBlob, ServerError> {
        if data.is_empty() {
            return Err(ServerError::BadRequest("Empty file upload".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::FileTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let id = Uuid::new_v4();
        let file_name = format!("{}_{}", id, sanitize_file_name(suggested_name));
        let path = self.base_path.join(&file_name);

        fs::write(&path, data)
            .await
            .map_err(|e| ServerError::BlobStorage(format!("Failed to write blob {}: {}", id, e)))?;

        debug!(id = %id, size = data.len(), "Stored blob");

        Ok(StoredBlob {
            id,
            url: format!("{}/files/{}", self.public_url, file_name),
            file_name,
        })
    }

    /// Read a stored file back by its issued name.
    pub async fn open(&self, file_name: &str) -> Result<Vec<u8>, ServerError> {
        // Issued names never contain separators; reject anything that does.
        if file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
            return Err(ServerError::BadRequest(
                "Path traversal detected".to_string(),
            ));
        }

        let path = self.base_path.join(file_name);
        if !path.exists() {
            return Err(ServerError::NotFound);
        }

        let data = fs::read(&path).await.map_err(|e| {
            ServerError::BlobStorage(format!("Failed to read blob {}: {}", file_name, e))
        })?;

        debug!(file_name, size = data.len(), "Retrieved blob");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (BlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(
            dir.path().to_path_buf(),
            "http://localhost:8080".to_string(),
            1024 * 1024,
        )
        .await
        .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_store_and_open() {
        let (store, _dir) = test_store().await;
        let data = b"%PDF-1.7 fake";

        let blob = store.store(data, "handbook.pdf").await.unwrap();
        assert!(blob.url.ends_with(&blob.file_name));

        let retrieved = store.open(&blob.file_name).await.unwrap();
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_empty_payload_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.store(b"", "x.pdf").await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(
            dir.path().to_path_buf(),
            "http://localhost:8080".to_string(),
            8,
        )
        .await
        .unwrap();

        let result = store.store(b"123456789", "x.pdf").await;
        assert!(matches!(result, Err(ServerError::FileTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.open("nope.pdf").await,
            Err(ServerError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_traversal() {
        let (store, _dir) = test_store().await;
        assert!(store.open("../etc/passwd").await.is_err());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("memo 2024.pdf"), "memo_2024.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name("///"), "file");
    }
}
