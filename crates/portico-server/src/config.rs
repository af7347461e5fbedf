//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.  When unset, the platform-appropriate data
    /// directory is used.
    /// Env: `DATABASE_PATH`
    pub database_path: Option<PathBuf>,

    /// Filesystem path where uploaded files are stored.
    /// Env: `BLOB_STORAGE_PATH`
    /// Default: `./blobs`
    pub blob_storage_path: PathBuf,

    /// Public base URL used when issuing file retrieval URLs.
    /// Env: `PUBLIC_URL`
    /// Default: `http://localhost:8080`
    pub public_url: String,

    /// Uids granted an active admin-registry row at startup, comma
    /// separated.  The registry has no portal-facing write path, so this
    /// is how a fresh deployment gets its first administrator.
    /// Env: `ADMIN_UIDS`
    /// Default: empty.
    pub admin_uids: Vec<String>,

    /// Maximum upload size in bytes (25 MiB).
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: None,
            blob_storage_path: PathBuf::from("./blobs"),
            public_url: "http://localhost:8080".to_string(),
            admin_uids: Vec::new(),
            max_upload_size: 25 * 1024 * 1024, // 25 MiB
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(
                    value = %addr,
                    "Invalid HTTP_ADDR, using default"
                );
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(path) = std::env::var("BLOB_STORAGE_PATH") {
            config.blob_storage_path = PathBuf::from(path);
        }

        if let Ok(url) = std::env::var("PUBLIC_URL") {
            if !url.is_empty() {
                config.public_url = url.trim_end_matches('/').to_string();
            }
        }

        if let Ok(uids) = std::env::var("ADMIN_UIDS") {
            config.admin_uids = uids
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert!(config.admin_uids.is_empty());
        assert_eq!(config.max_upload_size, 25 * 1024 * 1024);
    }
}
