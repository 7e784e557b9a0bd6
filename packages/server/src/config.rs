//! Server settings read from the environment at startup.

use std::path::PathBuf;

use site_progress_store::DEFAULT_REPORTS_DIR;

/// Default upload limit for a single photo (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Runtime configuration for [`crate::run_server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind (`BIND_ADDR`, default `127.0.0.1`).
    pub bind_addr: String,
    /// Port to listen on (`PORT`, default `8001`).
    pub port: u16,
    /// Directory for report files (`REPORTS_DIR`).
    pub reports_dir: PathBuf,
    /// Maximum accepted image size in bytes (`MAX_UPLOAD_BYTES`).
    pub max_upload_bytes: usize,
    /// Single allowed CORS origin (`CORS_ALLOWED_ORIGIN`); permissive when unset.
    pub cors_allowed_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8001,
            reports_dir: PathBuf::from(DEFAULT_REPORTS_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_allowed_origin: None,
        }
    }
}

impl ServerConfig {
    /// Builds the configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            reports_dir: lookup("REPORTS_DIR").map_or(defaults.reports_dir, PathBuf::from),
            max_upload_bytes: lookup("MAX_UPLOAD_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
            cors_allowed_origin: lookup("CORS_ALLOWED_ORIGIN").filter(|o| !o.trim().is_empty()),
        }
    }
}
