#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Location-keyed persistence for progress reports.
//!
//! Each location holds exactly one record: the most recent [`Report`].
//! Saving a new report for a location overwrites the previous one. The
//! default backend, [`JsonFileStore`], writes one pretty-printed JSON file
//! per location key under a data directory that is created lazily on the
//! first save.

pub mod json_file;
pub mod key;

use std::path::PathBuf;

use site_progress_models::Report;
use thiserror::Error;

pub use json_file::JsonFileStore;
pub use key::key_for;

/// Default directory for report files, relative to the working directory.
pub const DEFAULT_REPORTS_DIR: &str = "data/reports";

/// Errors from report store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing a record failed at the filesystem level.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An existing record could not be parsed as a report.
    #[error("Corrupted report record {}: {source}", path.display())]
    Corrupted {
        /// The unreadable record.
        path: PathBuf,
        /// Parse failure.
        source: serde_json::Error,
    },

    /// A report could not be serialized.
    #[error("Failed to serialize report: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The location string has no characters usable in a storage key.
    #[error("Location '{location_stretch}' does not yield a usable storage key")]
    InvalidKey {
        /// The raw location string.
        location_stretch: String,
    },
}

impl StoreError {
    /// Returns `true` if an existing record was found but is unreadable.
    #[must_use]
    pub const fn is_corrupted(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }
}

/// Keyed single-slot storage of the latest [`Report`] per location.
///
/// Implementations must treat an empty or missing backing store as "no
/// report" rather than an error, and must never merge a new report with
/// the one it replaces.
#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    /// Loads the most recent report for `location_stretch`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupted`] if a record exists but cannot be
    /// parsed, or [`StoreError::Io`] if it cannot be read.
    async fn load_latest(&self, location_stretch: &str) -> Result<Option<Report>, StoreError>;

    /// Persists `report` for `location_stretch`, replacing any prior record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the key is unusable or the write fails.
    async fn save(&self, location_stretch: &str, report: &Report) -> Result<(), StoreError>;
}
