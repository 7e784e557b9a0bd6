#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the site progress server.
//!
//! Successful analyses return the stored report as-is; these types cover
//! the request metadata and the non-report responses.

use serde::{Deserialize, Serialize};

/// JSON metadata sent alongside the uploaded photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    /// Declared activity shown in the photo (e.g. `"asphalt laying"`).
    pub activity_type: String,
    /// Free-text description of the site or road stretch.
    pub location_stretch: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// Error body returned for any failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Caller-facing message.
    pub error: String,
    /// Machine-readable error class (e.g. `"validation_failed"`).
    pub kind: String,
}

impl ApiError {
    #[must_use]
    pub fn new(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: kind.into(),
        }
    }
}
