#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Vision capabilities consumed by the site progress pipeline.
//!
//! Object detection, surface segmentation, and content validation are
//! black boxes behind the [`ObjectDetector`], [`SurfaceSegmenter`], and
//! [`ContentValidator`] traits. A [`VisionCapabilities`] bundle is built
//! once at startup and handed to the analyzer, so tests can substitute
//! stubs for the real models.
//!
//! The production implementation, [`inference::InferenceClient`], talks to
//! a model-serving sidecar over HTTP (configured via `VISION_BASE_URL`).

pub mod inference;
pub mod photo;
pub mod validation;

use std::sync::Arc;

use site_progress_models::{EquipmentCounts, SurfaceDistribution};
use thiserror::Error;

pub use photo::Photo;

/// Errors that can occur while invoking a vision capability.
#[derive(Debug, Error)]
pub enum VisionError {
    /// HTTP request to the inference service failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The image could not be encoded for upload.
    #[error("Image encoding error: {0}")]
    Encode(#[from] image::ImageError),

    /// The inference service rejected the request.
    #[error("Provider error: {message}")]
    Provider {
        /// Description of what went wrong.
        message: String,
    },

    /// The inference service answered with something unusable.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Description.
        message: String,
    },

    /// A blocking image task panicked or was cancelled.
    #[error("Image task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description.
        message: String,
    },
}

/// Counts visible equipment by class.
#[async_trait::async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Returns the number of detected objects per class; empty if nothing
    /// was recognized.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError`] if detection fails.
    async fn detect(&self, photo: &Photo) -> Result<EquipmentCounts, VisionError>;
}

/// Partitions an image into labeled surface classes.
#[async_trait::async_trait]
pub trait SurfaceSegmenter: Send + Sync {
    /// Returns the area fraction covered by each recognized class.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError`] if segmentation fails.
    async fn segment(&self, photo: &Photo) -> Result<SurfaceDistribution, VisionError>;
}

/// Decides whether a photo plausibly shows a claimed activity.
#[async_trait::async_trait]
pub trait ContentValidator: Send + Sync {
    /// Returns the plausibility verdict for `activity_type`.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError`] if the check could not be performed.
    async fn validate(&self, photo: &Photo, activity_type: &str) -> Result<bool, VisionError>;
}

/// The set of vision capabilities injected into the analyzer.
#[derive(Clone)]
pub struct VisionCapabilities {
    /// Equipment detection.
    pub detector: Arc<dyn ObjectDetector>,
    /// Surface segmentation.
    pub segmenter: Arc<dyn SurfaceSegmenter>,
    /// Activity validation.
    pub validator: Arc<dyn ContentValidator>,
}

impl VisionCapabilities {
    /// Uses a single backend for all three capabilities.
    #[must_use]
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: ObjectDetector + SurfaceSegmenter + ContentValidator + 'static,
    {
        Self {
            detector: backend.clone(),
            segmenter: backend.clone(),
            validator: backend,
        }
    }
}

impl std::fmt::Debug for VisionCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionCapabilities").finish_non_exhaustive()
    }
}

/// Builds capabilities backed by the HTTP inference service.
///
/// Reads `VISION_BASE_URL` (required) plus the optional tuning variables
/// documented on [`inference::InferenceSettings::from_env`].
///
/// # Errors
///
/// Returns [`VisionError::Config`] if `VISION_BASE_URL` is not set or the
/// HTTP client cannot be built.
pub fn create_capabilities_from_env() -> Result<VisionCapabilities, VisionError> {
    let base_url = std::env::var("VISION_BASE_URL").map_err(|_| VisionError::Config {
        message: "VISION_BASE_URL environment variable not set".to_string(),
    })?;
    let settings = inference::InferenceSettings::from_env();

    log::info!("Using vision inference service at {base_url}");
    let client = inference::InferenceClient::new(base_url, settings)?;

    Ok(VisionCapabilities::from_shared(Arc::new(client)))
}
