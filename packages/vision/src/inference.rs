//! HTTP client for the model-serving sidecar.
//!
//! Each capability maps to one endpoint. Images are uploaded as PNG in a
//! `multipart/form-data` body under the `image` field.
//!
//! | Capability | Endpoint | Response |
//! |---|---|---|
//! | detect | `POST /detect` | `{"detections": [{"label", "confidence"}]}` |
//! | segment | `POST /segment` | `{"total_pixels", "classes": [{"label", "pixels"}]}` |
//! | validate | `POST /classify` (+ `labels` JSON array) | `{"scores": [..]}` |

use std::time::Duration;

use reqwest::multipart;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use site_progress_models::{EquipmentCounts, SurfaceDistribution};

use crate::validation::{DEFAULT_THRESHOLD, PromptSet};
use crate::{ContentValidator, ObjectDetector, Photo, SurfaceSegmenter, VisionError};

/// Default per-request timeout for inference calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default minimum confidence for a detection to be counted.
pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f64 = 0.25;

/// Tuning knobs for [`InferenceClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Minimum positive share for activity validation to pass.
    pub validation_threshold: f64,
    /// Detections below this confidence are ignored.
    pub min_detection_confidence: f64,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            validation_threshold: DEFAULT_THRESHOLD,
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
        }
    }
}

impl InferenceSettings {
    /// Reads settings from the environment, falling back to defaults:
    ///
    /// - `VISION_TIMEOUT_SECS`
    /// - `VISION_VALIDATION_THRESHOLD`
    /// - `VISION_MIN_DETECTION_CONFIDENCE`
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: env_parse::<u64>("VISION_TIMEOUT_SECS")
                .map_or(defaults.timeout, Duration::from_secs),
            validation_threshold: env_parse("VISION_VALIDATION_THRESHOLD")
                .unwrap_or(defaults.validation_threshold),
            min_detection_confidence: env_parse("VISION_MIN_DETECTION_CONFIDENCE")
                .unwrap_or(defaults.min_detection_confidence),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    raw.trim().parse().map_or_else(
        |_| {
            log::warn!("Ignoring invalid {name}={raw:?}, using default");
            None
        },
        Some,
    )
}

/// Vision capabilities backed by a remote inference service.
pub struct InferenceClient {
    base_url: String,
    settings: InferenceSettings,
    client: reqwest::Client,
}

impl InferenceClient {
    /// Creates a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::Config`] if the HTTP client cannot be built.
    pub fn new(base_url: String, settings: InferenceSettings) -> Result<Self, VisionError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| VisionError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            settings,
            client,
        })
    }

    /// Settings in effect for this client.
    #[must_use]
    pub const fn settings(&self) -> &InferenceSettings {
        &self.settings
    }

    /// Uploads `photo` to `endpoint` with any extra text fields and parses
    /// the JSON response.
    async fn post_image<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        photo: &Photo,
        fields: Vec<(&'static str, String)>,
    ) -> Result<T, VisionError> {
        let png = photo.png().await?.to_vec();
        let part = multipart::Part::bytes(png)
            .file_name("image.png")
            .mime_str("image/png")?;

        let mut form = multipart::Form::new().part("image", part);
        for (name, value) in fields {
            form = form.text(name, value);
        }

        let url = format!("{}/{endpoint}", self.base_url);
        log::debug!("POST {url}");

        let resp = self.client.post(&url).multipart(form).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(VisionError::Provider {
                message: error_message(status, &body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait::async_trait]
impl ObjectDetector for InferenceClient {
    async fn detect(&self, photo: &Photo) -> Result<EquipmentCounts, VisionError> {
        let response: DetectResponse = self.post_image("detect", photo, Vec::new()).await?;
        Ok(count_detections(
            &response,
            self.settings.min_detection_confidence,
        ))
    }
}

#[async_trait::async_trait]
impl SurfaceSegmenter for InferenceClient {
    async fn segment(&self, photo: &Photo) -> Result<SurfaceDistribution, VisionError> {
        let response: SegmentResponse = self.post_image("segment", photo, Vec::new()).await?;
        distribution_from_pixels(&response)
    }
}

#[async_trait::async_trait]
impl ContentValidator for InferenceClient {
    async fn validate(&self, photo: &Photo, activity_type: &str) -> Result<bool, VisionError> {
        let prompts = PromptSet::for_activity(activity_type);
        let labels = serde_json::to_string(&prompts.labels)?;

        let response: ClassifyResponse = self
            .post_image("classify", photo, vec![("labels", labels)])
            .await?;

        prompts.verdict(&response.scores, self.settings.validation_threshold)
    }
}

/// `POST /detect` response body.
#[derive(Debug, Deserialize)]
pub struct DetectResponse {
    /// One entry per detected bounding box.
    pub detections: Vec<Detection>,
}

/// A single detected object.
#[derive(Debug, Deserialize)]
pub struct Detection {
    /// Class name.
    pub label: String,
    /// Detector confidence; treated as certain when omitted.
    #[serde(default = "full_confidence")]
    pub confidence: f64,
}

const fn full_confidence() -> f64 {
    1.0
}

/// `POST /segment` response body.
#[derive(Debug, Deserialize)]
pub struct SegmentResponse {
    /// Number of pixels in the segmented mask.
    pub total_pixels: u64,
    /// Pixel count per predicted class.
    pub classes: Vec<SegmentClass>,
}

/// Pixel count for one surface class.
#[derive(Debug, Deserialize)]
pub struct SegmentClass {
    /// Class name.
    pub label: String,
    /// Pixels assigned to the class.
    pub pixels: u64,
}

/// `POST /classify` response body.
#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    scores: Vec<f64>,
}

/// Counts detections per label, skipping those below `min_confidence`.
#[must_use]
pub fn count_detections(response: &DetectResponse, min_confidence: f64) -> EquipmentCounts {
    let mut counts = EquipmentCounts::new();
    for detection in &response.detections {
        if detection.confidence >= min_confidence {
            counts.increment(detection.label.clone());
        }
    }
    counts
}

/// Converts per-class pixel counts into coverage fractions.
///
/// # Errors
///
/// Returns [`VisionError::InvalidResponse`] if the mask is empty, the
/// class counts exceed the mask size, or summing them overflows.
#[allow(clippy::cast_precision_loss)]
pub fn distribution_from_pixels(
    response: &SegmentResponse,
) -> Result<SurfaceDistribution, VisionError> {
    if response.total_pixels == 0 {
        return Err(VisionError::InvalidResponse {
            message: "segmentation mask has zero pixels".to_string(),
        });
    }

    let overflow = || VisionError::InvalidResponse {
        message: "segmentation pixel counts overflow".to_string(),
    };

    let mut pixels_by_label = std::collections::BTreeMap::<&str, u64>::new();
    for class in &response.classes {
        let pixels = pixels_by_label.entry(class.label.as_str()).or_insert(0);
        *pixels = pixels.checked_add(class.pixels).ok_or_else(overflow)?;
    }

    let assigned = pixels_by_label
        .values()
        .try_fold(0_u64, |sum, &pixels| sum.checked_add(pixels))
        .ok_or_else(overflow)?;
    if assigned > response.total_pixels {
        return Err(VisionError::InvalidResponse {
            message: format!(
                "segmentation assigned {assigned} pixels but mask has {}",
                response.total_pixels
            ),
        });
    }

    let total = response.total_pixels as f64;
    Ok(pixels_by_label
        .into_iter()
        .map(|(label, pixels)| (label.to_string(), pixels as f64 / total))
        .collect())
}

/// Extracts a readable message from an error response body.
///
/// Understands `{"detail": ".."}` and `{"error": ".."}` bodies and falls
/// back to the raw status and body.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: Option<String>,
        error: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|e| e.detail.or(e.error))
        .map_or_else(
            || format!("HTTP {status}: {body}"),
            |message| format!("HTTP {status}: {message}"),
        )
}
