#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Analysis pipeline for construction site photos.
//!
//! [`Analyzer::analyze`] runs one request through a fixed sequence of hard
//! gates:
//!
//! 1. decode the upload into an RGB image
//! 2. check that the image plausibly shows the declared activity
//! 3. extract equipment counts and the surface coverage distribution
//! 4. load the previous report for the location
//! 5. compute the coverage gain since that report
//! 6. assemble the new report
//! 7. persist it, replacing the previous one
//!
//! Any failure aborts the request with an [`AnalysisError`]. Nothing is
//! retried and nothing is persisted unless every step succeeds.

pub mod decode;
pub mod locks;
pub mod progress;

use std::sync::Arc;

use site_progress_models::{EquipmentCounts, ProgressDelta, Report, SurfaceDistribution};
use site_progress_store::{ReportStore, StoreError, key_for};
use site_progress_vision::{Photo, VisionCapabilities, VisionError};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::locks::KeyedLocks;

/// Per-request pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Received,
    Decoded,
    Validated,
    Extracted,
    Compared,
    Assembled,
    Persisted,
    Done,
}

/// The operation that failed inside an [`AnalysisError::AnalysisFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Step {
    Decoding,
    Validation,
    Detection,
    Segmentation,
    StageOfWork,
}

/// Coarse classification of an [`AnalysisError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request: bad metadata or an unreadable image.
    InvalidInput,
    /// The image does not match the declared activity.
    ValidationFailed,
    /// A vision capability failed or returned an unusable result.
    AnalysisFailed,
    /// The stored report for the location cannot be read.
    StoreCorrupted,
    /// The report store could not be read or written.
    StoreUnavailable,
}

impl ErrorKind {
    /// Returns `true` if the caller can fix the request and resubmit.
    #[must_use]
    pub const fn is_caller_error(self) -> bool {
        matches!(self, Self::InvalidInput | Self::ValidationFailed)
    }
}

/// Errors that abort an analysis request.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Request metadata is missing or unusable.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What is wrong with the request.
        message: String,
    },

    /// The uploaded bytes are empty or not a decodable image.
    #[error("{message}")]
    InvalidImage {
        /// Decoder failure description.
        message: String,
    },

    /// The image does not plausibly show the declared activity.
    #[error(
        "Image validation failed. The image does not appear to show '{activity_type}' content."
    )]
    ValidationFailed {
        /// The activity the caller declared.
        activity_type: String,
    },

    /// A vision capability failed or produced an unusable result.
    #[error("Analysis failed during {step}: {message}")]
    AnalysisFailed {
        /// Which operation failed.
        step: Step,
        /// Description of the failure.
        message: String,
        /// Underlying capability error, if any.
        #[source]
        source: Option<VisionError>,
    },

    /// The existing report for the location is unreadable.
    #[error("Stored report is corrupted: {source}")]
    StoreCorrupted {
        /// Store failure.
        #[source]
        source: StoreError,
    },

    /// The report store failed for a reason other than corruption.
    #[error("Report store unavailable: {source}")]
    StoreUnavailable {
        /// Store failure.
        #[source]
        source: StoreError,
    },
}

impl AnalysisError {
    /// The coarse kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } | Self::InvalidImage { .. } => ErrorKind::InvalidInput,
            Self::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Self::AnalysisFailed { .. } => ErrorKind::AnalysisFailed,
            Self::StoreCorrupted { .. } => ErrorKind::StoreCorrupted,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
        }
    }

    fn capability(step: Step, source: VisionError) -> Self {
        Self::AnalysisFailed {
            step,
            message: source.to_string(),
            source: Some(source),
        }
    }
}

impl From<StoreError> for AnalysisError {
    fn from(source: StoreError) -> Self {
        match source {
            StoreError::Corrupted { .. } => Self::StoreCorrupted { source },
            StoreError::InvalidKey { location_stretch } => Self::InvalidInput {
                message: format!(
                    "location_stretch '{location_stretch}' contains no usable characters"
                ),
            },
            StoreError::Io { .. } | StoreError::Serialize(_) => Self::StoreUnavailable { source },
        }
    }
}

/// One photo submission.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Raw uploaded bytes.
    pub image_bytes: Vec<u8>,
    /// MIME type reported by the client, used as a decoding hint.
    pub content_type: Option<String>,
    /// Declared activity (e.g. `"asphalt laying"`).
    pub activity_type: String,
    /// Free-text location description; the storage key is derived from it.
    pub location_stretch: String,
    /// Uploaded file name.
    pub filename: String,
}

/// Runs analysis requests against injected vision capabilities and a
/// report store.
pub struct Analyzer {
    capabilities: VisionCapabilities,
    store: Arc<dyn ReportStore>,
    locks: KeyedLocks,
}

impl Analyzer {
    #[must_use]
    pub fn new(capabilities: VisionCapabilities, store: Arc<dyn ReportStore>) -> Self {
        Self {
            capabilities,
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// The report store this analyzer persists into.
    #[must_use]
    pub fn store(&self) -> &dyn ReportStore {
        self.store.as_ref()
    }

    /// Analyzes one photo and persists the resulting report.
    ///
    /// Requests for the same location are serialized from the history
    /// lookup through persistence, so each report's delta is computed
    /// against the report it replaces.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] at the first failing step; see the crate
    /// docs for the sequence. No report is persisted on error.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<Report, AnalysisError> {
        let location_key = key_for(&request.location_stretch);
        log::info!(
            "Analyzing '{}' (activity '{}', location '{}')",
            request.filename,
            request.activity_type,
            request.location_stretch
        );

        let mut run = Run {
            location_key: &location_key,
            stage: Stage::Received,
        };

        match self.run(request, &mut run).await {
            Ok(report) => {
                run.advance(Stage::Done);
                log::info!(
                    "Report for '{location_key}': stage of work '{}', {} equipment, {} delta entries",
                    report.stage_of_work,
                    report.equipment_counts.total(),
                    report.progress_delta.len()
                );
                Ok(report)
            }
            Err(e) => {
                run.fail(&e);
                Err(e)
            }
        }
    }

    async fn run(&self, request: AnalysisRequest, run: &mut Run<'_>) -> Result<Report, AnalysisError> {
        check_metadata(&request, run.location_key)?;

        let AnalysisRequest {
            image_bytes,
            content_type,
            activity_type,
            location_stretch,
            filename,
        } = request;

        let photo = decode::decode_photo(image_bytes, content_type).await?;
        run.advance(Stage::Decoded);

        self.check_activity(&photo, &activity_type).await?;
        run.advance(Stage::Validated);

        let (equipment_counts, surface_distribution) = self.extract(&photo).await?;
        run.advance(Stage::Extracted);

        let _guard = self.locks.acquire(run.location_key).await;

        let previous = self.store.load_latest(&location_stretch).await?;
        let progress_delta = previous.as_ref().map_or_else(ProgressDelta::new, |prev| {
            progress::compute(&prev.surface_distribution, &surface_distribution)
        });
        run.advance(Stage::Compared);

        let stage_of_work = surface_distribution
            .dominant_class()
            .ok_or_else(|| AnalysisError::AnalysisFailed {
                step: Step::StageOfWork,
                message: "segmentation produced no surface classes".to_string(),
                source: None,
            })?
            .to_string();

        let report = Report {
            location_key: run.location_key.to_string(),
            activity_type,
            stage_of_work,
            surface_distribution,
            equipment_counts,
            progress_delta,
            source_filename: filename,
            observed_issues: Vec::new(),
            recommendations: Vec::new(),
            observed_at: Some(chrono::Utc::now()),
        };
        run.advance(Stage::Assembled);

        self.store.save(&location_stretch, &report).await?;
        run.advance(Stage::Persisted);

        Ok(report)
    }

    async fn check_activity(&self, photo: &Photo, activity_type: &str) -> Result<(), AnalysisError> {
        let plausible = self
            .capabilities
            .validator
            .validate(photo, activity_type)
            .await
            .map_err(|e| AnalysisError::capability(Step::Validation, e))?;

        if plausible {
            Ok(())
        } else {
            Err(AnalysisError::ValidationFailed {
                activity_type: activity_type.to_string(),
            })
        }
    }

    /// Runs detection and segmentation. Both are always attempted; the
    /// first failure is reported.
    async fn extract(
        &self,
        photo: &Photo,
    ) -> Result<(EquipmentCounts, SurfaceDistribution), AnalysisError> {
        let detected = self.capabilities.detector.detect(photo).await;
        let segmented = self.capabilities.segmenter.segment(photo).await;

        let equipment_counts = detected.map_err(|e| AnalysisError::capability(Step::Detection, e))?;
        let surface_distribution =
            segmented.map_err(|e| AnalysisError::capability(Step::Segmentation, e))?;

        surface_distribution
            .validate()
            .map_err(|e| AnalysisError::AnalysisFailed {
                step: Step::Segmentation,
                message: e.to_string(),
                source: None,
            })?;

        Ok((equipment_counts, surface_distribution))
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

fn check_metadata(request: &AnalysisRequest, location_key: &str) -> Result<(), AnalysisError> {
    if request.activity_type.trim().is_empty() {
        return Err(AnalysisError::InvalidInput {
            message: "activity_type must not be empty".to_string(),
        });
    }
    if location_key.is_empty() {
        return Err(AnalysisError::InvalidInput {
            message: format!(
                "location_stretch '{}' contains no usable characters",
                request.location_stretch
            ),
        });
    }
    Ok(())
}

/// Tracks and logs the state of one request.
struct Run<'a> {
    location_key: &'a str,
    stage: Stage,
}

impl Run<'_> {
    fn advance(&mut self, next: Stage) {
        log::debug!("[{}] {} -> {next}", self.location_key, self.stage);
        self.stage = next;
    }

    fn fail(&self, error: &AnalysisError) {
        let kind = error.kind();
        if kind.is_caller_error() {
            log::warn!("[{}] failed after {} ({kind}): {error}", self.location_key, self.stage);
        } else {
            log::error!("[{}] failed after {} ({kind}): {error}", self.location_key, self.stage);
        }
    }
}
