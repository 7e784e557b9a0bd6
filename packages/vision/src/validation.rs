//! Zero-shot activity validation policy.
//!
//! The classifier scores the image against several phrasings of the
//! claimed activity plus a few control phrasings. The verdict compares the
//! mean positive score with the mean control score: the image passes when
//! the positive share of the combined mean reaches the threshold.

use crate::VisionError;

/// Default minimum positive share required to accept an image.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Phrasings that should *not* match a genuine activity photo.
pub const CONTROL_PROMPTS: &[&str] = &["a photo of a different activity", "an unrelated photo"];

/// Candidate labels sent to the classifier for one activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    /// All labels, positive phrasings first.
    pub labels: Vec<String>,
    /// How many leading labels are positive phrasings.
    pub positive: usize,
}

impl PromptSet {
    /// Builds the prompt set for `activity_type`.
    #[must_use]
    pub fn for_activity(activity_type: &str) -> Self {
        let activity = activity_type.trim();
        let mut labels = vec![
            format!("a photo of {activity}"),
            format!("a construction site showing {activity}"),
            format!("{activity} work in progress"),
        ];
        let positive = labels.len();
        labels.extend(CONTROL_PROMPTS.iter().map(|p| (*p).to_string()));
        Self { labels, positive }
    }

    /// Applies the threshold policy to classifier `scores`, which must be
    /// aligned with [`Self::labels`].
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::InvalidResponse`] if the score count does not
    /// match, any score is negative or non-finite, or all scores are zero.
    pub fn verdict(&self, scores: &[f64], threshold: f64) -> Result<bool, VisionError> {
        let confidence = self.confidence(scores)?;
        log::debug!("Activity confidence {confidence:.3} (threshold {threshold:.3})");
        Ok(confidence >= threshold)
    }

    /// Positive share of the combined mean score, in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// See [`Self::verdict`].
    pub fn confidence(&self, scores: &[f64]) -> Result<f64, VisionError> {
        if scores.len() != self.labels.len() {
            return Err(VisionError::InvalidResponse {
                message: format!(
                    "expected {} classifier scores, got {}",
                    self.labels.len(),
                    scores.len()
                ),
            });
        }
        if let Some(bad) = scores.iter().find(|s| !s.is_finite() || **s < 0.0) {
            return Err(VisionError::InvalidResponse {
                message: format!("classifier returned invalid score {bad}"),
            });
        }

        let (positive, control) = scores.split_at(self.positive);
        let pos_mean = mean(positive);
        let neg_mean = mean(control);
        let total = pos_mean + neg_mean;

        if total <= 0.0 {
            return Err(VisionError::InvalidResponse {
                message: "classifier returned all-zero scores".to_string(),
            });
        }

        Ok(pos_mean / total)
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
