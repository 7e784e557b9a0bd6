#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data model for construction site progress reports.
//!
//! A [`Report`] is the unit of persistence: one per location key, holding
//! the surface coverage breakdown, equipment counts, and the progress
//! delta against the previous observation for the same location. All maps
//! are ordered so that JSON output and tie-breaking are deterministic.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix applied to surface class labels in a [`ProgressDelta`].
pub const NEW_COVERAGE_PREFIX: &str = "new_";

/// Coverage fraction per surface class (e.g. `"asphalt" -> 0.3`).
///
/// Fractions are in `[0, 1]` but are not required to sum to 1: the
/// segmenter may omit classes below its detection threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceDistribution(BTreeMap<String, f64>);

impl SurfaceDistribution {
    /// Creates an empty distribution.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets the coverage fraction for `label`, replacing any previous value.
    pub fn insert(&mut self, label: impl Into<String>, fraction: f64) {
        self.0.insert(label.into(), fraction);
    }

    /// Coverage fraction for `label`, if the class was observed.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.get(label).copied()
    }

    /// Iterates classes in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Iterates class labels in label order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the label with the largest coverage fraction.
    ///
    /// Ties go to the label that sorts first, so the same distribution
    /// always yields the same class. Returns `None` for an empty
    /// distribution.
    #[must_use]
    pub fn dominant_class(&self) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for (label, fraction) in self.iter() {
            match best {
                Some((_, top)) if fraction <= top => {}
                _ => best = Some((label, fraction)),
            }
        }
        best.map(|(label, _)| label)
    }

    /// Checks that every fraction is a finite number in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidFractionError`] naming the first offending class.
    pub fn validate(&self) -> Result<(), InvalidFractionError> {
        for (label, fraction) in self.iter() {
            if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
                return Err(InvalidFractionError {
                    label: label.to_string(),
                    fraction,
                });
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, f64)> for SurfaceDistribution {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, f64); N]> for SurfaceDistribution {
    fn from(entries: [(&str, f64); N]) -> Self {
        entries
            .into_iter()
            .map(|(label, fraction)| (label.to_string(), fraction))
            .collect()
    }
}

/// Error returned by [`SurfaceDistribution::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidFractionError {
    /// Surface class with the bad value.
    pub label: String,
    /// The rejected fraction.
    pub fraction: f64,
}

impl std::fmt::Display for InvalidFractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid coverage fraction {} for class '{}': expected 0.0-1.0",
            self.fraction, self.label
        )
    }
}

impl std::error::Error for InvalidFractionError {}

/// Number of detected objects per equipment class (e.g. `"truck" -> 2`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EquipmentCounts(BTreeMap<String, u32>);

impl EquipmentCounts {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds one detection of `label`.
    pub fn increment(&mut self, label: impl Into<String>) {
        *self.0.entry(label.into()).or_insert(0) += 1;
    }

    #[must_use]
    pub fn get(&self, label: &str) -> Option<u32> {
        self.0.get(label).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of detected objects across all classes.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().map(|&c| u64::from(c)).sum()
    }
}

impl FromIterator<(String, u32)> for EquipmentCounts {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, u32); N]> for EquipmentCounts {
    fn from(entries: [(&str, u32); N]) -> Self {
        entries
            .into_iter()
            .map(|(label, count)| (label.to_string(), count))
            .collect()
    }
}

/// Net coverage gain per surface class between two observations.
///
/// Keys are `new_<label>`; values are never negative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressDelta(BTreeMap<String, f64>);

impl ProgressDelta {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Records the gain for a surface class under its `new_<label>` key.
    ///
    /// Negative gains are clamped to zero.
    pub fn record(&mut self, label: &str, gain: f64) {
        self.0
            .insert(Self::key_for(label), if gain > 0.0 { gain } else { 0.0 });
    }

    /// The delta key for a surface class label.
    #[must_use]
    pub fn key_for(label: &str) -> String {
        format!("{NEW_COVERAGE_PREFIX}{label}")
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// A persisted progress report for one location.
///
/// Immutable once assembled. The report store keeps only the most recent
/// report per location key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Sanitized storage key derived from the caller's location string.
    pub location_key: String,
    /// Activity label supplied by the caller (e.g. `"asphalt laying"`).
    pub activity_type: String,
    /// Surface class with the largest coverage fraction.
    pub stage_of_work: String,
    /// Current coverage breakdown. Doubles as the completion view.
    pub surface_distribution: SurfaceDistribution,
    /// Detected equipment for this observation.
    pub equipment_counts: EquipmentCounts,
    /// Gain relative to the previous report; empty when there was none.
    pub progress_delta: ProgressDelta,
    /// Name of the uploaded file. Informational only.
    pub source_filename: String,
    /// Reserved; always empty for now.
    #[serde(default)]
    pub observed_issues: Vec<String>,
    /// Reserved; always empty for now.
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// When the report was assembled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_class_picks_largest_fraction() {
        let dist = SurfaceDistribution::from([("asphalt", 0.3), ("soil", 0.7)]);
        assert_eq!(dist.dominant_class(), Some("soil"));
    }

    #[test]
    fn dominant_class_breaks_ties_by_label_order() {
        let dist = SurfaceDistribution::from([("soil", 0.4), ("asphalt", 0.4), ("gravel", 0.2)]);
        assert_eq!(dist.dominant_class(), Some("asphalt"));
        assert_eq!(dist.dominant_class(), dist.clone().dominant_class());
    }

    #[test]
    fn dominant_class_of_empty_distribution_is_none() {
        assert_eq!(SurfaceDistribution::new().dominant_class(), None);
    }

    #[test]
    fn validate_rejects_out_of_range_fractions() {
        assert!(SurfaceDistribution::from([("soil", 0.0), ("sky", 1.0)])
            .validate()
            .is_ok());

        let err = SurfaceDistribution::from([("soil", -0.1)])
            .validate()
            .unwrap_err();
        assert_eq!(err.label, "soil");

        assert!(SurfaceDistribution::from([("soil", f64::NAN)])
            .validate()
            .is_err());
        assert!(SurfaceDistribution::from([("soil", 1.5)])
            .validate()
            .is_err());
    }

    #[test]
    fn progress_delta_clamps_negative_gain() {
        let mut delta = ProgressDelta::new();
        delta.record("soil", -0.2);
        delta.record("asphalt", 0.2);
        assert_eq!(delta.get("new_soil"), Some(0.0));
        assert_eq!(delta.get("new_asphalt"), Some(0.2));
    }

    #[test]
    fn equipment_counts_increment_and_total() {
        let mut counts = EquipmentCounts::new();
        counts.increment("truck");
        counts.increment("truck");
        counts.increment("person");
        assert_eq!(counts.get("truck"), Some(2));
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn report_serializes_with_flat_maps() {
        let report = Report {
            location_key: "Elm-7".to_string(),
            activity_type: "paving".to_string(),
            stage_of_work: "soil".to_string(),
            surface_distribution: SurfaceDistribution::from([("soil", 0.7)]),
            equipment_counts: EquipmentCounts::from([("truck", 1)]),
            progress_delta: ProgressDelta::new(),
            source_filename: "site.jpg".to_string(),
            observed_issues: Vec::new(),
            recommendations: Vec::new(),
            observed_at: None,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["surface_distribution"]["soil"], 0.7);
        assert_eq!(json["equipment_counts"]["truck"], 1);
        assert_eq!(json["progress_delta"], serde_json::json!({}));
        assert!(json.get("observed_at").is_none());
    }
}
