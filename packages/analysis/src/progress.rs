//! Coverage gain between two observations of the same location.

use std::collections::BTreeSet;

use site_progress_models::{ProgressDelta, SurfaceDistribution};

/// Computes per-class coverage gain from `previous` to `current`.
///
/// Every class present in either distribution gets a `new_<label>` entry
/// equal to `max(0, current - previous)`, reading missing classes as 0.
/// Shrinking coverage reports 0, never a negative value.
///
/// Callers without a previous observation should use an empty
/// [`ProgressDelta`] instead of passing an empty `previous`: "no history"
/// and "history with zero coverage" are different inputs.
#[must_use]
pub fn compute(previous: &SurfaceDistribution, current: &SurfaceDistribution) -> ProgressDelta {
    let labels: BTreeSet<&str> = previous.labels().chain(current.labels()).collect();

    let mut delta = ProgressDelta::new();
    for label in labels {
        let prev = previous.get(label).unwrap_or(0.0);
        let curr = current.get(label).unwrap_or(0.0);
        delta.record(label, curr - prev);
    }
    delta
}
