//! One-JSON-file-per-location report store.

use std::path::{Path, PathBuf};

use serde::Serialize as _;
use site_progress_models::Report;

use crate::{ReportStore, StoreError, key_for};

/// Report store backed by `<dir>/<location key>.json` files.
///
/// The directory is not required to exist until the first save. Writes go
/// to a temporary sibling file that is then renamed over the record, so a
/// concurrent reader in another process sees either the old or the new
/// report, never a partial one.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Creates a store rooted at `dir`. Nothing is touched on disk.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates a store rooted at `REPORTS_DIR`, or [`crate::DEFAULT_REPORTS_DIR`]
    /// when the variable is unset.
    #[must_use]
    pub fn from_env() -> Self {
        let dir = std::env::var("REPORTS_DIR")
            .unwrap_or_else(|_| crate::DEFAULT_REPORTS_DIR.to_string());
        Self::new(dir)
    }

    /// The directory holding report files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `location_stretch`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if the derived key is empty.
    pub fn record_path(&self, location_stretch: &str) -> Result<PathBuf, StoreError> {
        let key = key_for(location_stretch);
        if key.is_empty() {
            return Err(StoreError::InvalidKey {
                location_stretch: location_stretch.to_string(),
            });
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait::async_trait]
impl ReportStore for JsonFileStore {
    async fn load_latest(&self, location_stretch: &str) -> Result<Option<Report>, StoreError> {
        let path = self.record_path(location_stretch)?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No previous report at {}", path.display());
                return Ok(None);
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        match serde_json::from_slice::<Report>(&bytes) {
            Ok(report) => Ok(Some(report)),
            Err(source) => {
                log::error!("Unreadable report record {}: {source}", path.display());
                Err(StoreError::Corrupted { path, source })
            }
        }
    }

    async fn save(&self, location_stretch: &str, report: &Report) -> Result<(), StoreError> {
        let path = self.record_path(location_stretch)?;
        let body = to_pretty_json(report)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let tmp_path = self.dir.join(format!(
            ".{}.{}.tmp",
            key_for(location_stretch),
            uuid::Uuid::new_v4()
        ));

        if let Err(source) = tokio::fs::write(&tmp_path, &body).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io {
                path: tmp_path,
                source,
            });
        }

        if let Err(source) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io { path, source });
        }

        log::info!("Saved report for '{}' to {}", report.location_key, path.display());
        Ok(())
    }
}

/// Serializes with a four-space indent so records stay easy to inspect.
fn to_pretty_json(report: &Report) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    report
        .serialize(&mut serializer)
        .map_err(StoreError::Serialize)?;
    buf.push(b'\n');
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use site_progress_models::{EquipmentCounts, ProgressDelta, SurfaceDistribution};

    use super::*;

    fn temp_store() -> JsonFileStore {
        let dir = std::env::temp_dir()
            .join(format!("site_progress_store_test_{}", uuid::Uuid::new_v4()))
            .join("reports");
        JsonFileStore::new(dir)
    }

    fn cleanup(store: &JsonFileStore) {
        if let Some(parent) = store.dir().parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    fn report(location: &str, stage: &str, soil: f64) -> Report {
        Report {
            location_key: key_for(location),
            activity_type: "earthworks".to_string(),
            stage_of_work: stage.to_string(),
            surface_distribution: SurfaceDistribution::from([("soil", soil)]),
            equipment_counts: EquipmentCounts::from([("truck", 2)]),
            progress_delta: ProgressDelta::new(),
            source_filename: "site.jpg".to_string(),
            observed_issues: Vec::new(),
            recommendations: Vec::new(),
            observed_at: None,
        }
    }

    #[tokio::test]
    async fn load_from_missing_directory_is_absent() {
        let store = temp_store();
        assert!(!store.dir().exists());
        assert_eq!(store.load_latest("Elm-7").await.unwrap(), None);
        assert!(!store.dir().exists());
    }

    #[tokio::test]
    async fn save_creates_directory_and_round_trips() {
        let store = temp_store();
        let r = report("Elm-7", "soil", 0.7);

        store.save("Elm-7", &r).await.unwrap();

        assert!(store.dir().join("Elm-7.json").exists());
        assert_eq!(store.load_latest("Elm-7").await.unwrap(), Some(r));
        cleanup(&store);
    }

    #[tokio::test]
    async fn second_save_overwrites_first() {
        let store = temp_store();
        let first = report("Elm-7", "soil", 0.7);
        let mut second = report("Elm-7", "asphalt", 0.5);
        second.equipment_counts = EquipmentCounts::new();

        store.save("Elm-7", &first).await.unwrap();
        store.save("Elm-7", &second).await.unwrap();

        assert_eq!(store.load_latest("Elm-7").await.unwrap(), Some(second));
        cleanup(&store);
    }

    #[tokio::test]
    async fn colliding_locations_share_a_record() {
        let store = temp_store();
        let r = report("Main St. #5", "soil", 0.4);

        store.save("Main St. #5", &r).await.unwrap();

        assert_eq!(store.load_latest("Main St #5").await.unwrap(), Some(r));
        cleanup(&store);
    }

    #[tokio::test]
    async fn corrupted_record_is_an_error_not_absent() {
        let store = temp_store();
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.dir().join("Elm-7.json"), b"{ not json").unwrap();

        let err = store.load_latest("Elm-7").await.unwrap_err();
        assert!(err.is_corrupted(), "unexpected error: {err}");
        cleanup(&store);
    }

    #[tokio::test]
    async fn save_into_unusable_directory_is_an_io_error() {
        let store = temp_store();
        let parent = store.dir().parent().unwrap().to_path_buf();
        std::fs::write(&parent, b"not a directory").unwrap();

        let err = store
            .save("Elm-7", &report("Elm-7", "soil", 0.7))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Io { .. }), "unexpected error: {err}");
        assert!(!err.is_corrupted());
        std::fs::remove_file(&parent).unwrap();
    }

    #[tokio::test]
    async fn unusable_key_is_rejected() {
        let store = temp_store();
        let err = store.load_latest("#/ .").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn record_is_indented_json_with_report_field_names() {
        let store = temp_store();
        store
            .save("Elm-7", &report("Elm-7", "soil", 0.7))
            .await
            .unwrap();

        let text = std::fs::read_to_string(store.dir().join("Elm-7.json")).unwrap();
        assert!(text.contains("\n    \"location_key\": \"Elm-7\""));
        for field in [
            "activity_type",
            "stage_of_work",
            "surface_distribution",
            "equipment_counts",
            "progress_delta",
            "source_filename",
            "observed_issues",
            "recommendations",
        ] {
            assert!(text.contains(&format!("\"{field}\"")), "missing {field}");
        }
        cleanup(&store);
    }
}
