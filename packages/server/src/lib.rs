#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for construction site progress analysis.
//!
//! Accepts photo uploads with activity/location metadata, runs them
//! through the analysis pipeline, and returns the stored progress report.
//! Vision capabilities are served by an external inference service
//! (`VISION_BASE_URL`); reports are kept as JSON files under
//! `REPORTS_DIR`.

pub mod config;
pub mod handlers;
pub mod upload;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use site_progress_analysis::Analyzer;
use site_progress_store::JsonFileStore;

pub use config::ServerConfig;

/// Shared application state.
pub struct AppState {
    /// The analysis pipeline, including its report store.
    pub analyzer: Arc<Analyzer>,
    /// Maximum accepted image size in bytes.
    pub max_upload_bytes: usize,
}

/// Registers the API routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route(
                "/analyze-progress",
                web::post().to(handlers::analyze_progress),
            )
            .route("/reports/{location}", web::get().to(handlers::latest_report)),
    );
}

/// Starts the site progress API server.
///
/// Builds the vision capabilities from the environment, opens the report
/// store, and starts the Actix-Web HTTP server. The caller provides the
/// async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the vision configuration is
/// missing, or the HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::from_env();

    log::info!("Connecting vision capabilities...");
    let capabilities = site_progress_vision::create_capabilities_from_env()
        .map_err(|e| std::io::Error::other(format!("Failed to set up vision capabilities: {e}")))?;

    log::info!("Using report directory {}", config.reports_dir.display());
    let store = Arc::new(JsonFileStore::new(&config.reports_dir));

    let state = web::Data::new(AppState {
        analyzer: Arc::new(Analyzer::new(capabilities, store)),
        max_upload_bytes: config.max_upload_bytes,
    });

    let cors_origin = config.cors_allowed_origin.clone();

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = cors_origin.as_deref().map_or_else(Cors::permissive, |origin| {
            Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header()
                .supports_credentials()
        });

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use actix_web::http::{StatusCode, header};
    use actix_web::{App, test};
    use image::{ImageFormat, RgbImage};
    use site_progress_models::{EquipmentCounts, SurfaceDistribution};
    use site_progress_vision::{
        ContentValidator, ObjectDetector, Photo, SurfaceSegmenter, VisionCapabilities, VisionError,
    };

    use super::*;

    const BOUNDARY: &str = "site-progress-test-boundary";

    /// Accepts any activity except `"knitting"`.
    struct StubVision;

    #[async_trait::async_trait]
    impl ContentValidator for StubVision {
        async fn validate(&self, _photo: &Photo, activity: &str) -> Result<bool, VisionError> {
            Ok(activity != "knitting")
        }
    }

    #[async_trait::async_trait]
    impl ObjectDetector for StubVision {
        async fn detect(&self, _photo: &Photo) -> Result<EquipmentCounts, VisionError> {
            Ok(EquipmentCounts::from([("truck", 1)]))
        }
    }

    #[async_trait::async_trait]
    impl SurfaceSegmenter for StubVision {
        async fn segment(&self, _photo: &Photo) -> Result<SurfaceDistribution, VisionError> {
            Ok(SurfaceDistribution::from([("asphalt", 0.3), ("soil", 0.7)]))
        }
    }

    fn state(max_upload_bytes: usize) -> (web::Data<AppState>, JsonFileStore) {
        let dir = std::env::temp_dir().join(format!("site_progress_server_test_{}", uuid::Uuid::new_v4()));
        let store = JsonFileStore::new(dir);
        let analyzer = Analyzer::new(
            VisionCapabilities::from_shared(Arc::new(StubVision)),
            Arc::new(store.clone()),
        );
        let state = web::Data::new(AppState {
            analyzer: Arc::new(analyzer),
            max_upload_bytes,
        });
        (state, store)
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(4, 4, image::Rgb([90, 90, 90]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    enum Part<'a> {
        File(&'a str, &'a [u8]),
        Text(&'a str, &'a str),
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::File(name, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"site.png\"\r\n\
                             Content-Type: image/png\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
                Part::Text(name, text) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{text}")
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(parts: &[Part<'_>]) -> actix_http::Request {
        test::TestRequest::post()
            .uri("/api/analyze-progress")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart_body(parts))
            .to_request()
    }

    const METADATA: &str = r#"{"activity_type": "asphalt laying", "location_stretch": "Elm-7"}"#;

    #[actix_web::test]
    async fn health_reports_version() {
        let (state, _) = state(1024);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["healthy"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[actix_web::test]
    async fn analyze_returns_and_stores_report() {
        let (state, store) = state(1024 * 1024);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let png = png_bytes();

        let resp = test::call_service(
            &app,
            upload(&[Part::Text("metadata", METADATA), Part::File("image", &png)]),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["location_key"], "Elm-7");
        assert_eq!(body["stage_of_work"], "soil");
        assert_eq!(body["source_filename"], "site.png");
        assert_eq!(body["progress_delta"], serde_json::json!({}));
        assert_eq!(body["equipment_counts"]["truck"], 1);

        let req = test::TestRequest::get().uri("/api/reports/Elm-7").to_request();
        let stored: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stored, body);

        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[actix_web::test]
    async fn mismatched_activity_is_bad_request() {
        let (state, store) = state(1024 * 1024);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let png = png_bytes();
        let metadata = r#"{"activity_type": "knitting", "location_stretch": "Elm-7"}"#;

        let resp = test::call_service(
            &app,
            upload(&[Part::Text("metadata", metadata), Part::File("image", &png)]),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "validation_failed");
        assert!(body["error"].as_str().unwrap().contains("'knitting'"));
        assert!(!store.dir().exists());
    }

    #[actix_web::test]
    async fn missing_or_malformed_metadata_is_bad_request() {
        let (state, _) = state(1024 * 1024);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let png = png_bytes();

        for parts in [
            vec![Part::File("image", &png)],
            vec![Part::Text("metadata", "{not json"), Part::File("image", &png)],
            vec![
                Part::Text("metadata", r#"{"activity_type": "paving"}"#),
                Part::File("image", &png),
            ],
            vec![Part::Text("metadata", METADATA)],
        ] {
            let resp = test::call_service(&app, upload(&parts)).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: serde_json::Value = test::read_body_json(resp).await;
            assert_eq!(body["kind"], "invalid_input");
        }
    }

    #[actix_web::test]
    async fn undecodable_image_is_bad_request() {
        let (state, _) = state(1024 * 1024);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let resp = test::call_service(
            &app,
            upload(&[
                Part::Text("metadata", METADATA),
                Part::File("image", b"not an image"),
            ]),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn oversized_image_is_rejected() {
        let (state, _) = state(16);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let png = png_bytes();

        let resp = test::call_service(
            &app,
            upload(&[Part::Text("metadata", "{}"), Part::File("image", &png)]),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[actix_web::test]
    async fn unknown_location_is_not_found() {
        let (state, _) = state(1024);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/reports/Nowhere-1").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[::core::prelude::v1::test]
    fn status_mapping_separates_caller_and_server_errors() {
        use site_progress_analysis::ErrorKind;

        assert_eq!(handlers::status_for(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(handlers::status_for(ErrorKind::ValidationFailed), StatusCode::BAD_REQUEST);
        for kind in [
            ErrorKind::AnalysisFailed,
            ErrorKind::StoreCorrupted,
            ErrorKind::StoreUnavailable,
        ] {
            assert_eq!(handlers::status_for(kind), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
