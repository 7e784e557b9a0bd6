//! Parsing of the `multipart/form-data` analysis upload.
//!
//! The form carries two parts: `image` (the photo) and `metadata` (a JSON
//! string with `activity_type` and `location_stretch`). Unknown parts are
//! drained and ignored.

use actix_multipart::{Field, Multipart, MultipartError};
use futures::StreamExt as _;
use site_progress_analysis::AnalysisRequest;
use site_progress_server_models::AnalysisMetadata;
use thiserror::Error;

/// Problems with the shape of an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The multipart stream itself is malformed.
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    /// A required part was not sent.
    #[error("Missing required form field '{0}'")]
    MissingField(&'static str),

    /// The image part exceeds the configured limit.
    #[error("Image exceeds the maximum upload size of {limit} bytes")]
    TooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The metadata part is not valid JSON.
    #[error("Invalid metadata format. Must be valid JSON.")]
    MetadataJson(#[source] serde_json::Error),

    /// The metadata JSON lacks required fields or has wrong types.
    #[error("Error in metadata: {0}")]
    Metadata(#[source] serde_json::Error),

    /// The metadata part is not UTF-8.
    #[error("Metadata must be UTF-8 text")]
    MetadataEncoding,
}

/// Reads the whole upload and turns it into an [`AnalysisRequest`].
///
/// # Errors
///
/// Returns [`UploadError`] if a part is missing, oversized, or malformed.
pub async fn read_request(
    payload: &mut Multipart,
    max_image_bytes: usize,
) -> Result<AnalysisRequest, UploadError> {
    let mut image: Option<(Vec<u8>, Option<String>, String)> = None;
    let mut metadata: Option<Vec<u8>> = None;

    while let Some(field) = payload.next().await {
        let mut field = field?;
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "image" => {
                let content_type = field.content_type().map(ToString::to_string);
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or("upload")
                    .to_string();
                let bytes = read_field(&mut field, max_image_bytes).await?;
                log::debug!(
                    "Received image part '{filename}' ({} bytes, {content_type:?})",
                    bytes.len()
                );
                image = Some((bytes, content_type, filename));
            }
            "metadata" => {
                // Metadata is small; reuse the image limit as a sanity cap.
                metadata = Some(read_field(&mut field, max_image_bytes).await?);
            }
            other => {
                log::debug!("Ignoring unexpected form field '{other}'");
                while let Some(chunk) = field.next().await {
                    chunk?;
                }
            }
        }
    }

    let metadata = metadata.ok_or(UploadError::MissingField("metadata"))?;
    let metadata = parse_metadata(&metadata)?;
    let (image_bytes, content_type, filename) = image.ok_or(UploadError::MissingField("image"))?;

    Ok(AnalysisRequest {
        image_bytes,
        content_type,
        activity_type: metadata.activity_type,
        location_stretch: metadata.location_stretch,
        filename,
    })
}

/// Parses the metadata part, separating bad JSON from bad fields.
///
/// # Errors
///
/// Returns [`UploadError::MetadataJson`], [`UploadError::Metadata`], or
/// [`UploadError::MetadataEncoding`].
pub fn parse_metadata(raw: &[u8]) -> Result<AnalysisMetadata, UploadError> {
    let text = std::str::from_utf8(raw).map_err(|_| UploadError::MetadataEncoding)?;
    let value: serde_json::Value = serde_json::from_str(text).map_err(UploadError::MetadataJson)?;
    serde_json::from_value(value).map_err(UploadError::Metadata)
}

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, UploadError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        if buf.len() + chunk.len() > limit {
            return Err(UploadError::TooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}
