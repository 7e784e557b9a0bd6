//! Image decoding and color normalization.

use image::{ImageFormat, RgbImage};
use site_progress_vision::Photo;

use crate::{AnalysisError, Step};

/// Decodes an upload on a blocking thread, off the async runtime.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidImage`] as [`decode_image`] does, or
/// [`AnalysisError::AnalysisFailed`] if the decoding task panics.
pub async fn decode_photo(
    bytes: Vec<u8>,
    content_type: Option<String>,
) -> Result<Photo, AnalysisError> {
    let pixels = tokio::task::spawn_blocking(move || decode_image(&bytes, content_type.as_deref()))
        .await
        .map_err(|e| AnalysisError::AnalysisFailed {
            step: Step::Decoding,
            message: format!("decoding task failed: {e}"),
            source: None,
        })??;

    Ok(Photo::new(pixels))
}

/// Decodes uploaded bytes into an 8-bit RGB image.
///
/// `content_type` is used as a format hint when it names a known image
/// MIME type. If decoding with the hint fails, or no usable hint was
/// given, the format is sniffed from the bytes.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidImage`] if `bytes` is empty or cannot be
/// decoded as an image.
pub fn decode_image(bytes: &[u8], content_type: Option<&str>) -> Result<RgbImage, AnalysisError> {
    if bytes.is_empty() {
        return Err(AnalysisError::InvalidImage {
            message: "Empty image file".to_string(),
        });
    }

    let hinted = content_type
        .and_then(ImageFormat::from_mime_type)
        .and_then(|format| match image::load_from_memory_with_format(bytes, format) {
            Ok(img) => Some(img),
            Err(e) => {
                log::debug!("Decoding as {format:?} failed ({e}), sniffing format instead");
                None
            }
        });

    let img = match hinted {
        Some(img) => img,
        None => image::load_from_memory(bytes).map_err(|e| AnalysisError::InvalidImage {
            message: format!("Error processing image: {e}"),
        })?,
    };

    log::debug!(
        "Decoded image {}x{} ({:?})",
        img.width(),
        img.height(),
        img.color()
    );

    Ok(img.to_rgb8())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, Rgba, RgbaImage};

    use super::*;

    fn png_rgba() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([200, 100, 50, 128])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn normalizes_to_rgb() {
        let img = decode_image(&png_rgba(), Some("image/png")).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(0, 0).0, [200, 100, 50]);
    }

    #[test]
    fn wrong_hint_falls_back_to_sniffing() {
        let img = decode_image(&png_rgba(), Some("image/jpeg")).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
    }

    #[test]
    fn unknown_content_type_is_sniffed() {
        assert!(decode_image(&png_rgba(), Some("application/octet-stream")).is_ok());
        assert!(decode_image(&png_rgba(), None).is_ok());
    }

    #[test]
    fn empty_bytes_are_rejected() {
        let err = decode_image(&[], Some("image/png")).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidImage { .. }));
        assert_eq!(err.to_string(), "Empty image file");
    }

    #[tokio::test]
    async fn decodes_photo_off_the_runtime() {
        let photo = decode_photo(png_rgba(), Some("image/png".to_string()))
            .await
            .unwrap();
        assert_eq!(photo.pixels().dimensions(), (3, 2));

        let err = decode_photo(Vec::new(), None).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidImage { .. }));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = decode_image(b"definitely not an image", None).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidImage { .. }));
    }
}
