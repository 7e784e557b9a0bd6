//! A decoded site photo shared by every capability call of one request.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, RgbImage};
use tokio::sync::OnceCell;

use crate::VisionError;

/// An RGB photo plus its lazily encoded PNG upload form.
///
/// The PNG is produced at most once per photo, on a blocking thread, and
/// reused by every capability that needs to upload the image.
#[derive(Debug)]
pub struct Photo {
    pixels: Arc<RgbImage>,
    png: OnceCell<Vec<u8>>,
}

impl Photo {
    #[must_use]
    pub fn new(pixels: RgbImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
            png: OnceCell::new(),
        }
    }

    /// The decoded pixels.
    #[must_use]
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// PNG encoding of the photo, computed on first use.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::Encode`] if encoding fails, or
    /// [`VisionError::Join`] if the encoding task panics.
    pub async fn png(&self) -> Result<&[u8], VisionError> {
        let bytes = self
            .png
            .get_or_try_init(|| async {
                let pixels = Arc::clone(&self.pixels);
                tokio::task::spawn_blocking(move || encode_png(&pixels)).await?
            })
            .await?;
        Ok(bytes)
    }
}

impl From<RgbImage> for Photo {
    fn from(pixels: RgbImage) -> Self {
        Self::new(pixels)
    }
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>, VisionError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    log::debug!(
        "Encoded {}x{} photo as PNG ({} bytes)",
        image.width(),
        image.height(),
        buf.get_ref().len()
    );
    Ok(buf.into_inner())
}
