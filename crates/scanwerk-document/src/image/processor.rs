// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: decoding source images and encoding processed rasters.
// Operates on in-memory images using the `image` crate.

use std::borrow::Cow;

use image::{DynamicImage, ImageFormat, RgbImage};
use scanwerk_core::error::ScanwerkError;
use scanwerk_core::types::OutputFormat;
use tracing::{debug, info, instrument};

/// Decoded, non-empty source image.
pub struct ImageProcessor {
    /// The decoded image.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Load an image from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, ScanwerkError> {
        let img = image::open(path.as_ref()).map_err(|err| {
            ScanwerkError::SourceUnavailable(format!(
                "failed to open {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        info!(width = img.width(), height = img.height(), "Image loaded");
        Self::checked(img)
    }

    /// Create a processor from raw encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, ScanwerkError> {
        let img = image::load_from_memory(data).map_err(|err| {
            ScanwerkError::SourceUnavailable(format!("failed to decode image: {}", err))
        })?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Self::checked(img)
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Result<Self, ScanwerkError> {
        Self::checked(image)
    }

    fn checked(image: DynamicImage) -> Result<Self, ScanwerkError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ScanwerkError::SourceUnavailable(format!(
                "image has no pixels ({}x{})",
                image.width(),
                image.height()
            )));
        }
        Ok(Self { image })
    }

    // -- Accessors ------------------------------------------------------------

    /// Consume the processor and return the underlying `DynamicImage`.
    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    /// Consume the processor and return an 8-bit RGB buffer.
    pub fn into_rgb(self) -> RgbImage {
        match self.image {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        }
    }
}

/// Borrow `image` as 8-bit RGB, converting only when it is stored otherwise.
pub fn rgb_view(image: &DynamicImage) -> Cow<'_, RgbImage> {
    match image {
        DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
        other => Cow::Owned(other.to_rgb8()),
    }
}

/// Encode an RGB raster as JPEG or PNG bytes.
pub fn encode_rgb(image: &RgbImage, format: OutputFormat) -> Result<Vec<u8>, ScanwerkError> {
    let mut buffer = Vec::new();
    match format {
        OutputFormat::Jpeg { quality } => {
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
            image.write_with_encoder(encoder).map_err(|err| {
                ScanwerkError::Encoding(format!("JPEG encoding failed: {}", err))
            })?;
        }
        OutputFormat::Png => {
            let mut cursor = std::io::Cursor::new(&mut buffer);
            image.write_to(&mut cursor, ImageFormat::Png).map_err(|err| {
                ScanwerkError::Encoding(format!("PNG encoding failed: {}", err))
            })?;
        }
    }
    debug!(bytes = buffer.len(), mime = format.mime_type(), "Raster encoded");
    Ok(buffer)
}
