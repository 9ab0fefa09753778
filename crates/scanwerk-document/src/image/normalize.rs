// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Working-resolution normalisation. Detection runs on a bounded-width copy of
// the source; coordinates found there are divided by the scale factor before
// they leave the pipeline.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::CropBounds;
use tracing::{debug, instrument};

use super::processor::rgb_view;

/// RGB copy of the source at working resolution.
#[derive(Debug, Clone)]
pub struct WorkingImage {
    pub pixels: RgbImage,
    /// `working_width / original_width`; never above 1.
    pub scale: f32,
    pub original_width: u32,
    pub original_height: u32,
}

impl WorkingImage {
    /// Map working-resolution bounds back to original coordinates.
    pub fn to_original(&self, bounds: &CropBounds) -> CropBounds {
        bounds.scaled(1.0 / self.scale)
    }

    /// Map original-coordinate bounds into working resolution.
    pub fn to_working(&self, bounds: &CropBounds) -> CropBounds {
        bounds.scaled(self.scale)
    }
}

/// Convert `image` to RGB and shrink it to at most `max_width` pixels wide.
///
/// Never upsamples: images already within the cap keep scale 1.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn normalize(image: &DynamicImage, max_width: u32) -> Result<WorkingImage> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(ScanwerkError::SourceUnavailable(format!(
            "image has no pixels ({width}x{height})"
        )));
    }
    if max_width == 0 {
        return Err(ScanwerkError::InvalidOptions(
            "max_width must be greater than zero".into(),
        ));
    }

    let rgb = rgb_view(image);
    if width <= max_width {
        debug!("Source within working width; no downsampling");
        return Ok(WorkingImage {
            pixels: rgb.into_owned(),
            scale: 1.0,
            original_width: width,
            original_height: height,
        });
    }

    let scale = max_width as f32 / width as f32;
    let working_height = ((height as f32 * scale).round() as u32).max(1);
    let pixels = imageops::resize(rgb.as_ref(), max_width, working_height, FilterType::Triangle);
    debug!(
        scale,
        working_width = max_width,
        working_height,
        "Downsampled to working resolution"
    );

    Ok(WorkingImage {
        pixels,
        scale,
        original_width: width,
        original_height: height,
    })
}
