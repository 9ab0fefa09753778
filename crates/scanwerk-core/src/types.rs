// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanwerk document scanner.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanwerkError};

/// A position in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Multiply both coordinates by `factor`.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
        }
    }

    fn is_usable(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.x >= 0.0 && self.y >= 0.0
    }
}

/// Four-corner outline of a document in image coordinates.
///
/// The outline may be an arbitrary (convex) quadrilateral; it is not required
/// to be axis-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropBounds {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
}

impl CropBounds {
    pub fn new(top_left: Point, top_right: Point, bottom_left: Point, bottom_right: Point) -> Self {
        Self {
            top_left,
            top_right,
            bottom_left,
            bottom_right,
        }
    }

    /// Axis-aligned rectangle with its top-left corner at `(x, y)`.
    pub fn from_rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            top_left: Point::new(x, y),
            top_right: Point::new(x + width, y),
            bottom_left: Point::new(x, y + height),
            bottom_right: Point::new(x + width, y + height),
        }
    }

    /// Corners in polygon order: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// Enclosed area via the shoelace formula.
    pub fn area(&self) -> f64 {
        let corners = self.corners();
        let mut twice_area = 0.0f64;
        for i in 0..corners.len() {
            let a = corners[i];
            let b = corners[(i + 1) % corners.len()];
            twice_area += a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
        }
        twice_area.abs() / 2.0
    }

    /// Every corner multiplied by `factor` (used to move between working and
    /// original resolution).
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            top_left: self.top_left.scaled(factor),
            top_right: self.top_right.scaled(factor),
            bottom_left: self.bottom_left.scaled(factor),
            bottom_right: self.bottom_right.scaled(factor),
        }
    }

    /// Clamp every corner into `[0, width] x [0, height]`.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let clamp = |p: Point| Point::new(p.x.clamp(0.0, width as f32), p.y.clamp(0.0, height as f32));
        Self {
            top_left: clamp(self.top_left),
            top_right: clamp(self.top_right),
            bottom_left: clamp(self.bottom_left),
            bottom_right: clamp(self.bottom_right),
        }
    }

    /// Whether all four corners are finite, non-negative, and enclose a
    /// non-trivial area.
    pub fn is_usable(&self) -> bool {
        self.corners().iter().all(Point::is_usable) && self.area() >= 1.0
    }
}

/// Colour treatment applied as the last enhancement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanFilter {
    /// Keep colour, with a slight saturation boost.
    #[default]
    Passthrough,
    /// Replace every channel with luminance.
    Grayscale,
    /// Adaptive threshold to pure black and white.
    BlackWhite,
}

/// Encoding of the processed raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum OutputFormat {
    /// Lossy JPEG with the given quality (1-100).
    Jpeg { quality: u8 },
    /// Lossless PNG.
    Png,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Jpeg { quality: 92 }
    }
}

impl OutputFormat {
    /// MIME type of the encoded output.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// Per-call scan settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanOptions {
    pub filter: ScanFilter,
    pub enhance_contrast: bool,
    pub sharpen: bool,
    pub remove_shadows: bool,
    pub auto_crop: bool,
    /// Processing-resolution cap in pixels.
    pub max_width: u32,
    /// Manual outline in original image coordinates; bypasses detection.
    pub crop_bounds: Option<CropBounds>,
    pub output_format: OutputFormat,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            filter: ScanFilter::Passthrough,
            enhance_contrast: true,
            sharpen: true,
            remove_shadows: true,
            auto_crop: true,
            max_width: 1200,
            crop_bounds: None,
            output_format: OutputFormat::default(),
        }
    }
}

impl ScanOptions {
    /// Structural checks that need no pixel data.
    pub fn validate(&self) -> Result<()> {
        if self.max_width == 0 {
            return Err(ScanwerkError::InvalidOptions(
                "max_width must be greater than zero".into(),
            ));
        }
        if let OutputFormat::Jpeg { quality } = self.output_format {
            if !(1..=100).contains(&quality) {
                return Err(ScanwerkError::InvalidOptions(format!(
                    "JPEG quality {quality} outside 1..=100"
                )));
            }
        }
        match &self.crop_bounds {
            Some(bounds) if !bounds.is_usable() => Err(ScanwerkError::InvalidOptions(format!(
                "manual crop bounds are not usable: {bounds:?}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Which branch the scan orchestrator took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Detection passed the confidence gate and the crop was applied.
    AutoCropped,
    /// Caller-supplied bounds were applied.
    ManualCrop,
    /// A candidate was found but did not qualify for auto-crop.
    LowConfidence,
    /// No candidate survived edge or colour-contrast detection.
    NotDetected,
    /// The corrected output would have been smaller than the minimum size.
    GeometryDegenerate,
    /// Auto-crop disabled and no manual bounds given.
    Skipped,
}

impl ScanOutcome {
    /// Whether a crop was applied (and therefore enhancement ran).
    pub fn is_cropped(&self) -> bool {
        matches!(self, Self::AutoCropped | Self::ManualCrop)
    }
}

/// Detector that produced a candidate outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Canny-style edges plus connected components.
    Edges,
    /// Colour difference against the sampled background.
    ColorContrast,
}
