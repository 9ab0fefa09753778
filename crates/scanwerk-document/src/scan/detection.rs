// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document outline detection: the edge-based quad finder with the
// colour-contrast detector as fallback, plus the scoring helpers both share.

use image::RgbImage;
use scanwerk_core::config::{PipelineConfig, QuadConfig};
use scanwerk_core::types::{CropBounds, DetectionMethod};
use tracing::{debug, info, instrument};

use super::{contour, edges, fallback, smoothing};

/// A candidate document outline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Outline in the coordinate space of the image that was searched.
    pub bounds: CropBounds,
    /// In [0, 1].
    pub confidence: f32,
    pub method: DetectionMethod,
}

/// Run grayscale, smoothing, edges, dilation, and the quad finder on a
/// working-resolution image, falling back to colour contrast when no edge
/// candidate survives.
#[instrument(skip_all, fields(width = working.width(), height = working.height()))]
pub fn detect_document(working: &RgbImage, config: &PipelineConfig) -> Option<Detection> {
    let gray = smoothing::to_luminance(working);
    let smoothed = smoothing::smooth(&gray, config.edges.smoothing);
    let edge_map = edges::detect_edges(
        &smoothed,
        config.edges.low_threshold,
        config.edges.high_threshold,
    );
    let dilated = edges::dilate_edges(&edge_map, config.edges.dilate_radius);

    if let Some(found) = contour::find_document_quad(&edge_map, &dilated, &config.quad) {
        info!(confidence = found.confidence, "Document outline found from edges");
        return Some(found);
    }

    debug!("No edge candidate; trying colour-contrast fallback");
    let found = fallback::detect_by_color_contrast(working, &config.fallback, &config.quad);
    match &found {
        Some(d) => info!(confidence = d.confidence, "Document outline found from colour contrast"),
        None => info!("No document outline found"),
    }
    found
}

/// Pixel-space rectangle, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn area(&self) -> f32 {
        self.width() as f32 * self.height() as f32
    }

    pub fn aspect(&self) -> f32 {
        self.width() as f32 / self.height() as f32
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.min_x + self.max_x) as f32 / 2.0,
            (self.min_y + self.max_y) as f32 / 2.0,
        )
    }

    /// Whether the box comes within `margin_ratio * min(width, height)` of
    /// any image edge.
    pub fn touches_border(&self, width: u32, height: u32, margin_ratio: f32) -> bool {
        let margin = margin_ratio * width.min(height) as f32;
        self.min_x as f32 <= margin
            || self.min_y as f32 <= margin
            || (width - 1 - self.max_x) as f32 <= margin
            || (height - 1 - self.max_y) as f32 <= margin
    }

    pub fn to_bounds(&self) -> CropBounds {
        CropBounds::from_rect(
            self.min_x as f32,
            self.min_y as f32,
            self.width() as f32,
            self.height() as f32,
        )
    }
}

/// 1 at the frame center, falling to 0 at half the frame diagonal.
pub fn center_score(center: (f32, f32), width: u32, height: u32) -> f32 {
    let (fx, fy) = (width as f32 / 2.0, height as f32 / 2.0);
    let distance = ((center.0 - fx).powi(2) + (center.1 - fy).powi(2)).sqrt();
    let half_diagonal = (fx * fx + fy * fy).sqrt();
    (1.0 - distance / half_diagonal).clamp(0.0, 1.0)
}

/// 1 at the target area ratio, falling linearly to 0 at the band edge
/// furthest from it.
pub fn area_score(ratio: f32, config: &QuadConfig) -> f32 {
    let span = (config.target_area_ratio - config.min_area_ratio)
        .max(config.max_area_ratio - config.target_area_ratio)
        .max(f32::EPSILON);
    (1.0 - (ratio - config.target_area_ratio).abs() / span).clamp(0.0, 1.0)
}

/// Closeness of `aspect` (either orientation) to the nearest common paper
/// or card ratio; 0 once half a unit away.
pub fn aspect_score(aspect: f32, targets: &[f32]) -> f32 {
    if !(aspect.is_finite() && aspect > 0.0) {
        return 0.0;
    }
    let long_over_short = aspect.max(1.0 / aspect);
    targets
        .iter()
        .map(|t| (1.0 - (long_over_short - t).abs() / 0.5).clamp(0.0, 1.0))
        .fold(0.0, f32::max)
}
