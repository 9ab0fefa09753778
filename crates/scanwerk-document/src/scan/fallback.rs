// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Colour-contrast fallback detector.

use image::RgbImage;
use scanwerk_core::config::{FallbackConfig, QuadConfig};
use scanwerk_core::types::DetectionMethod;
use tracing::{debug, instrument};

use super::detection::{BoundingBox, Detection, area_score, aspect_score, center_score};

/// Mean colour of the four corner patches.
pub fn estimate_background(image: &RgbImage, patch_ratio: f32) -> [f32; 3] {
    let (width, height) = image.dimensions();
    let patch = ((width.min(height) as f32 * patch_ratio) as u32).clamp(1, width.min(height));

    let origins = [
        (0, 0),
        (width - patch, 0),
        (0, height - patch),
        (width - patch, height - patch),
    ];
    let mut sum = [0.0f64; 3];
    let mut count = 0u64;
    for (ox, oy) in origins {
        for y in oy..oy + patch {
            for x in ox..ox + patch {
                let px = image.get_pixel(x, y).0;
                for c in 0..3 {
                    sum[c] += px[c] as f64;
                }
                count += 1;
            }
        }
    }
    sum.map(|s| (s / count as f64) as f32)
}

fn color_distance(px: [u8; 3], background: [f32; 3]) -> f32 {
    let dr = px[0] as f32 - background[0];
    let dg = px[1] as f32 - background[1];
    let db = px[2] as f32 - background[2];
    (dr * dr + dg * dg + db * db).sqrt()
}

/// Bounding box of pixels that differ from the corner-sampled background,
/// subject to the same geometry rejections as the edge detector.
///
/// Confidence never exceeds `config.max_confidence`.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn detect_by_color_contrast(
    image: &RgbImage,
    config: &FallbackConfig,
    quad: &QuadConfig,
) -> Option<Detection> {
    let (width, height) = image.dimensions();
    let background = estimate_background(image, config.corner_patch_ratio);
    let stride = config.sample_stride.max(1) as usize;

    let mut bbox: Option<BoundingBox> = None;
    for y in (0..height).step_by(stride) {
        for x in (0..width).step_by(stride) {
            if color_distance(image.get_pixel(x, y).0, background) <= config.color_distance {
                continue;
            }
            bbox = Some(match bbox {
                None => BoundingBox {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                },
                Some(b) => BoundingBox {
                    min_x: b.min_x.min(x),
                    min_y: b.min_y.min(y),
                    max_x: b.max_x.max(x),
                    max_y: b.max_y.max(y),
                },
            });
        }
    }

    let Some(bbox) = bbox else {
        debug!(?background, "No pixels differ from background");
        return None;
    };

    if bbox.touches_border(width, height, quad.border_margin_ratio) {
        debug!(?bbox, "Contrast region touches border");
        return None;
    }
    let area_ratio = bbox.area() / (width as f32 * height as f32);
    if !(quad.min_area_ratio..=quad.max_area_ratio).contains(&area_ratio) {
        debug!(area_ratio, "Contrast region area out of band");
        return None;
    }
    let aspect = bbox.aspect();
    if !(quad.min_aspect..=quad.max_aspect).contains(&aspect) {
        debug!(aspect, "Contrast region aspect out of band");
        return None;
    }
    let center = center_score(bbox.center(), width, height);
    if center < config.min_center_score {
        debug!(center, "Contrast region off-center");
        return None;
    }

    let blended = 0.5 * center
        + 0.3 * area_score(area_ratio, quad)
        + 0.2 * aspect_score(aspect, &quad.target_aspects);
    let confidence = (blended * config.max_confidence).clamp(0.0, config.max_confidence);

    Some(Detection {
        bounds: bbox.to_bounds(),
        confidence,
        method: DetectionMethod::ColorContrast,
    })
}
