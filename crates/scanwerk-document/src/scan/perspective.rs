// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective correction.
//
// Maps a source quadrilateral onto an upright rectangle. Each destination
// pixel is located by blending the quad's top and bottom edges (two nested
// linear interpolations) rather than solving a homography; phone-photo
// document quads have little enough skew for this to be indistinguishable.

use image::{Rgb, RgbImage};
use scanwerk_core::types::{CropBounds, Point};
use tracing::{debug, instrument};

/// Output dimensions for `quad`: the longer of the top/bottom edges by the
/// longer of the left/right edges, scaled down proportionally so the width
/// does not exceed `max_width`.
pub fn output_size(quad: &CropBounds, max_width: u32) -> (u32, u32) {
    let width = quad
        .top_left
        .distance(&quad.top_right)
        .max(quad.bottom_left.distance(&quad.bottom_right));
    let height = quad
        .top_left
        .distance(&quad.bottom_left)
        .max(quad.top_right.distance(&quad.bottom_right));

    let (width, height) = if width > max_width as f32 {
        let factor = max_width as f32 / width;
        (max_width as f32, height * factor)
    } else {
        (width, height)
    };
    (width.round() as u32, height.round() as u32)
}

/// Warp `quad` out of `source` into an upright image.
///
/// Returns `None` when the quad is degenerate or the output would be smaller
/// than `min_side` on either axis.
#[instrument(skip(source, quad), fields(src_w = source.width(), src_h = source.height()))]
pub fn correct_perspective(
    source: &RgbImage,
    quad: &CropBounds,
    max_width: u32,
    min_side: u32,
) -> Option<RgbImage> {
    if !quad.is_usable() {
        debug!(?quad, "Quad is not usable");
        return None;
    }
    let (width, height) = output_size(quad, max_width);
    if width < min_side || height < min_side {
        debug!(width, height, min_side, "Corrected output too small");
        return None;
    }

    let quad = quad.clamped(source.width() - 1, source.height() - 1);
    debug!(width, height, "Warping quad");
    Some(warp_quad(source, &quad, width, height))
}

/// Resample `quad` into a `width` x `height` image.
pub fn warp_quad(source: &RgbImage, quad: &CropBounds, width: u32, height: u32) -> RgbImage {
    let mut out = RgbImage::new(width, height);
    let u_den = width.saturating_sub(1).max(1) as f32;
    let v_den = height.saturating_sub(1).max(1) as f32;

    for dy in 0..height {
        let v = dy as f32 / v_den;
        for dx in 0..width {
            let u = dx as f32 / u_den;
            let top = lerp(quad.top_left, quad.top_right, u);
            let bottom = lerp(quad.bottom_left, quad.bottom_right, u);
            let p = lerp(top, bottom, v);
            out.put_pixel(dx, dy, sample_bilinear(source, p.x, p.y));
        }
    }
    out
}

fn lerp(a: Point, b: Point, t: f32) -> Point {
    Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
}

/// 2x2 bilinear sample; coordinates are clamped into the image.
pub fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = image.dimensions();
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;

    let mut px = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        px[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(px)
}
