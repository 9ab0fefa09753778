// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Luminance conversion and pre-gradient noise suppression.

use image::{GrayImage, Luma, RgbImage};
use imageproc::filter::box_filter;
use scanwerk_core::config::Smoothing;
use tracing::{debug, instrument};

/// Rec. 601 luma. Detection thresholds are calibrated against these exact
/// coefficients.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Single-channel luminance image.
pub fn to_luminance(rgb: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(rgb.width(), rgb.height());
    for (src, dst) in rgb.pixels().zip(gray.pixels_mut()) {
        let [r, g, b] = src.0;
        *dst = Luma([luminance(r, g, b).round().clamp(0.0, 255.0) as u8]);
    }
    gray
}

/// Apply the configured smoothing.
#[instrument(skip(gray), fields(width = gray.width(), height = gray.height()))]
pub fn smooth(gray: &GrayImage, smoothing: Smoothing) -> GrayImage {
    match smoothing {
        Smoothing::Box { radius } => {
            debug!(radius, "Box blur");
            box_filter(gray, radius, radius)
        }
        Smoothing::Bilateral {
            sigma_spatial,
            sigma_range,
        } => {
            debug!(sigma_spatial, sigma_range, "Bilateral filter");
            bilateral_filter(gray, sigma_spatial, sigma_range)
        }
    }
}

/// Edge-preserving bilateral filter.
///
/// The window spans two spatial sigmas; samples outside the image are skipped
/// rather than clamped so borders are not biased toward edge pixels.
pub fn bilateral_filter(gray: &GrayImage, sigma_spatial: f32, sigma_range: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let radius = ((2.0 * sigma_spatial).ceil() as i64).max(1);
    let side = (2 * radius + 1) as usize;

    let mut spatial = vec![0.0f32; side * side];
    let two_ss = 2.0 * sigma_spatial * sigma_spatial;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let idx = ((dy + radius) as usize) * side + (dx + radius) as usize;
            spatial[idx] = (-((dx * dx + dy * dy) as f32) / two_ss).exp();
        }
    }

    let two_sr = 2.0 * sigma_range * sigma_range;
    let range: Vec<f32> = (0..256)
        .map(|d| (-((d * d) as f32) / two_sr).exp())
        .collect();

    let mut out = GrayImage::new(width, height);
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let center = gray.get_pixel(x as u32, y as u32).0[0];
            let mut acc = 0.0f32;
            let mut norm = 0.0f32;
            for dy in -radius..=radius {
                let sy = y + dy;
                if sy < 0 || sy >= height as i64 {
                    continue;
                }
                for dx in -radius..=radius {
                    let sx = x + dx;
                    if sx < 0 || sx >= width as i64 {
                        continue;
                    }
                    let value = gray.get_pixel(sx as u32, sy as u32).0[0];
                    let weight = spatial[((dy + radius) as usize) * side + (dx + radius) as usize]
                        * range[center.abs_diff(value) as usize];
                    acc += weight * value as f32;
                    norm += weight;
                }
            }
            let smoothed = if norm > 0.0 { acc / norm } else { center as f32 };
            out.put_pixel(x as u32, y as u32, Luma([smoothed.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn luminance_uses_rec601_weights() {
        assert!((luminance(255, 0, 0) - 76.245).abs() < 1e-3);
        assert!((luminance(0, 255, 0) - 149.685).abs() < 1e-3);
        assert!((luminance(0, 0, 255) - 29.07).abs() < 1e-3);
        assert!((luminance(255, 255, 255) - 255.0).abs() < 1e-3);
    }

    #[test]
    fn to_luminance_matches_dimensions() {
        let rgb = RgbImage::from_pixel(7, 5, Rgb([100, 150, 200]));
        let gray = to_luminance(&rgb);
        assert_eq!(gray.dimensions(), (7, 5));
        // 29.9 + 88.05 + 22.8 = 140.75
        assert_eq!(gray.get_pixel(3, 3).0[0], 141);
    }

    #[test]
    fn box_blur_keeps_uniform_image() {
        let gray = GrayImage::from_pixel(20, 20, Luma([77]));
        let out = smooth(&gray, Smoothing::Box { radius: 2 });
        assert!(out.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn box_blur_softens_step() {
        let gray = GrayImage::from_fn(20, 5, |x, _| Luma([if x < 10 { 0 } else { 250 }]));
        let out = smooth(&gray, Smoothing::Box { radius: 2 });
        let mid = out.get_pixel(10, 2).0[0];
        assert!(mid > 0 && mid < 250, "step should be ramped, got {mid}");
    }

    #[test]
    fn bilateral_preserves_strong_step() {
        let gray = GrayImage::from_fn(24, 8, |x, _| Luma([if x < 12 { 20 } else { 230 }]));
        let out = bilateral_filter(&gray, 3.0, 30.0);
        // Range sigma 30 gives a 210-level jump almost no weight.
        assert!(out.get_pixel(11, 4).0[0] < 30);
        assert!(out.get_pixel(12, 4).0[0] > 220);
    }
}
