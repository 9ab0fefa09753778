// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan enhancement pipeline: shadow flattening, contrast stretch, unsharp
// masking, and the final colour treatment for a perspective-corrected page.

use image::{GrayImage, Rgb, RgbImage};
use scanwerk_core::config::EnhanceConfig;
use scanwerk_core::types::{ScanFilter, ScanOptions};
use tracing::{debug, info, instrument};

use super::smoothing::{luminance, to_luminance};

/// Enhances a cropped document image.
///
/// Every step consumes the enhancer and returns a new one so steps chain in
/// the order they are written. `enhance` applies the enabled steps in the
/// fixed order shadow removal, contrast stretch, sharpen, colour filter.
/// All arithmetic is clamped to [0, 255]; no step can fail.
pub struct ScanEnhancer {
    image: RgbImage,
    config: EnhanceConfig,
}

impl ScanEnhancer {
    // -- Construction ---------------------------------------------------------

    pub fn new(image: RgbImage, config: EnhanceConfig) -> Self {
        Self { image, config }
    }

    // -- Accessors ------------------------------------------------------------

    /// Borrow the current working image.
    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    /// Consume the enhancer and return the underlying image.
    pub fn into_rgb(self) -> RgbImage {
        self.image
    }

    // -- Pipeline -------------------------------------------------------------

    /// Run the steps enabled in `options`, then the selected colour filter.
    #[instrument(skip_all, fields(
        width = self.image.width(),
        height = self.image.height(),
        filter = ?options.filter,
    ))]
    pub fn enhance(self, options: &ScanOptions) -> Self {
        info!(
            remove_shadows = options.remove_shadows,
            enhance_contrast = options.enhance_contrast,
            sharpen = options.sharpen,
            "Running scan enhancement"
        );

        let mut enhancer = self;
        if options.remove_shadows {
            enhancer = enhancer.remove_shadows();
        }
        if options.enhance_contrast {
            enhancer = enhancer.stretch_contrast();
        }
        if options.sharpen {
            enhancer = enhancer.sharpen();
        }
        enhancer.apply_filter(options.filter)
    }

    // -- Shadow removal -------------------------------------------------------

    /// Brighten dim blocks toward the target brightness.
    ///
    /// Blocks are `max(shadow_min_block, min_dim / shadow_block_divisor)`
    /// pixels square. A block whose mean luminance lies strictly between the
    /// noise floor and the target is scaled by `min(max_gain, target / mean)`.
    #[instrument(skip(self))]
    pub fn remove_shadows(mut self) -> Self {
        let cfg = self.config;
        let (width, height) = self.image.dimensions();
        let block = (width.min(height) / cfg.shadow_block_divisor.max(1))
            .max(cfg.shadow_min_block)
            .max(1);

        let mut brightened = 0usize;
        for by in (0..height).step_by(block as usize) {
            for bx in (0..width).step_by(block as usize) {
                let x_end = bx.saturating_add(block).min(width);
                let y_end = by.saturating_add(block).min(height);

                let mut sum = 0.0f64;
                for y in by..y_end {
                    for x in bx..x_end {
                        let [r, g, b] = self.image.get_pixel(x, y).0;
                        sum += luminance(r, g, b) as f64;
                    }
                }
                let mean = (sum / ((x_end - bx) * (y_end - by)) as f64) as f32;
                if mean >= cfg.shadow_target || mean <= cfg.shadow_floor {
                    continue;
                }

                let gain = (cfg.shadow_target / mean).min(cfg.shadow_max_gain);
                for y in by..y_end {
                    for x in bx..x_end {
                        let px = self.image.get_pixel_mut(x, y);
                        px.0 = px.0.map(|c| clamp_u8(c as f32 * gain));
                    }
                }
                brightened += 1;
            }
        }

        debug!(block, brightened, "Shadow removal complete");
        self
    }

    // -- Contrast -------------------------------------------------------------

    /// Linear remap of the sampled luminance range onto
    /// `[offset, offset + target_range]`.
    ///
    /// Images whose sampled range is already narrower than
    /// `contrast_min_range` are flat (blank pages, solid fills) and are left
    /// untouched.
    #[instrument(skip(self))]
    pub fn stretch_contrast(mut self) -> Self {
        let cfg = self.config;
        let stride = cfg.contrast_sample_stride.max(1) as usize;
        let (width, height) = self.image.dimensions();

        let mut histogram = [0u32; 256];
        for y in (0..height).step_by(stride) {
            for x in (0..width).step_by(stride) {
                let [r, g, b] = self.image.get_pixel(x, y).0;
                histogram[clamp_u8(luminance(r, g, b)) as usize] += 1;
            }
        }

        let lo = histogram.iter().position(|&n| n > 0).unwrap_or(0) as f32;
        let hi = histogram.iter().rposition(|&n| n > 0).unwrap_or(255) as f32;
        let range = hi - lo;
        if range < cfg.contrast_min_range {
            debug!(lo, hi, "Contrast already narrow; skipping stretch");
            return self;
        }

        let gain = cfg.contrast_target_range / range;
        for px in self.image.pixels_mut() {
            px.0 = px
                .0
                .map(|c| clamp_u8((c as f32 - lo) * gain + cfg.contrast_offset));
        }
        debug!(lo, hi, gain, "Contrast stretched");
        self
    }

    // -- Sharpening -----------------------------------------------------------

    /// Four-neighbour unsharp mask:
    /// `out = c + amount * (c - mean(up, down, left, right))`.
    ///
    /// Neighbours beyond the border replicate the edge pixel.
    #[instrument(skip(self))]
    pub fn sharpen(self) -> Self {
        let amount = self.config.sharpen_amount;
        let src = &self.image;
        let (width, height) = src.dimensions();
        let mut out = RgbImage::new(width, height);

        for y in 0..height {
            let up = y.saturating_sub(1);
            let down = (y + 1).min(height - 1);
            for x in 0..width {
                let left = x.saturating_sub(1);
                let right = (x + 1).min(width - 1);
                let c = src.get_pixel(x, y).0;
                let n = [
                    src.get_pixel(x, up).0,
                    src.get_pixel(x, down).0,
                    src.get_pixel(left, y).0,
                    src.get_pixel(right, y).0,
                ];
                let mut px = [0u8; 3];
                for ch in 0..3 {
                    let mean = n.iter().map(|p| p[ch] as f32).sum::<f32>() / 4.0;
                    let center = c[ch] as f32;
                    px[ch] = clamp_u8(center + amount * (center - mean));
                }
                out.put_pixel(x, y, Rgb(px));
            }
        }

        debug!(amount, "Sharpen complete");
        Self {
            image: out,
            config: self.config,
        }
    }

    // -- Colour filter --------------------------------------------------------

    /// Apply the final colour treatment.
    #[instrument(skip(self))]
    pub fn apply_filter(self, filter: ScanFilter) -> Self {
        match filter {
            ScanFilter::Passthrough => self.boost_saturation(),
            ScanFilter::Grayscale => self.grayscale(),
            ScanFilter::BlackWhite => self.binarize(),
        }
    }

    /// Push each channel away from the pixel's luminance.
    fn boost_saturation(mut self) -> Self {
        let boost = self.config.saturation_boost;
        for px in self.image.pixels_mut() {
            let [r, g, b] = px.0;
            let l = luminance(r, g, b);
            px.0 = px.0.map(|c| clamp_u8(l + (c as f32 - l) * boost));
        }
        self
    }

    fn grayscale(mut self) -> Self {
        for px in self.image.pixels_mut() {
            let [r, g, b] = px.0;
            let l = clamp_u8(luminance(r, g, b));
            px.0 = [l, l, l];
        }
        self
    }

    /// Adaptive threshold against the local mean.
    ///
    /// A pixel becomes black when its luminance is below the mean of its
    /// `threshold_radius` neighbourhood minus `threshold_bias`, otherwise
    /// white. Output contains only 0 and 255.
    fn binarize(self) -> Self {
        let cfg = self.config;
        let gray = to_luminance(&self.image);
        let (width, height) = gray.dimensions();
        let integral = compute_integral_image(&gray);

        let mut output = RgbImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let local_mean =
                    region_mean(&integral, width, height, x, y, cfg.threshold_radius);
                let threshold = local_mean as f32 - cfg.threshold_bias;
                let value = if (gray.get_pixel(x, y).0[0] as f32) < threshold {
                    0u8
                } else {
                    255u8
                };
                output.put_pixel(x, y, Rgb([value, value, value]));
            }
        }

        debug!(radius = cfg.threshold_radius, bias = cfg.threshold_bias, "Binarization complete");
        Self {
            image: output,
            config: cfg,
        }
    }
}

#[inline]
fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

// -- Integral image helpers ---------------------------------------------------

/// Compute the integral (summed-area table) of a grayscale image.
///
/// `integral[y * (width+1) + x]` contains the sum of all pixel values in the
/// rectangle [0, 0) to (x, y) (exclusive on both axes). The table has
/// dimensions `(width+1) x (height+1)` with a zero-padded border.
fn compute_integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = gray.dimensions();
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];

    for y in 0..h {
        let mut row_sum: u64 = 0;
        for x in 0..w {
            row_sum += gray.get_pixel(x, y).0[0] as u64;
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            let above = y as usize * stride + (x + 1) as usize;
            table[idx] = row_sum + table[above];
        }
    }

    table
}

/// Mean pixel value within a square region centred on (cx, cy), clipped to
/// the image, using the precomputed integral image.
fn region_mean(
    integral: &[u64],
    img_width: u32,
    img_height: u32,
    cx: u32,
    cy: u32,
    radius: u32,
) -> f64 {
    let stride = (img_width + 1) as usize;

    let x1 = cx.saturating_sub(radius) as usize;
    let y1 = cy.saturating_sub(radius) as usize;
    let x2 = (cx as usize + radius as usize + 1).min(img_width as usize);
    let y2 = (cy as usize + radius as usize + 1).min(img_height as usize);

    let area = ((x2 - x1) * (y2 - y1)) as f64;
    if area == 0.0 {
        return 128.0;
    }

    // S = I[y2][x2] - I[y1][x2] - I[y2][x1] + I[y1][x1]
    let sum = integral[y2 * stride + x2] as f64
        - integral[y1 * stride + x2] as f64
        - integral[y2 * stride + x1] as f64
        + integral[y1 * stride + x1] as f64;

    sum / area
}
