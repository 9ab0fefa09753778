// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Canny-style edge detection (Sobel gradients, non-maximum suppression,
// double-threshold hysteresis) and the dilation that closes small gaps in
// document borders.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::morphology::dilate;
use tracing::{debug, instrument};

/// Value of an edge pixel in a binary edge map.
pub const EDGE: u8 = 255;

/// Gradient direction quantised to the four NMS bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionBin {
    Deg0,
    Deg45,
    Deg90,
    Deg135,
}

impl DirectionBin {
    /// Bin an `atan2(gy, gx)` angle with ±22.5° tolerance. Gradients are
    /// π-periodic for this purpose.
    fn from_angle(radians: f32) -> Self {
        let degrees = radians.to_degrees().rem_euclid(180.0);
        if !(22.5..157.5).contains(&degrees) {
            Self::Deg0
        } else if degrees < 67.5 {
            Self::Deg45
        } else if degrees < 112.5 {
            Self::Deg90
        } else {
            Self::Deg135
        }
    }

    /// Step along the gradient in image coordinates (y grows downward).
    fn step(self) -> (i64, i64) {
        match self {
            Self::Deg0 => (1, 0),
            Self::Deg45 => (1, 1),
            Self::Deg90 => (0, 1),
            Self::Deg135 => (-1, 1),
        }
    }
}

/// Per-pixel gradient magnitude and direction.
struct Gradients {
    width: u32,
    height: u32,
    magnitude: Vec<f32>,
    direction: Vec<DirectionBin>,
}

impl Gradients {
    fn sobel(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let gx = horizontal_sobel(gray);
        let gy = vertical_sobel(gray);

        let len = width as usize * height as usize;
        let mut magnitude = Vec::with_capacity(len);
        let mut direction = Vec::with_capacity(len);
        for (px, py) in gx.pixels().zip(gy.pixels()) {
            let (dx, dy) = (px.0[0] as f32, py.0[0] as f32);
            magnitude.push((dx * dx + dy * dy).sqrt());
            direction.push(DirectionBin::from_angle(dy.atan2(dx)));
        }

        Self {
            width,
            height,
            magnitude,
            direction,
        }
    }

    #[inline]
    fn index(&self, x: i64, y: i64) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Binary {0, 255} edge map of an already smoothed luminance image.
///
/// Pixels at or above `high` seed edges; pixels at or above `low` join only
/// when 8-connected to a seed, so weak responses alone never form an edge.
#[instrument(skip(smoothed), fields(width = smoothed.width(), height = smoothed.height()))]
pub fn detect_edges(smoothed: &GrayImage, low: f32, high: f32) -> GrayImage {
    let gradients = Gradients::sobel(smoothed);
    let thin = non_max_suppression(&gradients);
    let edges = hysteresis(&thin, gradients.width, gradients.height, low, high);
    debug!(
        edge_pixels = edges.pixels().filter(|p| p.0[0] == EDGE).count(),
        "Edge map complete"
    );
    edges
}

/// Zero every magnitude that is not a local maximum along its gradient.
///
/// A pixel survives when it is strictly greater than its predecessor and at
/// least equal to its successor, so a flat-topped ridge keeps exactly its
/// first pixel instead of vanishing. The outer one-pixel frame is dropped.
fn non_max_suppression(gradients: &Gradients) -> Vec<f32> {
    let (w, h) = (gradients.width as i64, gradients.height as i64);
    let mut thin = vec![0.0f32; gradients.magnitude.len()];
    if w < 3 || h < 3 {
        return thin;
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = gradients.index(x, y);
            let mag = gradients.magnitude[idx];
            if mag <= 0.0 {
                continue;
            }
            let (sx, sy) = gradients.direction[idx].step();
            let before = gradients.magnitude[gradients.index(x - sx, y - sy)];
            let after = gradients.magnitude[gradients.index(x + sx, y + sy)];
            if mag > before && mag >= after {
                thin[idx] = mag;
            }
        }
    }
    thin
}

/// Double-threshold hysteresis with an explicit work stack.
fn hysteresis(thin: &[f32], width: u32, height: u32, low: f32, high: f32) -> GrayImage {
    let mut edges = GrayImage::new(width, height);
    let (w, h) = (width as i64, height as i64);
    let mut stack: Vec<(i64, i64)> = Vec::new();

    for y in 0..h {
        for x in 0..w {
            if thin[(y * w + x) as usize] >= high {
                edges.put_pixel(x as u32, y as u32, Luma([EDGE]));
                stack.push((x, y));
            }
        }
    }

    while let Some((x, y)) = stack.pop() {
        for ny in (y - 1)..=(y + 1) {
            for nx in (x - 1)..=(x + 1) {
                if nx < 0 || ny < 0 || nx >= w || ny >= h {
                    continue;
                }
                if edges.get_pixel(nx as u32, ny as u32).0[0] == EDGE {
                    continue;
                }
                if thin[(ny * w + nx) as usize] >= low {
                    edges.put_pixel(nx as u32, ny as u32, Luma([EDGE]));
                    stack.push((nx, ny));
                }
            }
        }
    }
    edges
}

/// Square-element dilation (L∞ ball of `radius`), bridging small gaps left
/// by anti-aliasing or glare.
pub fn dilate_edges(edges: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return edges.clone();
    }
    dilate(edges, Norm::LInf, radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_edges(img: &GrayImage) -> usize {
        img.pixels().filter(|p| p.0[0] == EDGE).count()
    }

    #[test]
    fn direction_bins() {
        assert_eq!(DirectionBin::from_angle(0.0), DirectionBin::Deg0);
        assert_eq!(DirectionBin::from_angle(std::f32::consts::PI), DirectionBin::Deg0);
        assert_eq!(DirectionBin::from_angle(20f32.to_radians()), DirectionBin::Deg0);
        assert_eq!(DirectionBin::from_angle(45f32.to_radians()), DirectionBin::Deg45);
        assert_eq!(DirectionBin::from_angle(-135f32.to_radians()), DirectionBin::Deg45);
        assert_eq!(DirectionBin::from_angle(90f32.to_radians()), DirectionBin::Deg90);
        assert_eq!(DirectionBin::from_angle(-90f32.to_radians()), DirectionBin::Deg90);
        assert_eq!(DirectionBin::from_angle(135f32.to_radians()), DirectionBin::Deg135);
    }

    #[test]
    fn uniform_image_has_no_edges() {
        let gray = GrayImage::from_pixel(64, 48, Luma([120]));
        let edges = detect_edges(&gray, 50.0, 150.0);
        assert_eq!(count_edges(&edges), 0);
    }

    #[test]
    fn vertical_step_gives_thin_line() {
        let gray = GrayImage::from_fn(40, 30, |x, _| Luma([if x < 20 { 30 } else { 230 }]));
        let edges = detect_edges(&gray, 50.0, 150.0);

        // One edge pixel per interior row, all in the same column.
        for y in 1..29 {
            let cols: Vec<u32> = (0..40).filter(|&x| edges.get_pixel(x, y).0[0] == EDGE).collect();
            assert_eq!(cols.len(), 1, "row {y}: {cols:?}");
            assert!((18..=21).contains(&cols[0]));
        }
    }

    #[test]
    fn weak_edges_alone_are_dropped() {
        // A 20-level step gives Sobel magnitude 80: above low, below high.
        let gray = GrayImage::from_fn(40, 30, |x, _| Luma([if x < 20 { 100 } else { 120 }]));
        let edges = detect_edges(&gray, 50.0, 150.0);
        assert_eq!(count_edges(&edges), 0);
    }

    #[test]
    fn weak_edges_connected_to_strong_survive() {
        // Middle row: strong seed, a weak run touching it, a gap, and an
        // isolated weak pixel. The diagonal weak pixel below joins through
        // 8-connectivity.
        let (w, h) = (10u32, 3u32);
        let mut thin = vec![0.0f32; (w * h) as usize];
        let row = w as usize;
        thin[row + 1] = 200.0;
        thin[row + 2] = 80.0;
        thin[row + 3] = 80.0;
        thin[row + 4] = 60.0;
        thin[row + 7] = 80.0;
        thin[2 * row + 5] = 55.0;

        let edges = hysteresis(&thin, w, h, 50.0, 150.0);
        for x in 1..=4 {
            assert_eq!(edges.get_pixel(x, 1).0[0], EDGE, "x={x}");
        }
        assert_eq!(edges.get_pixel(5, 2).0[0], EDGE);
        assert_eq!(edges.get_pixel(7, 1).0[0], 0);
        assert_eq!(count_edges(&edges), 5);
    }

    #[test]
    fn dilation_bridges_small_gap() {
        let mut edges = GrayImage::new(30, 10);
        for x in (2..12).chain(15..28) {
            edges.put_pixel(x, 5, Luma([EDGE]));
        }
        let dilated = dilate_edges(&edges, 2);
        assert!((2..28).all(|x| dilated.get_pixel(x, 5).0[0] == EDGE));
        assert_eq!(dilated.get_pixel(10, 7).0[0], EDGE);
        assert_eq!(dilated.get_pixel(10, 8).0[0], 0);
    }
}
