// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Connected-component quad finder.
//
// Labels 8-connected components of the dilated edge map, approximates each by
// its four extreme points, filters out noise, background frames, and textured
// regions, and scores the survivors.

use image::GrayImage;
use scanwerk_core::config::QuadConfig;
use scanwerk_core::types::{CropBounds, DetectionMethod, Point};
use tracing::{debug, instrument, trace};

use super::detection::{BoundingBox, Detection, area_score, aspect_score, center_score};
use super::edges::EDGE;

/// Share of the final confidence taken by the candidate score; the rest
/// comes from how well the quad fills its bounding box.
const SCORE_SHARE: f32 = 0.75;

/// One 8-connected component of the dilated edge map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Component {
    pub bbox: BoundingBox,
    pub pixel_count: usize,
    /// Extreme points: min x+y, max x−y, min x−y, max x+y.
    pub top_left: (u32, u32),
    pub top_right: (u32, u32),
    pub bottom_left: (u32, u32),
    pub bottom_right: (u32, u32),
}

impl Component {
    fn seed(x: u32, y: u32) -> Self {
        Self {
            bbox: BoundingBox {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
            },
            pixel_count: 0,
            top_left: (x, y),
            top_right: (x, y),
            bottom_left: (x, y),
            bottom_right: (x, y),
        }
    }

    fn absorb(&mut self, x: u32, y: u32) {
        self.pixel_count += 1;
        let bbox = &mut self.bbox;
        bbox.min_x = bbox.min_x.min(x);
        bbox.min_y = bbox.min_y.min(y);
        bbox.max_x = bbox.max_x.max(x);
        bbox.max_y = bbox.max_y.max(y);

        let sum = x as i64 + y as i64;
        let diff = x as i64 - y as i64;
        let sum_of = |p: (u32, u32)| p.0 as i64 + p.1 as i64;
        let diff_of = |p: (u32, u32)| p.0 as i64 - p.1 as i64;
        if sum < sum_of(self.top_left) {
            self.top_left = (x, y);
        }
        if sum > sum_of(self.bottom_right) {
            self.bottom_right = (x, y);
        }
        if diff > diff_of(self.top_right) {
            self.top_right = (x, y);
        }
        if diff < diff_of(self.bottom_left) {
            self.bottom_left = (x, y);
        }
    }

    /// Quadrilateral through the four extreme points.
    pub fn quad(&self) -> CropBounds {
        let p = |(x, y): (u32, u32)| Point::new(x as f32, y as f32);
        CropBounds::new(
            p(self.top_left),
            p(self.top_right),
            p(self.bottom_left),
            p(self.bottom_right),
        )
    }
}

/// Label the 8-connected foreground components of a binary map.
///
/// Flood fill runs on an explicit stack so component size never affects
/// call-stack depth.
pub fn label_components(map: &GrayImage) -> Vec<Component> {
    let (width, height) = map.dimensions();
    let mut visited = vec![false; width as usize * height as usize];
    let mut components = Vec::new();
    let mut stack: Vec<(u32, u32)> = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let idx = y as usize * width as usize + x as usize;
            if visited[idx] || map.get_pixel(x, y).0[0] != EDGE {
                continue;
            }

            let mut component = Component::seed(x, y);
            visited[idx] = true;
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                component.absorb(cx, cy);
                for ny in cy.saturating_sub(1)..=(cy + 1).min(height - 1) {
                    for nx in cx.saturating_sub(1)..=(cx + 1).min(width - 1) {
                        let nidx = ny as usize * width as usize + nx as usize;
                        if !visited[nidx] && map.get_pixel(nx, ny).0[0] == EDGE {
                            visited[nidx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }
            components.push(component);
        }
    }
    components
}

/// Why a component was discarded before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooSmall,
    TouchesBorder,
    AreaOutOfBand,
    AspectOutOfBand,
    TooBusy,
    QuadAreaOutOfBand,
    WeakSides,
}

/// Scored survivor of the rejection rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub quad: CropBounds,
    pub score: f32,
    pub confidence: f32,
}

/// Pick the best document quad, or `None` when nothing survives the
/// rejection rules or the best score is under the floor.
///
/// `edges` is the raw (undilated) edge map used for density and side
/// coverage; `dilated` supplies the components.
#[instrument(skip_all, fields(width = edges.width(), height = edges.height()))]
pub fn find_document_quad(
    edges: &GrayImage,
    dilated: &GrayImage,
    config: &QuadConfig,
) -> Option<Detection> {
    let components = label_components(dilated);
    debug!(components = components.len(), "Components labelled");

    let mut best: Option<Candidate> = None;
    for component in &components {
        match evaluate(component, edges, config) {
            Ok(candidate) => {
                trace!(score = candidate.score, bbox = ?component.bbox, "Candidate accepted");
                if best.is_none_or(|b| candidate.score > b.score) {
                    best = Some(candidate);
                }
            }
            Err(reason) => {
                trace!(?reason, bbox = ?component.bbox, "Component rejected");
            }
        }
    }

    let best = best?;
    if best.score < config.min_score {
        debug!(score = best.score, floor = config.min_score, "Best candidate below score floor");
        return None;
    }
    Some(Detection {
        bounds: best.quad,
        confidence: best.confidence,
        method: DetectionMethod::Edges,
    })
}

/// Apply every rejection rule in order, then score.
pub fn evaluate(
    component: &Component,
    edges: &GrayImage,
    config: &QuadConfig,
) -> Result<Candidate, Rejection> {
    let (width, height) = edges.dimensions();
    let bbox = component.bbox;
    let image_area = width as f32 * height as f32;

    if bbox.width() < config.min_side || bbox.height() < config.min_side {
        return Err(Rejection::TooSmall);
    }
    if bbox.touches_border(width, height, config.border_margin_ratio) {
        return Err(Rejection::TouchesBorder);
    }
    let area_ratio = bbox.area() / image_area;
    if !(config.min_area_ratio..=config.max_area_ratio).contains(&area_ratio) {
        return Err(Rejection::AreaOutOfBand);
    }
    let aspect = bbox.aspect();
    if !(config.min_aspect..=config.max_aspect).contains(&aspect) {
        return Err(Rejection::AspectOutOfBand);
    }
    if edge_density(edges, &bbox) > config.max_edge_density {
        return Err(Rejection::TooBusy);
    }
    let quad = component.quad();
    let quad_area = quad.area() as f32;
    let quad_ratio = quad_area / image_area;
    if !(config.min_area_ratio..=config.max_area_ratio).contains(&quad_ratio) {
        return Err(Rejection::QuadAreaOutOfBand);
    }
    let coverage = side_coverage(edges, &bbox, config.coverage_stride, config.coverage_band);
    let covered_sides = coverage
        .sides
        .iter()
        .filter(|s| **s >= config.min_side_coverage)
        .count();
    if coverage.overall < config.min_total_coverage || covered_sides < config.min_covered_sides {
        return Err(Rejection::WeakSides);
    }

    let weights = config.weights;
    let score = (coverage.overall * weights.edge_coverage
        + center_score(bbox.center(), width, height) * weights.center
        + area_score(area_ratio, config) * weights.area
        + aspect_score(aspect, &config.target_aspects) * weights.aspect)
        .clamp(0.0, 1.0);
    let quad_fill = (quad_area / bbox.area()).clamp(0.0, 1.0);
    let confidence = (score * SCORE_SHARE + quad_fill * (1.0 - SCORE_SHARE)).clamp(0.0, 1.0);

    Ok(Candidate {
        quad,
        score,
        confidence,
    })
}

/// Fraction of bounding-box pixels that are raw edges.
fn edge_density(edges: &GrayImage, bbox: &BoundingBox) -> f32 {
    let mut count = 0usize;
    for y in bbox.min_y..=bbox.max_y {
        for x in bbox.min_x..=bbox.max_x {
            if edges.get_pixel(x, y).0[0] == EDGE {
                count += 1;
            }
        }
    }
    count as f32 / bbox.area()
}

/// Edge support along the four sides of a bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideCoverage {
    /// Top, right, bottom, left.
    pub sides: [f32; 4],
    pub overall: f32,
}

/// Sample each side every `stride` pixels and count the samples with an edge
/// pixel within `band` pixels perpendicular to the side.
pub fn side_coverage(edges: &GrayImage, bbox: &BoundingBox, stride: u32, band: u32) -> SideCoverage {
    let (width, height) = edges.dimensions();
    let stride = stride.max(1) as usize;

    let has_edge_in_column = |x: u32, y_mid: u32| {
        let lo = y_mid.saturating_sub(band);
        let hi = y_mid.saturating_add(band).min(height - 1);
        (lo..=hi).any(|y| edges.get_pixel(x, y).0[0] == EDGE)
    };
    let has_edge_in_row = |x_mid: u32, y: u32| {
        let lo = x_mid.saturating_sub(band);
        let hi = x_mid.saturating_add(band).min(width - 1);
        (lo..=hi).any(|x| edges.get_pixel(x, y).0[0] == EDGE)
    };

    let mut hits = [0usize; 4];
    let mut samples = [0usize; 4];
    for x in (bbox.min_x..=bbox.max_x).step_by(stride) {
        samples[0] += 1;
        samples[2] += 1;
        hits[0] += has_edge_in_column(x, bbox.min_y) as usize;
        hits[2] += has_edge_in_column(x, bbox.max_y) as usize;
    }
    for y in (bbox.min_y..=bbox.max_y).step_by(stride) {
        samples[1] += 1;
        samples[3] += 1;
        hits[1] += has_edge_in_row(bbox.max_x, y) as usize;
        hits[3] += has_edge_in_row(bbox.min_x, y) as usize;
    }

    let sides = std::array::from_fn(|i| hits[i] as f32 / samples[i].max(1) as f32);
    let overall = hits.iter().sum::<usize>() as f32 / samples.iter().sum::<usize>().max(1) as f32;
    SideCoverage { sides, overall }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::edges::dilate_edges;
    use image::Luma;

    fn draw_rect_outline(img: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for x in x0..=x1 {
            img.put_pixel(x, y0, Luma([EDGE]));
            img.put_pixel(x, y1, Luma([EDGE]));
        }
        for y in y0..=y1 {
            img.put_pixel(x0, y, Luma([EDGE]));
            img.put_pixel(x1, y, Luma([EDGE]));
        }
    }

    #[test]
    fn labels_separate_components() {
        let mut map = GrayImage::new(50, 50);
        draw_rect_outline(&mut map, 2, 2, 10, 10);
        draw_rect_outline(&mut map, 20, 20, 40, 45);
        // Diagonal neighbours join under 8-connectivity.
        map.put_pixel(45, 2, Luma([EDGE]));
        map.put_pixel(46, 3, Luma([EDGE]));

        let components = label_components(&map);
        assert_eq!(components.len(), 3);
        let big = components.iter().find(|c| c.bbox.min_x == 20).unwrap();
        assert_eq!(big.bbox, BoundingBox { min_x: 20, min_y: 20, max_x: 40, max_y: 45 });
        assert_eq!(big.top_left, (20, 20));
        assert_eq!(big.bottom_right, (40, 45));
        assert_eq!(big.top_right, (40, 20));
        assert_eq!(big.bottom_left, (20, 45));
        let diagonal = components.iter().find(|c| c.bbox.min_x == 45).unwrap();
        assert_eq!(diagonal.pixel_count, 2);
    }

    #[test]
    fn large_component_does_not_overflow_stack() {
        let map = GrayImage::from_pixel(600, 600, Luma([EDGE]));
        let components = label_components(&map);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].pixel_count, 360_000);
    }

    #[test]
    fn finds_clean_rectangle() {
        let mut edges = GrayImage::new(800, 600);
        draw_rect_outline(&mut edges, 150, 125, 649, 474);
        let dilated = dilate_edges(&edges, 2);

        let found = find_document_quad(&edges, &dilated, &QuadConfig::default()).unwrap();
        assert_eq!(found.method, DetectionMethod::Edges);
        assert!(found.confidence >= 0.58, "confidence {}", found.confidence);
        let tl = found.bounds.top_left;
        let br = found.bounds.bottom_right;
        assert!((tl.x - 150.0).abs() <= 5.0 && (tl.y - 125.0).abs() <= 5.0);
        assert!((br.x - 649.0).abs() <= 5.0 && (br.y - 474.0).abs() <= 5.0);
    }

    #[test]
    fn border_touching_frame_is_never_selected() {
        // Perfect, well-covered rectangle hugging the frame.
        let mut edges = GrayImage::new(800, 600);
        draw_rect_outline(&mut edges, 5, 5, 794, 594);
        let dilated = dilate_edges(&edges, 2);

        let component = label_components(&dilated)[0];
        assert_eq!(
            evaluate(&component, &edges, &QuadConfig::default()),
            Err(Rejection::TouchesBorder)
        );
        assert!(find_document_quad(&edges, &dilated, &QuadConfig::default()).is_none());
    }

    #[test]
    fn document_inside_table_frame_wins_over_frame() {
        let mut edges = GrayImage::new(800, 600);
        draw_rect_outline(&mut edges, 3, 3, 796, 596);
        draw_rect_outline(&mut edges, 200, 150, 600, 450);
        let dilated = dilate_edges(&edges, 2);

        let found = find_document_quad(&edges, &dilated, &QuadConfig::default()).unwrap();
        assert!((found.bounds.top_left.x - 200.0).abs() <= 5.0);
        assert!((found.bounds.top_left.y - 150.0).abs() <= 5.0);
    }

    #[test]
    fn busy_texture_is_rejected() {
        // Dense grid of lines every 4 px inside a bordered region.
        let mut edges = GrayImage::new(800, 600);
        draw_rect_outline(&mut edges, 150, 125, 649, 474);
        for x in (150..650).step_by(4) {
            for y in 125..475 {
                edges.put_pixel(x, y, Luma([EDGE]));
            }
        }
        let dilated = dilate_edges(&edges, 2);
        let component = label_components(&dilated)[0];
        assert_eq!(
            evaluate(&component, &edges, &QuadConfig::default()),
            Err(Rejection::TooBusy)
        );
    }

    #[test]
    fn two_sided_shape_fails_coverage() {
        // An "L" made of the top and left sides only.
        let mut edges = GrayImage::new(800, 600);
        for x in 150..650 {
            edges.put_pixel(x, 125, Luma([EDGE]));
        }
        for y in 125..475 {
            edges.put_pixel(150, y, Luma([EDGE]));
        }
        let dilated = dilate_edges(&edges, 2);
        let component = label_components(&dilated)[0];
        // The L's extreme-point quad is a triangle of half the box area.
        let result = evaluate(&component, &edges, &QuadConfig::default());
        assert!(
            matches!(result, Err(Rejection::WeakSides) | Err(Rejection::QuadAreaOutOfBand)),
            "{result:?}"
        );
    }

    #[test]
    fn small_noise_is_rejected() {
        let mut edges = GrayImage::new(800, 600);
        draw_rect_outline(&mut edges, 300, 300, 320, 320);
        let dilated = dilate_edges(&edges, 2);
        let component = label_components(&dilated)[0];
        assert_eq!(
            evaluate(&component, &edges, &QuadConfig::default()),
            Err(Rejection::TooSmall)
        );
    }

    #[test]
    fn side_coverage_of_full_outline() {
        let mut edges = GrayImage::new(100, 100);
        draw_rect_outline(&mut edges, 10, 10, 89, 89);
        let bbox = BoundingBox { min_x: 8, min_y: 8, max_x: 91, max_y: 91 };
        let coverage = side_coverage(&edges, &bbox, 4, 4);
        assert!(coverage.sides.iter().all(|s| *s > 0.9), "{coverage:?}");
        assert!(coverage.overall > 0.9);
    }
}
