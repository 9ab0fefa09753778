// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline tuning configuration.
//
// Every threshold and weight used by detection and enhancement lives here so
// that a deployment can re-calibrate against its own photo corpus without
// touching code. The defaults are the empirically tuned values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanwerkError};

/// Upper bound, in pixels, for band, block, and radius settings.
pub const MAX_WINDOW: u32 = 4096;

/// Noise suppression applied before gradient computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Smoothing {
    /// Separable box blur (running sums).
    Box { radius: u32 },
    /// Edge-preserving bilateral filter. Slower.
    Bilateral { sigma_spatial: f32, sigma_range: f32 },
}

impl Default for Smoothing {
    fn default() -> Self {
        Self::Box { radius: 2 }
    }
}

/// Edge detection and dilation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub smoothing: Smoothing,
    /// Hysteresis low threshold on gradient magnitude.
    pub low_threshold: f32,
    /// Hysteresis high threshold on gradient magnitude.
    pub high_threshold: f32,
    /// Radius of the square dilation element.
    pub dilate_radius: u8,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            smoothing: Smoothing::default(),
            low_threshold: 50.0,
            high_threshold: 150.0,
            dilate_radius: 2,
        }
    }
}

/// Relative weights of the candidate score components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub edge_coverage: f32,
    pub center: f32,
    pub area: f32,
    pub aspect: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            edge_coverage: 0.40,
            center: 0.28,
            area: 0.22,
            aspect: 0.10,
        }
    }
}

/// Contour/quad candidate rejection and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadConfig {
    /// Minimum bounding-box side, working-resolution pixels.
    pub min_side: u32,
    /// Border margin as a fraction of the shorter image dimension.
    pub border_margin_ratio: f32,
    pub min_area_ratio: f32,
    pub max_area_ratio: f32,
    /// Width / height.
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Raw edge pixels per bounding-box pixel.
    pub max_edge_density: f32,
    /// Spacing between side-coverage samples.
    pub coverage_stride: u32,
    /// Half-width of the perpendicular band searched per sample.
    pub coverage_band: u32,
    pub min_total_coverage: f32,
    pub min_side_coverage: f32,
    /// How many of the four sides must reach `min_side_coverage`.
    pub min_covered_sides: usize,
    pub weights: ScoreWeights,
    /// Area ratio at which the area score peaks.
    pub target_area_ratio: f32,
    /// Long/short side ratios of common paper and card formats.
    pub target_aspects: Vec<f32>,
    /// Candidates scoring below this are discarded.
    pub min_score: f32,
}

impl Default for QuadConfig {
    fn default() -> Self {
        Self {
            min_side: 40,
            border_margin_ratio: 0.02,
            min_area_ratio: 0.20,
            max_area_ratio: 0.90,
            min_aspect: 0.45,
            max_aspect: 2.2,
            max_edge_density: 0.12,
            coverage_stride: 4,
            coverage_band: 4,
            min_total_coverage: 0.20,
            min_side_coverage: 0.18,
            min_covered_sides: 3,
            weights: ScoreWeights::default(),
            target_area_ratio: 0.55,
            // ISO 216, US Letter, ID-1 card.
            target_aspects: vec![std::f32::consts::SQRT_2, 11.0 / 8.5, 85.6 / 53.98],
            min_score: 0.32,
        }
    }
}

/// Colour-contrast fallback detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// RGB Euclidean distance from the background estimate.
    pub color_distance: f32,
    /// Side of each corner patch used to estimate the background, as a
    /// fraction of the shorter image dimension.
    pub corner_patch_ratio: f32,
    pub sample_stride: u32,
    /// Candidates whose center score is below this are rejected.
    pub min_center_score: f32,
    pub max_confidence: f32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            color_distance: 30.0,
            corner_patch_ratio: 0.03,
            sample_stride: 2,
            min_center_score: 0.5,
            max_confidence: 0.48,
        }
    }
}

/// Post-crop enhancement parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    pub shadow_target: f32,
    pub shadow_floor: f32,
    pub shadow_max_gain: f32,
    /// Blocks span this fraction of the shorter dimension.
    pub shadow_block_divisor: u32,
    pub shadow_min_block: u32,
    /// Brightness ranges narrower than this are left untouched.
    pub contrast_min_range: f32,
    pub contrast_target_range: f32,
    pub contrast_offset: f32,
    pub contrast_sample_stride: u32,
    pub sharpen_amount: f32,
    pub saturation_boost: f32,
    /// Radius of the local-mean window for black/white thresholding.
    pub threshold_radius: u32,
    /// Subtracted from the local mean to get the threshold.
    pub threshold_bias: f32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            shadow_target: 225.0,
            shadow_floor: 40.0,
            shadow_max_gain: 1.35,
            shadow_block_divisor: 12,
            shadow_min_block: 24,
            contrast_min_range: 60.0,
            contrast_target_range: 240.0,
            contrast_offset: 8.0,
            contrast_sample_stride: 4,
            sharpen_amount: 0.4,
            saturation_boost: 1.1,
            threshold_radius: 15,
            threshold_bias: 10.0,
        }
    }
}

/// Complete tuning for a `DocumentScanner`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub edges: EdgeConfig,
    pub quad: QuadConfig,
    pub fallback: FallbackConfig,
    pub enhance: EnhanceConfig,
    /// Minimum confidence for an automatic crop.
    pub auto_apply_confidence: f32,
    /// Corrected outputs smaller than this on either side are declined.
    pub min_output_side: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            edges: EdgeConfig::default(),
            quad: QuadConfig::default(),
            fallback: FallbackConfig::default(),
            enhance: EnhanceConfig::default(),
            auto_apply_confidence: 0.58,
            min_output_side: 100,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&data)
    }

    /// Write as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject configurations the detector cannot work with.
    pub fn validate(&self) -> Result<()> {
        let edges = &self.edges;
        if !(edges.low_threshold >= 0.0 && edges.low_threshold <= edges.high_threshold) {
            return Err(ScanwerkError::Config(format!(
                "hysteresis thresholds out of order: low {} high {}",
                edges.low_threshold, edges.high_threshold
            )));
        }
        if let Smoothing::Bilateral {
            sigma_spatial,
            sigma_range,
        } = edges.smoothing
        {
            if sigma_spatial <= 0.0 || sigma_range <= 0.0 {
                return Err(ScanwerkError::Config(
                    "bilateral sigmas must be positive".into(),
                ));
            }
        }

        let quad = &self.quad;
        let bands = [
            ("area ratio", quad.min_area_ratio, quad.max_area_ratio),
            ("aspect", quad.min_aspect, quad.max_aspect),
        ];
        for (name, lo, hi) in bands {
            if !(lo > 0.0 && lo < hi) {
                return Err(ScanwerkError::Config(format!(
                    "{name} band is empty: [{lo}, {hi}]"
                )));
            }
        }
        if quad.max_area_ratio > 1.0 {
            return Err(ScanwerkError::Config(
                "max_area_ratio cannot exceed 1.0".into(),
            ));
        }
        let w = quad.weights;
        if [w.edge_coverage, w.center, w.area, w.aspect]
            .iter()
            .any(|v| *v < 0.0)
        {
            return Err(ScanwerkError::Config("score weights must be non-negative".into()));
        }
        if quad.coverage_stride == 0 || quad.min_covered_sides > 4 {
            return Err(ScanwerkError::Config(
                "coverage stride must be positive and covered sides at most 4".into(),
            ));
        }
        if self.fallback.sample_stride == 0
            || self.enhance.contrast_sample_stride == 0
            || self.enhance.shadow_block_divisor == 0
        {
            return Err(ScanwerkError::Config(
                "sample strides and block divisor must be positive".into(),
            ));
        }
        let windows = [
            ("coverage_band", quad.coverage_band),
            ("shadow_min_block", self.enhance.shadow_min_block),
            ("threshold_radius", self.enhance.threshold_radius),
        ];
        for (name, value) in windows {
            if value > MAX_WINDOW {
                return Err(ScanwerkError::Config(format!(
                    "{name} {value} exceeds {MAX_WINDOW} pixels"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.auto_apply_confidence) {
            return Err(ScanwerkError::Config(format!(
                "auto_apply_confidence {} outside [0, 1]",
                self.auto_apply_confidence
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.auto_apply_confidence, 0.58);
        assert_eq!(config.quad.min_score, 0.32);
        assert_eq!(config.edges.high_threshold, 150.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            PipelineConfig::from_json_str(r#"{"edges":{"low_threshold":40.0}}"#).unwrap();
        assert_eq!(config.edges.low_threshold, 40.0);
        assert_eq!(config.edges.high_threshold, 150.0);
        assert_eq!(config.min_output_side, 100);
        assert_eq!(config.auto_apply_confidence, 0.58);
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let result = PipelineConfig::from_json_str(
            r#"{"edges":{"low_threshold":200.0,"high_threshold":100.0}}"#,
        );
        assert!(matches!(result, Err(ScanwerkError::Config(_))));
    }

    #[test]
    fn bilateral_smoothing_round_trips_through_json() {
        let json = r#"{"edges":{"smoothing":{"kind":"bilateral","sigma_spatial":3.0,"sigma_range":30.0}}}"#;
        let config = PipelineConfig::from_json_str(json).unwrap();
        assert_eq!(
            config.edges.smoothing,
            Smoothing::Bilateral {
                sigma_spatial: 3.0,
                sigma_range: 30.0
            }
        );
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");

        let mut config = PipelineConfig::default();
        config.quad.min_score = 0.4;
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn oversized_windows_rejected() {
        for json in [
            r#"{"quad":{"coverage_band":4294967295}}"#,
            r#"{"enhance":{"shadow_min_block":4294967295}}"#,
            r#"{"enhance":{"threshold_radius":4097}}"#,
        ] {
            let result = PipelineConfig::from_json_str(json);
            assert!(matches!(result, Err(ScanwerkError::Config(_))), "{json}");
        }

        let mut config = PipelineConfig::default();
        config.enhance.threshold_radius = MAX_WINDOW;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let result = PipelineConfig::from_json_str("{not json");
        assert!(matches!(result, Err(ScanwerkError::Serialization(_))));
    }
}
