// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan orchestrator.
//
// Sequences normalisation, detection, perspective correction, and
// enhancement. Enhancement runs only once a crop has actually been applied,
// either a manual one or an automatic one that passed the confidence gate;
// otherwise the working image is returned untouched.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, RgbImage};
use scanwerk_core::config::PipelineConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{
    CropBounds, DetectionMethod, OutputFormat, ScanFilter, ScanOptions, ScanOutcome,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::cache::{ScanCache, cache_key};
use super::detection::{Detection, detect_document};
use super::enhance::ScanEnhancer;
use super::perspective::{correct_perspective, output_size};
use super::source::{ImageFetcher, fetch_bytes};
use crate::image::normalize::normalize;
use crate::image::processor::{ImageProcessor, encode_rgb, rgb_view};

/// Default limit on how long a remote fetch may take.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Output of a full scan.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Encoded raster in `format`.
    pub processed_image: Vec<u8>,
    pub processed_width: u32,
    pub processed_height: u32,
    pub format: OutputFormat,
    /// The untouched decoded source.
    pub original_image: Arc<DynamicImage>,
    /// Colour filter applied, or `None` when no crop was applied and the
    /// output is the unenhanced working image.
    pub filter: Option<ScanFilter>,
    /// Best outline in original image coordinates, applied or not.
    pub crop_bounds: Option<CropBounds>,
    pub auto_crop_applied: bool,
    /// 1.0 for manual crops, 0.0 when nothing was detected.
    pub confidence: f32,
    pub outcome: ScanOutcome,
    pub detection_method: Option<DetectionMethod>,
}

/// Entry point for scanning documents.
///
/// Cheap to clone; clones share configuration and cache.
#[derive(Debug, Clone)]
pub struct DocumentScanner {
    config: Arc<PipelineConfig>,
    cache: Option<Arc<ScanCache>>,
    fetch_timeout: Duration,
}

impl Default for DocumentScanner {
    fn default() -> Self {
        Self {
            config: Arc::new(PipelineConfig::default()),
            cache: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Processed raster plus how it came about, before encoding.
struct Rendered {
    pixels: RgbImage,
    filter: Option<ScanFilter>,
    crop_bounds: Option<CropBounds>,
    confidence: f32,
    outcome: ScanOutcome,
    detection_method: Option<DetectionMethod>,
}

impl Rendered {
    /// The working image returned as-is.
    fn uncropped(
        pixels: RgbImage,
        outcome: ScanOutcome,
        detection: Option<(CropBounds, &Detection)>,
    ) -> Self {
        Self {
            pixels,
            filter: None,
            crop_bounds: detection.map(|(bounds, _)| bounds),
            confidence: detection.map_or(0.0, |(_, d)| d.confidence),
            outcome,
            detection_method: detection.map(|(_, d)| d.method),
        }
    }
}

impl DocumentScanner {
    /// Scanner with a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            ..Self::default()
        })
    }

    /// Share a result cache with this scanner.
    pub fn with_cache(mut self, cache: Arc<ScanCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // -- Full scan ------------------------------------------------------------

    /// Decode `data` and scan it.
    pub fn scan_bytes(&self, data: &[u8], options: &ScanOptions) -> Result<ScanResult> {
        options.validate()?;
        let image = ImageProcessor::from_bytes(data)?.into_dynamic();
        self.scan(image, options)
    }

    /// Open the image at `path` and scan it.
    pub fn scan_path(&self, path: impl AsRef<Path>, options: &ScanOptions) -> Result<ScanResult> {
        options.validate()?;
        let image = ImageProcessor::open(path)?.into_dynamic();
        self.scan(image, options)
    }

    /// Fetch through `fetcher`, then run the pipeline on a blocking worker.
    ///
    /// Cancelling `cancel` before the bytes arrive yields `Cancelled`.
    #[instrument(skip(self, fetcher, options, cancel))]
    pub async fn scan_remote<F: ImageFetcher>(
        &self,
        fetcher: &F,
        reference: &str,
        options: ScanOptions,
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        options.validate()?;
        let bytes = fetch_bytes(fetcher, reference, self.fetch_timeout, cancel).await?;

        let scanner = self.clone();
        tokio::task::spawn_blocking(move || scanner.scan_bytes(&bytes, &options))
            .await
            .map_err(|err| ScanwerkError::Worker(err.to_string()))?
    }

    /// Run the full pipeline on a decoded image.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn scan(&self, image: DynamicImage, options: &ScanOptions) -> Result<ScanResult> {
        options.validate()?;
        let original = Arc::new(ImageProcessor::from_dynamic(image)?.into_dynamic());

        let key = match &self.cache {
            Some(cache) => {
                let key = cache_key(&original, options, &self.config)?;
                if let Some(hit) = cache.get(&key) {
                    return Ok(hit);
                }
                Some(key)
            }
            None => None,
        };

        let rendered = match options.crop_bounds {
            Some(bounds) => self.manual_crop(&original, bounds, options)?,
            None if options.auto_crop => self.auto_crop(&original, options)?,
            None => {
                debug!("Auto-crop disabled and no manual bounds");
                let working = normalize(&original, options.max_width)?;
                Rendered::uncropped(working.pixels, ScanOutcome::Skipped, None)
            }
        };

        let processed_image = encode_rgb(&rendered.pixels, options.output_format)?;
        let result = ScanResult {
            processed_image,
            processed_width: rendered.pixels.width(),
            processed_height: rendered.pixels.height(),
            format: options.output_format,
            original_image: original,
            filter: rendered.filter,
            crop_bounds: rendered.crop_bounds,
            auto_crop_applied: rendered.outcome.is_cropped(),
            confidence: rendered.confidence,
            outcome: rendered.outcome,
            detection_method: rendered.detection_method,
        };
        info!(
            outcome = ?result.outcome,
            confidence = result.confidence,
            out_w = result.processed_width,
            out_h = result.processed_height,
            "Scan complete"
        );

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.insert(key, result.clone());
        }
        Ok(result)
    }

    fn manual_crop(
        &self,
        original: &DynamicImage,
        bounds: CropBounds,
        options: &ScanOptions,
    ) -> Result<Rendered> {
        let bounds = self.check_manual_bounds(original, bounds, options.max_width)?;
        let source = rgb_view(original);
        let corrected = correct_perspective(
            &source,
            &bounds,
            options.max_width,
            self.config.min_output_side,
        )
        .ok_or_else(|| {
            ScanwerkError::InvalidOptions(format!("manual crop bounds are degenerate: {bounds:?}"))
        })?;

        debug!("Manual crop applied");
        Ok(Rendered {
            pixels: self.finish(corrected, options),
            filter: Some(options.filter),
            crop_bounds: Some(bounds),
            confidence: 1.0,
            outcome: ScanOutcome::ManualCrop,
            detection_method: None,
        })
    }

    /// Clamp manual bounds into the image and reject those whose corrected
    /// output would be below the minimum size.
    fn check_manual_bounds(
        &self,
        original: &DynamicImage,
        bounds: CropBounds,
        max_width: u32,
    ) -> Result<CropBounds> {
        let bounds = bounds.clamped(original.width(), original.height());
        let (w, h) = output_size(&bounds, max_width);
        let min = self.config.min_output_side;
        if !bounds.is_usable() || w < min || h < min {
            return Err(ScanwerkError::InvalidOptions(format!(
                "manual crop gives {w}x{h} output, minimum is {min}x{min}"
            )));
        }
        Ok(bounds)
    }

    fn auto_crop(&self, original: &DynamicImage, options: &ScanOptions) -> Result<Rendered> {
        let working = normalize(original, options.max_width)?;
        let Some(detection) = detect_document(&working.pixels, &self.config) else {
            info!("No document detected; returning working image");
            return Ok(Rendered::uncropped(working.pixels, ScanOutcome::NotDetected, None));
        };

        let bounds = working.to_original(&detection.bounds);
        let working_area = working.pixels.width() as f64 * working.pixels.height() as f64;
        let area_ratio = (detection.bounds.area() / working_area) as f32;
        let quad = &self.config.quad;
        let qualifies = detection.confidence >= self.config.auto_apply_confidence
            && (quad.min_area_ratio..=quad.max_area_ratio).contains(&area_ratio);

        if !qualifies {
            info!(
                confidence = detection.confidence,
                area_ratio,
                gate = self.config.auto_apply_confidence,
                "Detection below auto-crop gate"
            );
            return Ok(Rendered::uncropped(
                working.pixels,
                ScanOutcome::LowConfidence,
                Some((bounds, &detection)),
            ));
        }

        let source = rgb_view(original);
        let Some(corrected) = correct_perspective(
            &source,
            &bounds,
            options.max_width,
            self.config.min_output_side,
        ) else {
            warn!(?bounds, "Corrected geometry degenerate; crop declined");
            return Ok(Rendered::uncropped(
                working.pixels,
                ScanOutcome::GeometryDegenerate,
                Some((bounds, &detection)),
            ));
        };

        info!(confidence = detection.confidence, method = ?detection.method, "Auto-crop applied");
        Ok(Rendered {
            pixels: self.finish(corrected, options),
            filter: Some(options.filter),
            crop_bounds: Some(bounds),
            confidence: detection.confidence,
            outcome: ScanOutcome::AutoCropped,
            detection_method: Some(detection.method),
        })
    }

    /// Enhancement and colour filter on a finalised crop.
    fn finish(&self, cropped: RgbImage, options: &ScanOptions) -> RgbImage {
        ScanEnhancer::new(cropped, self.config.enhance)
            .enhance(options)
            .into_rgb()
    }

    // -- Detection only -------------------------------------------------------

    /// Locate the document without producing an image. Bounds are in original
    /// coordinates. Manual `crop_bounds` in `options` are ignored.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn detect(&self, image: &DynamicImage, options: &ScanOptions) -> Result<Option<Detection>> {
        options.validate()?;
        let working = normalize(image, options.max_width)?;
        Ok(detect_document(&working.pixels, &self.config).map(|d| Detection {
            bounds: working.to_original(&d.bounds),
            ..d
        }))
    }

    /// Best document outline in original coordinates, for manual-adjustment
    /// UIs.
    pub fn detect_crop_bounds(
        &self,
        image: &DynamicImage,
        options: &ScanOptions,
    ) -> Result<Option<CropBounds>> {
        Ok(self.detect(image, options)?.map(|d| d.bounds))
    }

    // -- Re-filter ------------------------------------------------------------

    /// Re-run only the colour filter on an already processed image.
    #[instrument(skip(self, processed), fields(bytes = processed.len()))]
    pub fn refilter(
        &self,
        processed: &[u8],
        filter: ScanFilter,
        format: OutputFormat,
    ) -> Result<Vec<u8>> {
        let image = ImageProcessor::from_bytes(processed)?.into_rgb();
        let filtered = ScanEnhancer::new(image, self.config.enhance)
            .apply_filter(filter)
            .into_rgb();
        encode_rgb(&filtered, format)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Once;

    use image::Rgb;
    use scanwerk_core::types::Point;

    use super::*;
    use crate::scan::source::FileFetcher;

    static TRACING: Once = Once::new();

    fn init_tracing() {
        TRACING.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }

    /// White `w`x`h` page centred on a dark table.
    fn page_on_table(width: u32, height: u32, page_w: u32, page_h: u32) -> DynamicImage {
        let x0 = (width - page_w) / 2;
        let y0 = (height - page_h) / 2;
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            if (x0..x0 + page_w).contains(&x) && (y0..y0 + page_h).contains(&y) {
                Rgb([250, 250, 250])
            } else {
                Rgb([60, 70, 80])
            }
        }))
    }

    /// 1200x900 white page whose sides lean inward by `slant` pixels toward
    /// the top, as in a photo taken at a slight angle.
    fn keystoned_page(slant: f32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(1200, 900, |x, y| {
            let t = y as f32 / 900.0;
            let left = 220.0 + slant * (1.0 - t);
            let right = 980.0 - slant * (1.0 - t);
            let inside = (x as f32) >= left && (x as f32) < right && (150..750).contains(&y);
            if inside {
                Rgb([245, 243, 238])
            } else {
                Rgb([58, 52, 47])
            }
        }))
    }

    /// Processed dimensions match the corrector's size for `bounds` to 1px.
    fn assert_corrected_size(result: &ScanResult, bounds: &CropBounds, max_width: u32) {
        let (w, h) = output_size(bounds, max_width);
        assert!(
            result.processed_width.abs_diff(w) <= 1 && result.processed_height.abs_diff(h) <= 1,
            "processed {}x{}, corrected {w}x{h}",
            result.processed_width,
            result.processed_height
        );
    }

    fn png() -> ScanOptions {
        ScanOptions {
            output_format: OutputFormat::Png,
            ..ScanOptions::default()
        }
    }

    fn near(p: Point, x: f32, y: f32, tolerance: f32) -> bool {
        (p.x - x).abs() <= tolerance && (p.y - y).abs() <= tolerance
    }

    #[test]
    fn centred_page_is_auto_cropped() {
        init_tracing();
        let scanner = DocumentScanner::default();
        let result = scanner.scan(page_on_table(800, 600, 500, 350), &png()).unwrap();

        assert_eq!(result.outcome, ScanOutcome::AutoCropped);
        assert!(result.auto_crop_applied);
        assert!(result.confidence >= 0.58 && result.confidence <= 1.0);
        assert_eq!(result.detection_method, Some(DetectionMethod::Edges));
        assert_eq!(result.filter, Some(ScanFilter::Passthrough));

        let bounds = result.crop_bounds.unwrap();
        assert!(near(bounds.top_left, 150.0, 125.0, 5.0), "{bounds:?}");
        assert!(near(bounds.top_right, 650.0, 125.0, 5.0), "{bounds:?}");
        assert!(near(bounds.bottom_left, 150.0, 475.0, 5.0), "{bounds:?}");
        assert!(near(bounds.bottom_right, 650.0, 475.0, 5.0), "{bounds:?}");

        assert!((490..=515).contains(&result.processed_width));
        assert!((340..=365).contains(&result.processed_height));
        assert_corrected_size(&result, &bounds, png().max_width);
        let decoded = image::load_from_memory(&result.processed_image).unwrap();
        assert_eq!(decoded.width(), result.processed_width);
    }

    #[test]
    fn uniform_image_is_not_detected_and_not_enhanced() {
        let scanner = DocumentScanner::default();
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 300, Rgb([90, 140, 60])));
        let result = scanner.scan(source.clone(), &png()).unwrap();

        assert_eq!(result.outcome, ScanOutcome::NotDetected);
        assert!(!result.auto_crop_applied);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.crop_bounds, None);
        assert_eq!(result.filter, None);

        let decoded = image::load_from_memory(&result.processed_image).unwrap().to_rgb8();
        assert_eq!(decoded, source.to_rgb8());
    }

    #[test]
    fn manual_bounds_always_apply() {
        let scanner = DocumentScanner::default();
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 300, Rgb([90, 140, 60])));
        let options = ScanOptions {
            crop_bounds: Some(CropBounds::new(
                Point::new(40.0, 30.0),
                Point::new(350.0, 20.0),
                Point::new(30.0, 270.0),
                Point::new(360.0, 280.0),
            )),
            ..png()
        };
        let result = scanner.scan(source, &options).unwrap();

        assert_eq!(result.outcome, ScanOutcome::ManualCrop);
        assert!(result.auto_crop_applied);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.detection_method, None);
        assert!(result.processed_width >= 100 && result.processed_height >= 100);
        assert_corrected_size(&result, &result.crop_bounds.unwrap(), options.max_width);
    }

    #[test]
    fn keystoned_page_is_auto_cropped() {
        let scanner = DocumentScanner::default();
        let options = png();
        let result = scanner.scan(keystoned_page(10.0), &options).unwrap();

        assert_eq!(result.outcome, ScanOutcome::AutoCropped);
        assert!(result.auto_crop_applied);
        assert!(result.confidence >= 0.58);
        assert_eq!(result.detection_method, Some(DetectionMethod::Edges));

        let bounds = result.crop_bounds.unwrap();
        assert!(bounds.top_left.y < 300.0 && bounds.bottom_left.y > 600.0, "{bounds:?}");
        assert_corrected_size(&result, &bounds, options.max_width);
    }

    #[test]
    fn tiny_manual_bounds_are_invalid_options() {
        let scanner = DocumentScanner::default();
        let options = ScanOptions {
            crop_bounds: Some(CropBounds::from_rect(10.0, 10.0, 60.0, 200.0)),
            ..png()
        };
        let err = scanner.scan(page_on_table(400, 300, 200, 150), &options).unwrap_err();
        assert!(matches!(err, ScanwerkError::InvalidOptions(_)));
    }

    #[test]
    fn black_white_scan_is_strictly_binary() {
        let scanner = DocumentScanner::default();
        let options = ScanOptions {
            filter: ScanFilter::BlackWhite,
            crop_bounds: Some(CropBounds::from_rect(100.0, 80.0, 600.0, 440.0)),
            ..png()
        };
        let result = scanner.scan(page_on_table(800, 600, 500, 350), &options).unwrap();
        let decoded = image::load_from_memory(&result.processed_image).unwrap().to_rgb8();
        assert!(decoded.pixels().flat_map(|p| p.0).all(|v| v == 0 || v == 255));
    }

    #[test]
    fn refilter_is_repeatable() {
        let scanner = DocumentScanner::default();
        let result = scanner.scan(page_on_table(800, 600, 500, 350), &png()).unwrap();

        let first = scanner
            .refilter(&result.processed_image, ScanFilter::Grayscale, OutputFormat::Png)
            .unwrap();
        let second = scanner
            .refilter(&result.processed_image, ScanFilter::Grayscale, OutputFormat::Png)
            .unwrap();
        assert_eq!(first, second);

        // Grayscale is a fixed point under lossless output.
        let again = scanner
            .refilter(&first, ScanFilter::Grayscale, OutputFormat::Png)
            .unwrap();
        assert_eq!(again, first);

        let gray = image::load_from_memory(&first).unwrap().to_rgb8();
        assert!(gray.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2]));
    }

    #[test]
    fn disabled_auto_crop_is_skipped() {
        let scanner = DocumentScanner::default();
        let options = ScanOptions {
            auto_crop: false,
            ..png()
        };
        let result = scanner.scan(page_on_table(800, 600, 500, 350), &options).unwrap();
        assert_eq!(result.outcome, ScanOutcome::Skipped);
        assert!(!result.auto_crop_applied);
        assert_eq!((result.processed_width, result.processed_height), (800, 600));
    }

    #[test]
    fn strict_gate_reports_bounds_without_cropping() {
        let mut config = PipelineConfig::default();
        config.auto_apply_confidence = 1.0;
        let scanner = DocumentScanner::new(config).unwrap();
        let result = scanner.scan(page_on_table(800, 600, 500, 350), &png()).unwrap();

        assert_eq!(result.outcome, ScanOutcome::LowConfidence);
        assert!(!result.auto_crop_applied);
        assert!(result.crop_bounds.is_some());
        assert!(result.confidence > 0.0 && result.confidence < 1.0);
        assert_eq!(result.filter, None);
        assert_eq!((result.processed_width, result.processed_height), (800, 600));
    }

    #[test]
    fn detection_reports_original_coordinates() {
        // Same layout at twice the resolution, processed at half scale.
        let scanner = DocumentScanner::default();
        let options = ScanOptions {
            max_width: 800,
            ..png()
        };
        let bounds = scanner
            .detect_crop_bounds(&page_on_table(1600, 1200, 1000, 700), &options)
            .unwrap()
            .unwrap();
        assert!(near(bounds.top_left, 300.0, 250.0, 10.0), "{bounds:?}");
        assert!(near(bounds.bottom_right, 1300.0, 950.0, 10.0), "{bounds:?}");
    }

    #[test]
    fn working_image_never_exceeds_max_width() {
        let scanner = DocumentScanner::default();
        let options = ScanOptions {
            max_width: 300,
            auto_crop: false,
            ..png()
        };
        let result = scanner.scan(page_on_table(800, 600, 500, 350), &options).unwrap();
        assert_eq!((result.processed_width, result.processed_height), (300, 225));
        assert_eq!(result.original_image.width(), 800);
    }

    #[test]
    fn undecodable_bytes_are_source_unavailable() {
        let scanner = DocumentScanner::default();
        let err = scanner.scan_bytes(b"definitely not an image", &png()).unwrap_err();
        assert!(matches!(err, ScanwerkError::SourceUnavailable(_)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.edges.low_threshold = 300.0;
        assert!(matches!(DocumentScanner::new(config), Err(ScanwerkError::Config(_))));
    }

    #[test]
    fn cache_serves_repeat_scans() {
        let cache = Arc::new(ScanCache::new(4));
        let scanner = DocumentScanner::default().with_cache(Arc::clone(&cache));
        let image = page_on_table(400, 300, 250, 180);

        let first = scanner.scan(image.clone(), &png()).unwrap();
        let second = scanner.scan(image, &png()).unwrap();
        assert_eq!(first.processed_image, second.processed_image);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.len), (1, 1, 1));
    }

    #[test]
    fn scan_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        page_on_table(800, 600, 500, 350).save(&path).unwrap();

        let result = DocumentScanner::default().scan_path(&path, &png()).unwrap();
        assert_eq!(result.outcome, ScanOutcome::AutoCropped);
    }

    #[tokio::test]
    async fn remote_scan_runs_after_fetch() {
        let dir = tempfile::tempdir().unwrap();
        page_on_table(800, 600, 500, 350)
            .save(dir.path().join("page.png"))
            .unwrap();

        let scanner = DocumentScanner::default().with_fetch_timeout(Duration::from_secs(5));
        let fetcher = FileFetcher::with_root(dir.path());
        let token = CancellationToken::new();
        let result = scanner
            .scan_remote(&fetcher, "page.png", png(), &token)
            .await
            .unwrap();
        assert_eq!(result.outcome, ScanOutcome::AutoCropped);
    }

    #[tokio::test]
    async fn cancelled_remote_scan_returns_no_result() {
        let scanner = DocumentScanner::default();
        let token = CancellationToken::new();
        token.cancel();
        let err = scanner
            .scan_remote(&FileFetcher::new(), "unused.png", png(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanwerkError::Cancelled));
    }
}
