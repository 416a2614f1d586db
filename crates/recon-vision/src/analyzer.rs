//! Per-tick frame analysis.
//!
//! `FrameAnalyzer::analyze` is a pure function of the frame, the active
//! overlay and the latest roll reading. It holds no per-frame state, so the
//! capture loop can call it from whichever task owns the frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use serde::Serialize;
use tracing::trace;

use recon_models::{OverlayKind, QualityMetrics, QualityScores, SubjectScore};

use crate::config::AnalyzerConfig;
use crate::detector::{probe_detector, SubjectDetector, SubjectInput};
use crate::error::VisionResult;
use crate::frame::FrameSample;
use crate::kernels::{laplacian_variance, ExposureStats};
use crate::level::{LevelPolicy, LevelSensor};

/// Everything the gate and the UI need from one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameAnalysis {
    pub metrics: QualityMetrics,
    pub subject: SubjectScore,
    pub overlay: OverlayKind,
    /// Wall time spent analyzing this frame.
    pub elapsed: Duration,
}

impl FrameAnalysis {
    /// Quality signals and subject check all pass.
    pub fn all_green(&self) -> bool {
        self.metrics.all_ok() && self.subject.passed
    }
}

/// Scores frames for sharpness, exposure, glare, level and subject presence.
#[derive(Clone)]
pub struct FrameAnalyzer {
    config: AnalyzerConfig,
    detector: Arc<dyn SubjectDetector>,
    level: LevelSensor,
    policy: LevelPolicy,
}

impl std::fmt::Debug for FrameAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAnalyzer")
            .field("config", &self.config)
            .field("detector", &self.detector.name())
            .field("level", &self.level)
            .field("policy", &self.policy)
            .finish()
    }
}

impl FrameAnalyzer {
    /// Build an analyzer with the best available subject detector.
    pub fn new(config: AnalyzerConfig) -> Self {
        let detector = probe_detector(&config);
        Self::with_detector(config, detector)
    }

    /// Build an analyzer around a specific detector.
    pub fn with_detector(config: AnalyzerConfig, detector: Arc<dyn SubjectDetector>) -> Self {
        Self {
            config,
            detector,
            level: LevelSensor::default(),
            policy: LevelPolicy::default(),
        }
    }

    pub fn with_level(mut self, level: LevelSensor, policy: LevelPolicy) -> Self {
        self.level = level;
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Downsample a full-resolution frame and analyze it.
    pub fn analyze_full(
        &self,
        full: &RgbImage,
        overlay: OverlayKind,
        roll_degrees: Option<f64>,
    ) -> VisionResult<FrameAnalysis> {
        let sample = FrameSample::downsample(full, self.config.analysis_width)?;
        self.analyze(&sample, overlay, roll_degrees)
    }

    /// Analyze a frame that is already at analysis resolution.
    pub fn analyze(
        &self,
        frame: &FrameSample,
        overlay: OverlayKind,
        roll_degrees: Option<f64>,
    ) -> VisionResult<FrameAnalysis> {
        let started = Instant::now();
        let config = &self.config;

        let gray = frame.to_gray();
        let sharpness = laplacian_variance(&gray);
        let stats = ExposureStats::measure(frame, config.glare_channel_threshold);

        let exposure_ok = stats.mean > config.min_luma_mean
            && stats.mean < config.max_luma_mean
            && stats.variance > config.min_luma_variance;
        let level_ok = !self.policy.requires_level(overlay) || self.level.is_level(roll_degrees);

        let metrics = QualityMetrics {
            sharp: sharpness > config.sharpness_threshold,
            glare_safe: stats.glare_fraction < config.max_glare_fraction,
            exposure_ok,
            level_ok,
            scores: QualityScores {
                sharpness,
                luma_mean: stats.mean,
                luma_variance: stats.variance,
                glare_fraction: stats.glare_fraction,
                roll_degrees,
            },
        };

        let subject = self.detector.detect(&SubjectInput {
            overlay,
            frame,
            gray: &gray,
            sharpness,
            exposure_ok,
        })?;

        let elapsed = started.elapsed();
        trace!(
            overlay = %overlay,
            sharpness = sharpness,
            luma_mean = stats.mean,
            glare = stats.glare_fraction,
            subject = subject.score,
            elapsed_us = elapsed.as_micros() as u64,
            "Frame analyzed"
        );

        Ok(FrameAnalysis {
            metrics,
            subject,
            overlay,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{imageops, Rgb};

    fn analyzer() -> FrameAnalyzer {
        FrameAnalyzer::new(AnalyzerConfig::default())
    }

    fn sample(img: RgbImage) -> FrameSample {
        FrameSample::new(img).unwrap()
    }

    /// Checkerboard of 40/210: mean ~125, variance ~7225.
    fn board_with_cell(w: u32, h: u32, cell: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Rgb([40, 40, 40])
            } else {
                Rgb([210, 210, 210])
            }
        })
    }

    fn board(w: u32, h: u32) -> RgbImage {
        board_with_cell(w, h, 8)
    }

    #[test]
    fn test_blur_never_raises_sharpness() {
        let analyzer = analyzer();
        let crisp = board(160, 120);
        let mut last = f64::INFINITY;
        for sigma in [0.0f32, 1.0, 2.0, 4.0] {
            let img = if sigma == 0.0 {
                crisp.clone()
            } else {
                imageops::blur(&crisp, sigma)
            };
            let analysis = analyzer.analyze(&sample(img), OverlayKind::None, None).unwrap();
            let sharpness = analysis.metrics.scores.sharpness;
            assert!(sharpness <= last, "sigma {sigma}: {sharpness} > {last}");
            last = sharpness;
        }
    }

    #[test]
    fn test_five_percent_white_is_glare() {
        let img = RgbImage::from_fn(100, 100, |_, y| {
            if y < 5 {
                Rgb([255, 255, 255])
            } else {
                Rgb([120, 120, 120])
            }
        });
        let analysis = analyzer().analyze(&sample(img), OverlayKind::None, None).unwrap();
        assert!((analysis.metrics.scores.glare_fraction - 0.05).abs() < 1e-9);
        assert!(!analysis.metrics.glare_safe);
    }

    #[test]
    fn test_uniform_gray_is_glare_safe_but_flat() {
        let img = RgbImage::from_pixel(64, 48, Rgb([128, 128, 128]));
        let analysis = analyzer().analyze(&sample(img), OverlayKind::None, None).unwrap();
        assert!(analysis.metrics.glare_safe);
        assert!(!analysis.metrics.exposure_ok);
        assert!(!analysis.metrics.sharp);
    }

    #[test]
    fn test_black_and_white_frames_fail_exposure() {
        for value in [0u8, 255] {
            let img = RgbImage::from_pixel(64, 48, Rgb([value, value, value]));
            let analysis = analyzer().analyze(&sample(img), OverlayKind::None, None).unwrap();
            assert!(!analysis.metrics.exposure_ok, "value {value}");
        }
    }

    #[test]
    fn test_textured_mid_gray_passes_exposure() {
        let analysis = analyzer()
            .analyze(&sample(board(160, 120)), OverlayKind::Rectangle, None)
            .unwrap();
        let scores = analysis.metrics.scores;
        assert!((scores.luma_mean - 125.0).abs() < 1.0, "mean {}", scores.luma_mean);
        assert!(scores.luma_variance > 1200.0);
        assert!(analysis.metrics.exposure_ok);
        assert!(analysis.metrics.sharp);
        assert!(analysis.subject.passed);
        assert!(analysis.all_green());
    }

    #[test]
    fn test_level_only_checked_for_trapezoid() {
        let analyzer = analyzer();
        let frame = sample(board(160, 120));

        let tilted = analyzer.analyze(&frame, OverlayKind::Trapezoid, Some(12.0)).unwrap();
        assert!(!tilted.metrics.level_ok);
        assert!(!tilted.all_green());

        let ring = analyzer.analyze(&frame, OverlayKind::Ring, Some(12.0)).unwrap();
        assert!(ring.metrics.level_ok);

        let unknown = analyzer.analyze(&frame, OverlayKind::Trapezoid, None).unwrap();
        assert!(unknown.metrics.level_ok);
        assert_eq!(unknown.metrics.scores.roll_degrees, None);
    }

    #[test]
    fn test_analyze_full_downsamples() {
        let analysis = analyzer()
            .analyze_full(&board_with_cell(1280, 720, 64), OverlayKind::None, Some(1.0))
            .unwrap();
        assert!(analysis.metrics.exposure_ok);
        assert_eq!(analysis.overlay, OverlayKind::None);
    }
}
