//! Pixel-statistics subject heuristics.

use recon_models::{OverlayKind, SubjectMethod, SubjectScore};

use super::{SubjectDetector, SubjectInput};
use crate::config::AnalyzerConfig;
use crate::error::VisionResult;
use crate::kernels::GradientField;

/// Lightweight detector built on edge-energy statistics. Always available.
#[derive(Debug, Clone)]
pub struct PixelStatsDetector {
    config: AnalyzerConfig,
}

impl PixelStatsDetector {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Share of edge energy inside the wheel annulus ("ringness").
    pub fn ring_score(&self, field: &GradientField, width: u32, height: u32) -> f64 {
        let ring = self.config.ring;
        field.share_where(|x, y| ring.contains(x, y, width, height))
    }

    /// Share of edge energy inside the under-carriage ellipse.
    pub fn oval_coverage(&self, field: &GradientField, width: u32, height: u32) -> f64 {
        let oval = self.config.oval;
        field.share_where(|x, y| oval.contains(x, y, width, height))
    }

    fn generic(&self, input: &SubjectInput<'_>) -> SubjectScore {
        let threshold = self.config.generic_edge_threshold;
        let passed = input.sharpness > threshold && input.exposure_ok;
        let score = if threshold > 0.0 {
            input.sharpness / (2.0 * threshold)
        } else {
            1.0
        };
        SubjectScore::new(SubjectMethod::Generic, score, passed)
    }
}

impl SubjectDetector for PixelStatsDetector {
    fn detect(&self, input: &SubjectInput<'_>) -> VisionResult<SubjectScore> {
        let (width, height) = (input.gray.width, input.gray.height);
        let score = match input.overlay {
            OverlayKind::Ring => {
                let field = GradientField::sobel(input.gray);
                let ringness = self.ring_score(&field, width, height);
                SubjectScore::new(SubjectMethod::Ring, ringness, ringness > self.config.ring_threshold)
            }
            OverlayKind::Oval => {
                let field = GradientField::sobel(input.gray);
                let coverage = self.oval_coverage(&field, width, height);
                SubjectScore::new(
                    SubjectMethod::Oval,
                    coverage,
                    coverage > self.config.oval_presence_threshold,
                )
                .with_coverage(coverage > self.config.oval_coverage_threshold)
            }
            OverlayKind::Trapezoid | OverlayKind::Rectangle | OverlayKind::None => {
                self.generic(input)
            }
        };
        Ok(score)
    }

    fn name(&self) -> &'static str {
        "pixel_stats"
    }

    fn uses_model(&self) -> bool {
        false
    }
}
