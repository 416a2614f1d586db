//! Configuration for the frame analyzer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Thresholds and region geometry for frame analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    // === Sampling ===
    /// Width of the analysis frame; height keeps the source aspect (default: 320)
    pub analysis_width: u32,

    // === Sharpness ===
    /// Laplacian variance above which a frame counts as sharp (default: 45.0)
    pub sharpness_threshold: f64,

    /// Laplacian variance needed for the generic subject check (default: 30.0)
    pub generic_edge_threshold: f64,

    // === Exposure ===
    /// Mean luma must be strictly above this (default: 60.0)
    pub min_luma_mean: f64,

    /// Mean luma must be strictly below this (default: 200.0)
    pub max_luma_mean: f64,

    /// Luma variance must exceed this; flat frames fail (default: 1200.0)
    pub min_luma_variance: f64,

    // === Glare ===
    /// Channel value above which a pixel is near-saturated, all three channels (default: 245)
    pub glare_channel_threshold: u8,

    /// Maximum tolerated fraction of near-saturated pixels (default: 0.02)
    pub max_glare_fraction: f64,

    // === Subject: ring (wheels) ===
    /// Annulus where a wheel's rim and tread should sit
    pub ring: RingRegion,

    /// Edge-energy share inside the annulus needed to pass (default: 0.18)
    pub ring_threshold: f64,

    // === Subject: oval (under-carriage) ===
    /// Ellipse the under-carriage should fill
    pub oval: OvalRegion,

    /// Edge-energy share for the soft "not a blank frame" check (default: 0.12)
    pub oval_presence_threshold: f64,

    /// Edge-energy share that unlocks manual capture (default: 0.32)
    pub oval_coverage_threshold: f64,

    // === Model detector ===
    /// YOLOv8 ONNX model used for full-vehicle shots when available
    pub model_path: Option<PathBuf>,

    /// Minimum vehicle confidence for the model detector (default: 0.4)
    pub model_min_confidence: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            analysis_width: 320,

            sharpness_threshold: 45.0,
            generic_edge_threshold: 30.0,

            min_luma_mean: 60.0,
            max_luma_mean: 200.0,
            min_luma_variance: 1200.0,

            glare_channel_threshold: 245,
            max_glare_fraction: 0.02,

            ring: RingRegion::default(),
            ring_threshold: 0.18,

            oval: OvalRegion::default(),
            oval_presence_threshold: 0.12,
            oval_coverage_threshold: 0.32,

            model_path: None,
            model_min_confidence: 0.4,
        }
    }
}

/// Annulus in normalized frame coordinates. Radii are fractions of height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RingRegion {
    pub center_x: f64,
    pub center_y: f64,
    pub inner_radius: f64,
    pub outer_radius: f64,
}

impl Default for RingRegion {
    fn default() -> Self {
        Self {
            center_x: 0.5,
            center_y: 0.6,
            inner_radius: 0.15,
            outer_radius: 0.27,
        }
    }
}

impl RingRegion {
    /// Whether pixel `(x, y)` lies in the annulus of a `width`x`height` frame.
    pub fn contains(&self, x: u32, y: u32, width: u32, height: u32) -> bool {
        let h = height as f64;
        let dx = x as f64 - self.center_x * width as f64;
        let dy = y as f64 - self.center_y * h;
        let r = dx.hypot(dy);
        r >= self.inner_radius * h && r <= self.outer_radius * h
    }
}

/// Ellipse in normalized frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OvalRegion {
    pub center_x: f64,
    pub center_y: f64,
    /// Semi-axis as a fraction of width.
    pub radius_x: f64,
    /// Semi-axis as a fraction of height.
    pub radius_y: f64,
}

impl Default for OvalRegion {
    fn default() -> Self {
        Self {
            center_x: 0.5,
            center_y: 0.62,
            radius_x: 0.33,
            radius_y: 0.18,
        }
    }
}

impl OvalRegion {
    /// Whether pixel `(x, y)` lies inside the ellipse.
    pub fn contains(&self, x: u32, y: u32, width: u32, height: u32) -> bool {
        let (w, h) = (width as f64, height as f64);
        let nx = (x as f64 - self.center_x * w) / (self.radius_x * w);
        let ny = (y as f64 - self.center_y * h) / (self.radius_y * h);
        nx * nx + ny * ny <= 1.0
    }
}
