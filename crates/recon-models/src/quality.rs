//! Per-frame quality metrics and subject scores.
//!
//! These are produced once per analysis tick and drive both the sensor chips
//! in the UI and the capture gate.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw scalar scores behind the quality booleans.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct QualityScores {
    /// Variance of the 4-neighbour Laplacian response.
    pub sharpness: f64,
    /// Mean luma (0-255).
    pub luma_mean: f64,
    /// Luma variance over the full frame.
    pub luma_variance: f64,
    /// Fraction of near-saturated pixels (0-1).
    pub glare_fraction: f64,
    /// Device roll in degrees, when an orientation reading was available.
    pub roll_degrees: Option<f64>,
}

/// Quality verdict for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct QualityMetrics {
    pub sharp: bool,
    pub glare_safe: bool,
    pub exposure_ok: bool,
    pub level_ok: bool,
    pub scores: QualityScores,
}

impl QualityMetrics {
    /// Every boolean quality signal passed.
    pub fn all_ok(&self) -> bool {
        self.sharp && self.glare_safe && self.exposure_ok && self.level_ok
    }
}

/// Which heuristic produced a subject score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubjectMethod {
    /// Edge energy inside the wheel annulus.
    Ring,
    /// Edge energy inside the under-carriage ellipse.
    Oval,
    /// Whole-frame edge content and exposure.
    Generic,
    /// Object detector confidence.
    Model,
}

impl SubjectMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectMethod::Ring => "ring",
            SubjectMethod::Oval => "oval",
            SubjectMethod::Generic => "generic",
            SubjectMethod::Model => "model",
        }
    }
}

impl fmt::Display for SubjectMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Confidence that the expected subject is in frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubjectScore {
    pub method: SubjectMethod,
    /// Confidence in [0, 1].
    pub score: f64,
    /// Subject check for the all-green signal.
    pub passed: bool,
    /// Stricter coverage check. Only differs from `passed` for the oval,
    /// where it unlocks manual capture.
    pub coverage_ok: bool,
}

impl SubjectScore {
    pub fn new(method: SubjectMethod, score: f64, passed: bool) -> Self {
        Self {
            method,
            score: score.clamp(0.0, 1.0),
            passed,
            coverage_ok: passed,
        }
    }

    pub fn with_coverage(mut self, coverage_ok: bool) -> Self {
        self.coverage_ok = coverage_ok;
        self
    }

    /// Score for a frame with nothing to look at.
    pub fn absent(method: SubjectMethod) -> Self {
        Self::new(method, 0.0, false)
    }
}
