//! Subject detection providers.
//!
//! A `SubjectDetector` answers "is the expected subject where the overlay
//! says it should be?" for one analysis frame. Two implementations exist:
//!
//! | Detector                 | Availability          | Method |
//! |--------------------------|-----------------------|--------|
//! | `PixelStatsDetector`     | always                | edge energy in overlay regions |
//! | `ModelSubjectDetector`   | `onnx` feature + model | YOLOv8 vehicle confidence |
//!
//! Use `probe_detector` at startup; it returns the model detector when it can
//! be loaded and otherwise falls back silently to pixel statistics.

mod pixel;

#[cfg(feature = "onnx")]
mod model;

use std::sync::Arc;
use tracing::{debug, info};

use recon_models::{OverlayKind, SubjectScore};

use crate::config::AnalyzerConfig;
use crate::error::VisionResult;
use crate::frame::{FrameSample, GrayFrame};

pub use pixel::PixelStatsDetector;

#[cfg(feature = "onnx")]
pub use model::{ModelSubjectDetector, VEHICLE_CLASSES};

/// Everything a detector may look at for one tick.
#[derive(Debug, Clone, Copy)]
pub struct SubjectInput<'a> {
    pub overlay: OverlayKind,
    pub frame: &'a FrameSample,
    pub gray: &'a GrayFrame,
    /// Laplacian variance already computed for this frame.
    pub sharpness: f64,
    /// Exposure verdict already computed for this frame.
    pub exposure_ok: bool,
}

/// Subject detection capability.
pub trait SubjectDetector: Send + Sync {
    /// Score the subject for one frame.
    fn detect(&self, input: &SubjectInput<'_>) -> VisionResult<SubjectScore>;

    /// Detector name for logging.
    fn name(&self) -> &'static str;

    /// Whether this detector runs a learned model (vs pure heuristics).
    fn uses_model(&self) -> bool;
}

/// Pick the best available detector.
///
/// Never fails: any problem loading the model degrades to pixel statistics.
pub fn probe_detector(config: &AnalyzerConfig) -> Arc<dyn SubjectDetector> {
    let fallback = PixelStatsDetector::new(config.clone());

    let Some(model_path) = config.model_path.as_ref() else {
        debug!("No subject model configured, using pixel statistics");
        return Arc::new(fallback);
    };

    #[cfg(feature = "onnx")]
    {
        match ModelSubjectDetector::load(model_path, config.model_min_confidence, fallback.clone()) {
            Ok(detector) => {
                info!(
                    model_path = %model_path.display(),
                    detector = detector.name(),
                    "Model subject detector enabled"
                );
                return Arc::new(detector);
            }
            Err(e) => {
                debug!(error = %e, "Model subject detector unavailable, using pixel statistics");
            }
        }
    }

    #[cfg(not(feature = "onnx"))]
    debug!(
        model_path = %model_path.display(),
        "Built without the onnx feature, ignoring subject model"
    );

    info!(detector = fallback.name(), "Subject detector selected");
    Arc::new(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_without_model_uses_pixel_stats() {
        let detector = probe_detector(&AnalyzerConfig::default());
        assert_eq!(detector.name(), "pixel_stats");
        assert!(!detector.uses_model());
    }

    #[test]
    fn test_probe_with_missing_model_falls_back() {
        let config = AnalyzerConfig {
            model_path: Some("does/not/exist/yolov8n.onnx".into()),
            ..Default::default()
        };
        let detector = probe_detector(&config);
        assert_eq!(detector.name(), "pixel_stats");
    }
}
