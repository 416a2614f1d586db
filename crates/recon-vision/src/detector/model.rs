//! Model-based subject detection using a YOLOv8 ONNX model.
//!
//! Only full-vehicle overlays (trapezoid and none) ask the model anything; the
//! close-up overlays keep their region heuristics, which a COCO detector cannot
//! improve on. Inference errors degrade to the pixel detector for that tick.

use std::path::Path;
use std::sync::Mutex;

use image::imageops::{self, FilterType};
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use recon_models::{OverlayKind, SubjectMethod, SubjectScore};

use super::{PixelStatsDetector, SubjectDetector, SubjectInput};
use crate::error::{VisionError, VisionResult};
use crate::frame::FrameSample;

/// COCO class ids that count as "a vehicle in frame": car, motorcycle, bus, truck.
pub const VEHICLE_CLASSES: &[usize] = &[2, 3, 5, 7];

const INPUT_SIZE: u32 = 640;
const NUM_CLASSES: usize = 80;
const NUM_BOXES: usize = 8400;

/// YOLOv8 vehicle detector with a pixel-statistics fallback.
pub struct ModelSubjectDetector {
    session: Mutex<Session>,
    min_confidence: f32,
    fallback: PixelStatsDetector,
}

impl ModelSubjectDetector {
    /// Load the model. Fails if the file is missing or ONNX Runtime rejects it.
    pub fn load(
        model_path: &Path,
        min_confidence: f32,
        fallback: PixelStatsDetector,
    ) -> VisionResult<Self> {
        if !model_path.exists() {
            return Err(VisionError::model_not_found(model_path.display().to_string()));
        }
        let session = create_session(model_path)?;
        info!(
            model_path = %model_path.display(),
            input_size = INPUT_SIZE,
            "Subject model loaded"
        );
        Ok(Self {
            session: Mutex::new(session),
            min_confidence,
            fallback,
        })
    }

    /// Highest vehicle-class confidence anywhere in the frame.
    fn vehicle_confidence(&self, frame: &FrameSample) -> VisionResult<f32> {
        let input = preprocess(frame)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| VisionError::internal("Session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| VisionError::detection_failed(format!("ONNX inference failed: {}", e)))?;
        let output = outputs
            .get("output0")
            .ok_or_else(|| VisionError::detection_failed("Missing output0 tensor"))?;
        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::detection_failed(format!("Failed to extract tensor: {}", e)))?;

        max_vehicle_confidence(tensor.1)
    }
}

impl SubjectDetector for ModelSubjectDetector {
    fn detect(&self, input: &SubjectInput<'_>) -> VisionResult<SubjectScore> {
        if !matches!(input.overlay, OverlayKind::Trapezoid | OverlayKind::None) {
            return self.fallback.detect(input);
        }

        match self.vehicle_confidence(input.frame) {
            Ok(confidence) => {
                let passed = confidence >= self.min_confidence && input.exposure_ok;
                Ok(SubjectScore::new(SubjectMethod::Model, confidence as f64, passed))
            }
            Err(e) => {
                debug!(error = %e, "Model detection failed, using pixel statistics");
                self.fallback.detect(input)
            }
        }
    }

    fn name(&self) -> &'static str {
        "yolov8_vehicle"
    }

    fn uses_model(&self) -> bool {
        true
    }
}

/// Resize to 640x640, normalize to [0, 1], NCHW.
fn preprocess(frame: &FrameSample) -> VisionResult<Value> {
    let resized = imageops::resize(frame.image(), INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let (w, h) = (INPUT_SIZE as usize, INPUT_SIZE as usize);

    let mut chw: Vec<f32> = Vec::with_capacity(3 * h * w);
    for c in 0..3 {
        for y in 0..h {
            for x in 0..w {
                chw.push(resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0);
            }
        }
    }

    let shape = vec![1usize, 3, h, w];
    Tensor::from_array((shape, chw.into_boxed_slice()))
        .map(Value::from)
        .map_err(|e| VisionError::internal(format!("Failed to create tensor: {}", e)))
}

/// Scan a `[1, 84, 8400]` YOLOv8 output for the best vehicle score.
fn max_vehicle_confidence(outputs: &[f32]) -> VisionResult<f32> {
    let num_features = 4 + NUM_CLASSES;
    if outputs.len() != num_features * NUM_BOXES {
        return Err(VisionError::detection_failed(format!(
            "Unexpected output size: expected {}, got {}",
            num_features * NUM_BOXES,
            outputs.len()
        )));
    }

    let features = Array::from_shape_vec((num_features, NUM_BOXES), outputs.to_vec())
        .map_err(|e| VisionError::internal(format!("Failed to reshape output: {}", e)))?;

    let best = VEHICLE_CLASSES
        .iter()
        .flat_map(|&class| features.row(4 + class).to_vec())
        .fold(0.0f32, f32::max);
    Ok(best)
}

/// Create an ONNX Runtime session on the CPU execution provider.
fn create_session(model_path: &Path) -> VisionResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| VisionError::internal(format!("Failed to read model file: {}", e)))?;

    Session::builder()
        .map_err(|e| VisionError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| VisionError::internal(format!("Failed to set optimization level: {}", e)))?
        .commit_from_memory(&model_bytes)
        .map_err(|e| VisionError::internal(format!("Failed to load ONNX model: {}", e)))
}
