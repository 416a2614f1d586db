//! Snapshot encoding.
//!
//! A fired capture hands one full-resolution frame to the pipeline, which
//! produces the JPEG and a small preview for the review screen. Encoding is
//! CPU-bound, so `spawn` runs it on the blocking pool.

use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, RgbImage};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use recon_models::{PendingArtifact, PreviewHandle};

use crate::config::PipelineConfig;
use crate::error::{CaptureError, CaptureResult};

/// Encodes snapshots into pending artifacts.
#[derive(Debug, Clone)]
pub struct CapturePipeline {
    config: PipelineConfig,
}

impl CapturePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Encode on the blocking pool.
    pub fn spawn(
        &self,
        step_name: String,
        snapshot: RgbImage,
    ) -> JoinHandle<CaptureResult<PendingArtifact>> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.encode(&step_name, snapshot))
    }

    /// Encode the snapshot and its preview. The snapshot is consumed.
    pub fn encode(&self, step_name: &str, snapshot: RgbImage) -> CaptureResult<PendingArtifact> {
        let (width, height) = snapshot.dimensions();
        if width == 0 || height == 0 {
            return Err(CaptureError::encode("Snapshot is empty"));
        }

        let image_bytes = encode_jpeg(&snapshot, self.config.jpeg_quality)?;
        let preview = self.preview(&snapshot)?;
        drop(snapshot);

        debug!(
            step_name = step_name,
            width = width,
            height = height,
            bytes = image_bytes.len(),
            preview_bytes = preview.jpeg.len(),
            "Snapshot encoded"
        );

        Ok(PendingArtifact {
            id: Uuid::new_v4(),
            step_name: step_name.to_string(),
            image_bytes,
            preview,
            captured_at: Utc::now(),
        })
    }

    fn preview(&self, snapshot: &RgbImage) -> CaptureResult<PreviewHandle> {
        let (width, height) = snapshot.dimensions();
        let max_width = self.config.preview_max_width;

        if width <= max_width {
            let jpeg = encode_jpeg(snapshot, self.config.preview_quality)?;
            return Ok(PreviewHandle::new(width, height, jpeg));
        }

        let preview_height = ((height as f64 * max_width as f64) / width as f64)
            .round()
            .max(1.0) as u32;
        let small = imageops::resize(snapshot, max_width, preview_height, FilterType::Triangle);
        let jpeg = encode_jpeg(&small, self.config.preview_quality)?;
        Ok(PreviewHandle::new(max_width, preview_height, jpeg))
    }
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> CaptureResult<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
        .map_err(|e| CaptureError::encode(format!("JPEG encoding failed: {}", e)))?;
    Ok(buffer)
}
