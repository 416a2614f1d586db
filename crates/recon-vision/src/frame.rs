//! Analysis frames.
//!
//! Analysis never runs on the full-resolution camera frame. Each tick the
//! current frame is downsampled to a fixed width, scored, and dropped.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::{VisionError, VisionResult};

/// RGB frame at analysis resolution.
#[derive(Debug, Clone)]
pub struct FrameSample {
    image: RgbImage,
}

impl FrameSample {
    /// Wrap an image that is already at analysis resolution.
    pub fn new(image: RgbImage) -> VisionResult<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(VisionError::EmptyFrame);
        }
        if width < 3 || height < 3 {
            return Err(VisionError::FrameTooSmall { width, height });
        }
        Ok(Self { image })
    }

    /// Build a sample from raw RGB bytes (width * height * 3).
    pub fn from_raw(width: u32, height: u32, rgb: Vec<u8>) -> VisionResult<Self> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(VisionError::InvalidBuffer {
                expected,
                actual: rgb.len(),
            });
        }
        let image = RgbImage::from_raw(width, height, rgb)
            .ok_or_else(|| VisionError::internal("Failed to create image buffer"))?;
        Self::new(image)
    }

    /// Downsample a full-resolution frame to `analysis_width`, keeping aspect.
    ///
    /// Frames already at or below the analysis width are used as-is.
    pub fn downsample(full: &RgbImage, analysis_width: u32) -> VisionResult<Self> {
        let (width, height) = full.dimensions();
        if width == 0 || height == 0 {
            return Err(VisionError::EmptyFrame);
        }
        if width <= analysis_width {
            return Self::new(full.clone());
        }
        let target_height =
            ((height as f64 / width as f64) * analysis_width as f64).floor().max(1.0) as u32;
        let small = imageops::resize(full, analysis_width, target_height, FilterType::Triangle);
        Self::new(small)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Interleaved RGB bytes.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Reduce to an integer luma plane.
    pub fn to_gray(&self) -> GrayFrame {
        let luma = self
            .image
            .as_raw()
            .chunks_exact(3)
            .map(|px| luma_of(px[0], px[1], px[2]) as u8)
            .collect();
        GrayFrame {
            width: self.width(),
            height: self.height(),
            luma,
        }
    }
}

/// Rec. 601 luma, unrounded.
#[inline]
pub fn luma_of(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

/// Single-channel luma plane, row-major.
#[derive(Debug, Clone)]
pub struct GrayFrame {
    pub width: u32,
    pub height: u32,
    pub luma: Vec<u8>,
}

impl GrayFrame {
    #[inline]
    pub fn at(&self, x: u32, y: u32) -> u8 {
        self.luma[(y * self.width + x) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_gray_truncates() {
        let frame = FrameSample::new(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]))).unwrap();
        // 2.99 + 11.74 + 3.42 = 18.15
        assert!(frame.to_gray().luma.iter().all(|&v| v == 18));
    }

    #[test]
    fn test_downsample_keeps_aspect() {
        let full = RgbImage::new(1280, 720);
        let sample = FrameSample::downsample(&full, 320).unwrap();
        assert_eq!((sample.width(), sample.height()), (320, 180));

        let small = RgbImage::new(200, 100);
        let sample = FrameSample::downsample(&small, 320).unwrap();
        assert_eq!((sample.width(), sample.height()), (200, 100));
    }

    #[test]
    fn test_rejects_bad_buffers() {
        assert!(matches!(
            FrameSample::from_raw(4, 4, vec![0; 10]),
            Err(VisionError::InvalidBuffer { expected: 48, actual: 10 })
        ));
        assert!(matches!(
            FrameSample::new(RgbImage::new(0, 0)),
            Err(VisionError::EmptyFrame)
        ));
        assert!(matches!(
            FrameSample::new(RgbImage::new(2, 8)),
            Err(VisionError::FrameTooSmall { .. })
        ));
    }
}
