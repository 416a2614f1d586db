//! Frame quality scoring for guided vehicle photography.
//!
//! This crate provides:
//! - Analysis-resolution frame sampling and grayscale reduction
//! - Sharpness (variance of Laplacian), exposure and glare metrics
//! - Overlay-specific subject heuristics (wheel ring, under-carriage oval,
//!   generic edge content) behind a pluggable `SubjectDetector`
//! - An optional ONNX object detector, probed at startup with silent
//!   fallback to pixel statistics
//! - Roll-based level checks with a per-overlay policy

pub mod analyzer;
pub mod config;
pub mod detector;
pub mod error;
pub mod frame;
pub mod kernels;
pub mod level;

pub use analyzer::{FrameAnalysis, FrameAnalyzer};
pub use config::{AnalyzerConfig, OvalRegion, RingRegion};
pub use detector::{probe_detector, PixelStatsDetector, SubjectDetector, SubjectInput};
pub use error::{VisionError, VisionResult};
pub use frame::{FrameSample, GrayFrame};
pub use level::{LevelPolicy, LevelSensor};
