//! Shared data models for the vehicle photo capture coach.
//!
//! This crate provides Serde-serializable types for:
//! - Overlay kinds and their on-screen guide shapes
//! - Coaching specs and the step-name resolver
//! - The ordered capture step sequence
//! - Per-frame quality metrics and subject scores
//! - Captured image artifacts and previews

pub mod artifact;
pub mod coach;
pub mod overlay;
pub mod quality;
pub mod sequence;

// Re-export common types
pub use artifact::{CapturedPhoto, PendingArtifact, PreviewHandle};
pub use coach::{CoachResolver, CoachSpec, COIN_HINT};
pub use overlay::{GuideShape, OverlayKind, OverlayParseError};
pub use quality::{QualityMetrics, QualityScores, SubjectMethod, SubjectScore};
pub use sequence::{CaptureSequence, SequenceProgress, DEFAULT_STEPS};
