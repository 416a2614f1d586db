//! Guided vehicle photo capture.
//!
//! Ties frame analysis to the shutter:
//! - `CaptureGate`: dwell, countdown and review state machine
//! - `CapturePipeline`: full-resolution snapshot to JPEG plus preview
//! - `VideoSource` / `OrientationFeed`: what the session consumes
//! - `CaptureSession`: the single-task loop that owns all of the above

pub mod config;
pub mod error;
pub mod gate;
pub mod logging;
pub mod metrics;
pub mod orientation;
pub mod pipeline;
pub mod session;
pub mod source;

pub use config::{CaptureConfig, CountdownPolicy, GateConfig, ManualCapturePolicy, PipelineConfig};
pub use error::{CaptureError, CaptureResult};
pub use gate::{CaptureGate, CaptureTicket, GateAction, GatePhase, GateState, GateStatus, Readiness};
pub use logging::StepLogger;
pub use orientation::{OrientationFeed, OrientationSubscription};
pub use pipeline::CapturePipeline;
pub use session::{CaptureSession, SessionCommand, SessionEvent, SessionHandle};
pub use source::{
    ChannelVideoSource, FramePublisher, SourceGuard, VideoFrame, VideoSource, VideoSourceProvider,
};
