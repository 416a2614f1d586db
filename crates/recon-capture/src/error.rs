//! Capture error types.

use thiserror::Error;

use recon_vision::VisionError;

pub type CaptureResult<T> = Result<T, CaptureError>;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Video source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("Video source closed")]
    SourceClosed,

    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CaptureError {
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            reason: reason.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Errors the operator can recover from by trying again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::SourceClosed | Self::Encode(_)
        )
    }
}
