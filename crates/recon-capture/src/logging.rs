//! Structured step logging.
//!
//! Every log line about a capture step carries the session id and step name
//! so a whole walk-around can be followed in aggregated logs.

use tracing::{error, info, warn, Span};
use uuid::Uuid;

/// Logger for one capture step within a session.
#[derive(Debug, Clone)]
pub struct StepLogger {
    session_id: String,
    step_name: String,
}

impl StepLogger {
    pub fn new(session_id: &Uuid, step_name: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            step_name: step_name.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            step = %self.step_name,
            "Step started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            step = %self.step_name,
            "Step progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            session_id = %self.session_id,
            step = %self.step_name,
            "Step warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            session_id = %self.session_id,
            step = %self.step_name,
            "Step error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            step = %self.step_name,
            "Step completed: {}", message
        );
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Span for attaching further structured fields.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "capture_step",
            session_id = %self.session_id,
            step = %self.step_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_logger_fields() {
        let session_id = Uuid::new_v4();
        let logger = StepLogger::new(&session_id, "Left Front Tire");
        assert_eq!(logger.session_id(), session_id.to_string());
        assert_eq!(logger.step_name(), "Left Front Tire");
    }
}
