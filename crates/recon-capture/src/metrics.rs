//! Capture metrics.
//!
//! Only the `metrics` facade is used here; installing a recorder is up to the
//! embedding application.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const FRAMES_ANALYZED_TOTAL: &str = "recon_frames_analyzed_total";
    pub const FRAMES_DROPPED_TOTAL: &str = "recon_frames_dropped_total";
    pub const CAPTURES_TOTAL: &str = "recon_captures_total";
    pub const CAPTURE_FAILURES_TOTAL: &str = "recon_capture_failures_total";
}

pub fn record_frame_analyzed(overlay: &str) {
    let labels = [("overlay", overlay.to_string())];
    counter!(names::FRAMES_ANALYZED_TOTAL, &labels).increment(1);
}

pub fn record_frames_dropped(count: u64) {
    counter!(names::FRAMES_DROPPED_TOTAL).increment(count);
}

pub fn record_capture(overlay: &str) {
    let labels = [("overlay", overlay.to_string())];
    counter!(names::CAPTURES_TOTAL, &labels).increment(1);
}

pub fn record_capture_failure(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::CAPTURE_FAILURES_TOTAL, &labels).increment(1);
}
