//! Ordered capture step sequence.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::artifact::CapturedPhoto;

/// Default appraisal walk-around.
pub const DEFAULT_STEPS: &[&str] = &[
    "Left 3/4 Corner",
    "Right 3/4 Corner",
    "Left Side",
    "Right Side",
    "Front",
    "Rear",
    "Left Front Wheel",
    "Right Front Wheel",
    "Left Rear Wheel",
    "Right Rear Wheel",
    "Windshield / Dash",
    "Under-carriage",
    "Engine Bay",
    "VIN Plate",
    "Any Extra Damage",
];

/// Progress summary for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SequenceProgress {
    pub step_name: String,
    /// 1-based position of the current step.
    pub position: usize,
    pub total: usize,
    pub saved: usize,
    pub complete: bool,
}

/// Walks the operator through the steps and collects kept photos.
#[derive(Debug, Clone)]
pub struct CaptureSequence {
    steps: Vec<String>,
    current: usize,
    photos: Vec<CapturedPhoto>,
    complete: bool,
}

impl Default for CaptureSequence {
    fn default() -> Self {
        Self::new(DEFAULT_STEPS.iter().map(|s| s.to_string()).collect())
    }
}

impl CaptureSequence {
    /// Create a sequence. An empty list is treated as already complete.
    pub fn new(steps: Vec<String>) -> Self {
        let complete = steps.is_empty();
        Self {
            steps,
            current: 0,
            photos: Vec::new(),
            complete,
        }
    }

    pub fn current_step(&self) -> Option<&str> {
        self.steps.get(self.current).map(String::as_str)
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn photos(&self) -> &[CapturedPhoto] {
        &self.photos
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Store a kept photo and move to the next step.
    ///
    /// Keeping the last step marks the sequence complete instead of advancing.
    pub fn record(&mut self, photo: CapturedPhoto) {
        self.photos.push(photo);
        if self.current + 1 < self.steps.len() {
            self.current += 1;
        } else {
            self.complete = true;
        }
    }

    /// Go back one step. Returns false at the first step.
    pub fn back(&mut self) -> bool {
        if self.current == 0 {
            return false;
        }
        self.current -= 1;
        self.complete = false;
        true
    }

    /// Skip the current step without a photo. Returns false at the last step.
    pub fn skip(&mut self) -> bool {
        if self.current + 1 >= self.steps.len() {
            return false;
        }
        self.current += 1;
        true
    }

    pub fn progress(&self) -> SequenceProgress {
        SequenceProgress {
            step_name: self.current_step().unwrap_or_default().to_string(),
            position: (self.current + 1).min(self.steps.len()),
            total: self.steps.len(),
            saved: self.photos.len(),
            complete: self.complete,
        }
    }
}
