//! Horizon level checks from device roll.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use recon_models::OverlayKind;

/// Judges whether the device is held level enough.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelSensor {
    /// Largest tolerated absolute roll, exclusive (default: 7.0)
    pub max_roll_degrees: f64,
}

impl Default for LevelSensor {
    fn default() -> Self {
        Self {
            max_roll_degrees: 7.0,
        }
    }
}

impl LevelSensor {
    pub fn new(max_roll_degrees: f64) -> Self {
        Self { max_roll_degrees }
    }

    /// No reading means no orientation hardware; never block on it.
    pub fn is_level(&self, roll_degrees: Option<f64>) -> bool {
        match roll_degrees {
            Some(roll) if roll.is_finite() => roll.abs() < self.max_roll_degrees,
            _ => true,
        }
    }
}

/// Overlay kinds for which the level check counts toward all-green.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelPolicy {
    kinds: HashSet<OverlayKind>,
}

impl Default for LevelPolicy {
    fn default() -> Self {
        Self::with_kinds(
            OverlayKind::ALL
                .iter()
                .copied()
                .filter(OverlayKind::requires_level_by_default),
        )
    }
}

impl LevelPolicy {
    pub fn with_kinds(kinds: impl IntoIterator<Item = OverlayKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    /// Never consult the level sensor.
    pub fn none() -> Self {
        Self {
            kinds: HashSet::new(),
        }
    }

    pub fn requires_level(&self, overlay: OverlayKind) -> bool {
        self.kinds.contains(&overlay)
    }
}
