//! Overlay kind definitions.
//!
//! The overlay is the guide shape drawn over the live preview. It tells the
//! operator where the subject should sit, and it selects which subject
//! heuristic the frame analyzer runs:
//!
//! - `Trapezoid`: full-vehicle corner and side shots
//! - `Ring`: wheel and tire close-ups
//! - `Rectangle`: windshield, dash, engine bay, VIN label
//! - `Oval`: under-carriage (manual capture only)
//! - `None`: no guide

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// On-screen guide shape for a capture step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    /// Bumper-and-rocker window for corner and side shots.
    Trapezoid,
    /// Circular guide for wheels and tires.
    #[serde(alias = "circle")]
    Ring,
    /// Padded box for interior and detail shots.
    Rectangle,
    /// Low ellipse for under-carriage shots.
    Oval,
    /// No guide at all.
    #[default]
    None,
}

impl OverlayKind {
    /// All overlay kinds.
    pub const ALL: &'static [OverlayKind] = &[
        OverlayKind::Trapezoid,
        OverlayKind::Ring,
        OverlayKind::Rectangle,
        OverlayKind::Oval,
        OverlayKind::None,
    ];

    /// Returns the overlay name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayKind::Trapezoid => "trapezoid",
            OverlayKind::Ring => "ring",
            OverlayKind::Rectangle => "rectangle",
            OverlayKind::Oval => "oval",
            OverlayKind::None => "none",
        }
    }

    /// Whether the dwell timer may release the shutter on its own.
    ///
    /// Under-carriage shots are taken blind from a kneeling position, so the
    /// operator always decides when to fire.
    pub fn auto_capture(&self) -> bool {
        !matches!(self, OverlayKind::Oval)
    }

    /// Whether a level horizon matters for this overlay by default.
    pub fn requires_level_by_default(&self) -> bool {
        matches!(self, OverlayKind::Trapezoid)
    }

    /// Plain-language instructions shown under the preview.
    pub fn guidance(&self) -> &'static [&'static str] {
        match self {
            OverlayKind::Trapezoid => &[
                "Stand back so the car fills the frame.",
                "Keep the bottom of the car on the dashed line.",
                "Hold the phone steady for a second.",
            ],
            OverlayKind::Ring => &[
                "Put the wheel inside the ring.",
                "Show some tire tread too.",
                "Hold steady, the photo grabs itself.",
            ],
            OverlayKind::Rectangle => &[
                "Fill the box with the windshield or dashboard.",
                "If the dash is on: key on, engine off.",
                "Hold steady, the photo grabs itself.",
            ],
            OverlayKind::Oval => &[
                "Kneel and aim under the car.",
                "Make sure the oval is mostly filled.",
                "When the button turns dark, tap to take it.",
            ],
            OverlayKind::None => &[
                "Frame the car. Keep your hands steady.",
                "We'll take the photo when it looks good.",
            ],
        }
    }

    /// Guide geometry, normalized to the frame, matching the regions the
    /// analyzer scores.
    pub fn guide_shape(&self) -> GuideShape {
        match self {
            OverlayKind::Trapezoid => GuideShape::Trapezoid {
                top_y: 0.18,
                bottom_y: 0.83,
                top_left_x: 0.2,
                top_right_x: 0.8,
                bottom_left_x: 0.08,
                bottom_right_x: 0.92,
                rocker_y: 0.82,
            },
            OverlayKind::Ring => GuideShape::Circle {
                center_x: 0.5,
                center_y: 0.6,
                radius_of_height: 0.24,
            },
            OverlayKind::Rectangle => GuideShape::Inset { padding_px: 20 },
            OverlayKind::Oval => GuideShape::Ellipse {
                center_x: 0.5,
                center_y: 0.62,
                radius_x: 0.33,
                radius_y: 0.18,
            },
            OverlayKind::None => GuideShape::FullFrame,
        }
    }
}

impl fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OverlayKind {
    type Err = OverlayParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trapezoid" => Ok(OverlayKind::Trapezoid),
            "ring" | "circle" => Ok(OverlayKind::Ring),
            "rectangle" | "rect" => Ok(OverlayKind::Rectangle),
            "oval" | "ellipse" => Ok(OverlayKind::Oval),
            "none" => Ok(OverlayKind::None),
            _ => Err(OverlayParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown overlay kind: {0}")]
pub struct OverlayParseError(String);

/// Normalized guide geometry.
///
/// X coordinates are fractions of frame width, Y coordinates fractions of
/// frame height, except where a field says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum GuideShape {
    Trapezoid {
        top_y: f32,
        bottom_y: f32,
        top_left_x: f32,
        top_right_x: f32,
        bottom_left_x: f32,
        bottom_right_x: f32,
        /// Dashed line the rocker panel should rest on.
        rocker_y: f32,
    },
    Circle {
        center_x: f32,
        center_y: f32,
        /// Radius as a fraction of frame height.
        radius_of_height: f32,
    },
    Inset {
        /// Padding in analysis-resolution pixels.
        padding_px: u32,
    },
    Ellipse {
        center_x: f32,
        center_y: f32,
        radius_x: f32,
        radius_y: f32,
    },
    FullFrame,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_parse() {
        assert_eq!("trapezoid".parse::<OverlayKind>().unwrap(), OverlayKind::Trapezoid);
        assert_eq!("circle".parse::<OverlayKind>().unwrap(), OverlayKind::Ring);
        assert_eq!("RING".parse::<OverlayKind>().unwrap(), OverlayKind::Ring);
        assert_eq!("oval".parse::<OverlayKind>().unwrap(), OverlayKind::Oval);
        assert!("hexagon".parse::<OverlayKind>().is_err());
    }

    #[test]
    fn test_overlay_serde_accepts_circle_alias() {
        let kind: OverlayKind = serde_json::from_str("\"circle\"").unwrap();
        assert_eq!(kind, OverlayKind::Ring);
        assert_eq!(serde_json::to_string(&OverlayKind::Ring).unwrap(), "\"ring\"");
    }

    #[test]
    fn test_only_oval_is_manual() {
        for kind in OverlayKind::ALL {
            assert_eq!(kind.auto_capture(), *kind != OverlayKind::Oval);
        }
    }

    #[test]
    fn test_guidance_present_for_every_kind() {
        for kind in OverlayKind::ALL {
            assert!(!kind.guidance().is_empty(), "{kind} has no guidance");
        }
    }

    #[test]
    fn test_guide_shape_matches_kind() {
        assert!(matches!(OverlayKind::Ring.guide_shape(), GuideShape::Circle { .. }));
        assert!(matches!(OverlayKind::Oval.guide_shape(), GuideShape::Ellipse { .. }));
        assert_eq!(OverlayKind::None.guide_shape(), GuideShape::FullFrame);
    }
}
