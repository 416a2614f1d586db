//! Coaching specs and the step-name resolver.
//!
//! Each capture step is coached with an overlay and a short tip. The resolver
//! maps free-form step names ("LF Tire", "Left 3/4 Corner", "Undertray/Leaks")
//! to a `CoachSpec` through ordered pattern rules; the first match wins.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::overlay::OverlayKind;

/// Extra hint shown when a step is in coin mode.
pub const COIN_HINT: &str = "Tip: Hold coin at wear bars";

/// Coaching configuration for one capture step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CoachSpec {
    /// Guide shape and subject heuristic.
    pub overlay: OverlayKind,
    /// One-line tip shown in the banner.
    pub tip: String,
    /// Show the coin-at-wear-bars hint (tread depth).
    #[serde(default)]
    pub requires_coin: bool,
}

impl CoachSpec {
    pub fn new(overlay: OverlayKind, tip: impl Into<String>) -> Self {
        Self {
            overlay,
            tip: tip.into(),
            requires_coin: false,
        }
    }

    pub fn with_coin(mut self) -> Self {
        self.requires_coin = true;
        self
    }

    /// Banner lines: the tip, then the coin hint when enabled.
    pub fn banner(&self) -> Vec<&str> {
        let mut lines = vec![self.tip.as_str()];
        if self.requires_coin {
            lines.push(COIN_HINT);
        }
        lines
    }
}

impl Default for CoachSpec {
    fn default() -> Self {
        Self::new(OverlayKind::None, "Center the car and hold steady")
    }
}

struct CoachRule {
    pattern: Regex,
    spec: CoachSpec,
}

// Wheel rules sit ahead of the side/front/rear rule so that "Left Front Tire"
// resolves to the ring rather than the trapezoid.
static DEFAULT_RULES: LazyLock<Vec<CoachRule>> = LazyLock::new(|| {
    let rule = |pattern: &str, spec: CoachSpec| CoachRule {
        pattern: Regex::new(pattern).unwrap(),
        spec,
    };
    vec![
        rule(
            r"(lf|rf|lr|rr).*corner|3/4|corner",
            CoachSpec::new(OverlayKind::Trapezoid, "Line up bumper and rocker in the window"),
        ),
        rule(
            r"tires|tire|wheel",
            CoachSpec::new(OverlayKind::Ring, "Put the wheel inside the ring • Show tread").with_coin(),
        ),
        rule(
            r"left side|right side|side|front|rear",
            CoachSpec::new(OverlayKind::Trapezoid, "Keep the bottom of the car on the dashed line"),
        ),
        rule(
            r"windshield|dash|interior",
            CoachSpec::new(OverlayKind::Rectangle, "Fill the box • Key on, engine off for dash lights"),
        ),
        rule(
            r"under|leak|ground",
            CoachSpec::new(OverlayKind::Oval, "Aim under the car • Fill the oval as much as possible"),
        ),
        rule(
            r"engine",
            CoachSpec::new(OverlayKind::Rectangle, "Fill the box with the engine bay • Avoid glare"),
        ),
        rule(
            r"vin",
            CoachSpec::new(OverlayKind::Rectangle, "Fill the box with the VIN label"),
        ),
    ]
});

/// Resolves step names to coaching specs.
pub struct CoachResolver {
    custom: Vec<CoachRule>,
    fallback: CoachSpec,
}

impl Default for CoachResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CoachResolver {
    /// Resolver with the built-in rules only.
    pub fn new() -> Self {
        Self {
            custom: Vec::new(),
            fallback: CoachSpec::default(),
        }
    }

    /// Add a rule that is tried before the built-in ones.
    ///
    /// Patterns are matched against the lowercased step name.
    pub fn with_rule(mut self, pattern: &str, spec: CoachSpec) -> Result<Self, regex::Error> {
        self.custom.push(CoachRule {
            pattern: Regex::new(pattern)?,
            spec,
        });
        Ok(self)
    }

    /// Replace the `CoachSpec` used when nothing matches.
    pub fn with_fallback(mut self, spec: CoachSpec) -> Self {
        self.fallback = spec;
        self
    }

    /// Resolve a step name.
    pub fn resolve(&self, step_name: &str) -> CoachSpec {
        let lowered = step_name.to_lowercase();
        self.custom
            .iter()
            .chain(DEFAULT_RULES.iter())
            .find(|rule| rule.pattern.is_match(&lowered))
            .map(|rule| rule.spec.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay_for(step: &str) -> OverlayKind {
        CoachResolver::new().resolve(step).overlay
    }

    #[test]
    fn test_corner_and_side_shots() {
        assert_eq!(overlay_for("Left 3/4 Corner"), OverlayKind::Trapezoid);
        assert_eq!(overlay_for("LF 3/4"), OverlayKind::Trapezoid);
        assert_eq!(overlay_for("Right Side"), OverlayKind::Trapezoid);
        assert_eq!(overlay_for("Front"), OverlayKind::Trapezoid);
        assert_eq!(overlay_for("Rear"), OverlayKind::Trapezoid);
    }

    #[test]
    fn test_wheels_use_ring_with_coin() {
        let resolver = CoachResolver::new();
        for step in ["Left Front Tire", "Right Rear Wheel", "LF Tire"] {
            let spec = resolver.resolve(step);
            assert_eq!(spec.overlay, OverlayKind::Ring, "{step}");
            assert!(spec.requires_coin);
            assert_eq!(spec.banner().last().copied(), Some(COIN_HINT));
        }
    }

    #[test]
    fn test_detail_shots() {
        assert_eq!(overlay_for("Windshield / Dash"), OverlayKind::Rectangle);
        assert_eq!(overlay_for("Engine Bay"), OverlayKind::Rectangle);
        assert_eq!(overlay_for("VIN Plate"), OverlayKind::Rectangle);
        assert_eq!(overlay_for("Under-carriage"), OverlayKind::Oval);
        assert_eq!(overlay_for("Undertray/Leaks"), OverlayKind::Oval);
    }

    #[test]
    fn test_fallback() {
        assert_eq!(overlay_for("Any Extra Damage"), OverlayKind::None);
        assert_eq!(overlay_for("Spare/Trunk"), OverlayKind::None);

        let resolver = CoachResolver::new()
            .with_fallback(CoachSpec::new(OverlayKind::Rectangle, "Fill the box"));
        assert_eq!(resolver.resolve("Spare/Trunk").overlay, OverlayKind::Rectangle);
    }

    #[test]
    fn test_custom_rule_wins() {
        let resolver = CoachResolver::new()
            .with_rule(r"spare", CoachSpec::new(OverlayKind::Ring, "Show the spare"))
            .unwrap();
        assert_eq!(resolver.resolve("Spare/Trunk").overlay, OverlayKind::Ring);
        assert!(CoachResolver::new().with_rule(r"(", CoachSpec::default()).is_err());
    }
}
