//! Capture configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use recon_vision::{AnalyzerConfig, LevelSensor};

use crate::error::CaptureError;

/// What the countdown does when the frame stops being all-green.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CountdownPolicy {
    /// Check the latest frame at every one-second boundary and abort to idle
    /// if it is no longer all-green.
    #[default]
    Recheck,
    /// Once started, the countdown always fires.
    Committed,
}

/// What a manual shutter tap requires on auto-capture overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ManualCapturePolicy {
    /// The tap only skips the dwell; the frame must already be all-green.
    #[default]
    RequireReadiness,
    /// The tap always starts the countdown.
    ForceCountdown,
}

impl CountdownPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recheck => "recheck",
            Self::Committed => "committed",
        }
    }
}

impl ManualCapturePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequireReadiness => "require_readiness",
            Self::ForceCountdown => "force_countdown",
        }
    }
}

impl fmt::Display for CountdownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ManualCapturePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountdownPolicy {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "recheck" => Ok(Self::Recheck),
            "committed" => Ok(Self::Committed),
            other => Err(CaptureError::config_error(format!(
                "Unknown countdown policy: {}",
                other
            ))),
        }
    }
}

impl FromStr for ManualCapturePolicy {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "require_readiness" => Ok(Self::RequireReadiness),
            "force_countdown" => Ok(Self::ForceCountdown),
            other => Err(CaptureError::config_error(format!(
                "Unknown manual capture policy: {}",
                other
            ))),
        }
    }
}

/// Timing and policy for the capture gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// How long the frame must stay all-green before the countdown starts
    pub dwell: Duration,
    /// Countdown length in whole seconds
    pub countdown_secs: u32,
    pub countdown_policy: CountdownPolicy,
    pub manual_policy: ManualCapturePolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            dwell: Duration::from_millis(800),
            countdown_secs: 3,
            countdown_policy: CountdownPolicy::default(),
            manual_policy: ManualCapturePolicy::default(),
        }
    }
}

/// Encoding parameters for the snapshot pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// JPEG quality for the full-resolution image (1-100)
    pub jpeg_quality: u8,
    /// Preview images are downscaled to at most this width
    pub preview_max_width: u32,
    /// JPEG quality for the preview (1-100)
    pub preview_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 92,
            preview_max_width: 480,
            preview_quality: 90,
        }
    }
}

/// Full capture session configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub gate: GateConfig,
    pub pipeline: PipelineConfig,
    pub analyzer: AnalyzerConfig,
    pub level: LevelSensor,
    /// Capacity of the session event channel
    pub event_buffer: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            pipeline: PipelineConfig::default(),
            analyzer: AnalyzerConfig::default(),
            level: LevelSensor::default(),
            event_buffer: 64,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl CaptureConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let gate = GateConfig {
            dwell: env_parse("RECON_DWELL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.gate.dwell),
            countdown_secs: env_parse("RECON_COUNTDOWN_SECS").unwrap_or(defaults.gate.countdown_secs),
            countdown_policy: env_parse("RECON_COUNTDOWN_POLICY")
                .unwrap_or(defaults.gate.countdown_policy),
            manual_policy: env_parse("RECON_MANUAL_POLICY").unwrap_or(defaults.gate.manual_policy),
        };

        let pipeline = PipelineConfig {
            jpeg_quality: env_parse::<u8>("RECON_JPEG_QUALITY")
                .unwrap_or(defaults.pipeline.jpeg_quality)
                .clamp(1, 100),
            preview_max_width: env_parse("RECON_PREVIEW_MAX_WIDTH")
                .filter(|w: &u32| *w > 0)
                .unwrap_or(defaults.pipeline.preview_max_width),
            preview_quality: env_parse::<u8>("RECON_PREVIEW_QUALITY")
                .unwrap_or(defaults.pipeline.preview_quality)
                .clamp(1, 100),
        };

        let mut analyzer = defaults.analyzer;
        if let Some(width) = env_parse::<u32>("RECON_ANALYSIS_WIDTH").filter(|w| *w >= 3) {
            analyzer.analysis_width = width;
        }
        if let Some(threshold) = env_parse("RECON_SHARPNESS_THRESHOLD") {
            analyzer.sharpness_threshold = threshold;
        }
        analyzer.model_path = std::env::var("RECON_MODEL_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let level = env_parse("RECON_MAX_ROLL_DEGREES")
            .map(LevelSensor::new)
            .unwrap_or(defaults.level);

        Self {
            gate,
            pipeline,
            analyzer,
            level,
            event_buffer: env_parse("RECON_EVENT_BUFFER")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.event_buffer),
        }
    }
}
