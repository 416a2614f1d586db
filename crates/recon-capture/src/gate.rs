//! Capture gate state machine.
//!
//! The gate decides when the shutter fires. It is purely synchronous: every
//! transition takes the current `Instant` from the caller, and the gate owns at
//! most one deadline at a time (`next_deadline`). The session loop sleeps on
//! that deadline and calls `poll_timer` when it passes.
//!
//! ```text
//! Idle ──all-green──▶ Dwelling ──dwell elapsed──▶ CountingDown(3..1) ──0──▶ Capturing
//!  ▲                    │                              │                      │
//!  └──── not green ─────┘◀──── recheck failed ─────────┘     encode done ──▶ Reviewing
//!  ▲                                                                          │
//!  └──────────────────────────────── keep / retake ───────────────────────────┘
//! ```
//!
//! Oval overlays never auto-capture: a manual tap goes straight from `Idle` to
//! `Capturing` once the under-carriage coverage check passes.

use std::fmt;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use recon_models::{OverlayKind, PendingArtifact};
use recon_vision::FrameAnalysis;

use crate::config::{CountdownPolicy, GateConfig, ManualCapturePolicy};

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

/// Identifies one shutter release. A completion carrying any other ticket is
/// stale and gets dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CaptureTicket(u64);

impl CaptureTicket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CaptureTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the latest frame says about capturing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    /// Every quality signal and the subject check passed.
    pub all_green: bool,
    /// Manual capture may be offered. Equals `all_green` except on the oval,
    /// where it follows the coverage check.
    pub control_enabled: bool,
}

impl Readiness {
    pub fn new(all_green: bool, control_enabled: bool) -> Self {
        Self {
            all_green,
            control_enabled,
        }
    }

    /// Readiness where both signals agree.
    pub fn green(all_green: bool) -> Self {
        Self::new(all_green, all_green)
    }
}

impl From<&FrameAnalysis> for Readiness {
    fn from(analysis: &FrameAnalysis) -> Self {
        let all_green = analysis.all_green();
        match analysis.overlay {
            OverlayKind::Oval => Self::new(all_green, analysis.subject.coverage_ok),
            _ => Self::green(all_green),
        }
    }
}

#[derive(Debug, Clone)]
pub enum GateState {
    Idle,
    Dwelling {
        since: Instant,
    },
    CountingDown {
        remaining: u32,
        next_step_at: Instant,
        /// Started by a forced manual tap; runs to zero regardless of sensors.
        forced: bool,
    },
    Capturing {
        ticket: CaptureTicket,
    },
    Reviewing {
        artifact: PendingArtifact,
    },
}

impl GateState {
    pub fn phase(&self) -> GatePhase {
        match self {
            Self::Idle => GatePhase::Idle,
            Self::Dwelling { .. } => GatePhase::Dwelling,
            Self::CountingDown { .. } => GatePhase::CountingDown,
            Self::Capturing { .. } => GatePhase::Capturing,
            Self::Reviewing { .. } => GatePhase::Reviewing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GatePhase {
    Idle,
    Dwelling,
    CountingDown,
    Capturing,
    Reviewing,
}

/// UI-facing snapshot of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GateStatus {
    pub phase: GatePhase,
    pub overlay: OverlayKind,
    /// Seconds left while counting down.
    pub countdown: Option<u32>,
    /// Whether the manual shutter button should be enabled.
    pub control_enabled: bool,
    /// Whether the gate will release the shutter on its own.
    pub auto_capture: bool,
}

/// Outcome of feeding the gate an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum GateAction {
    Unchanged,
    /// Status changed; tell the UI.
    Changed,
    /// Take a snapshot now and report back with this ticket.
    Fire(CaptureTicket),
}

/// Capture gate for one step at a time.
#[derive(Debug)]
pub struct CaptureGate {
    config: GateConfig,
    overlay: OverlayKind,
    state: GateState,
    last: Readiness,
    source_ready: bool,
    next_ticket: u64,
}

impl CaptureGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            overlay: OverlayKind::None,
            state: GateState::Idle,
            last: Readiness::default(),
            source_ready: true,
            next_ticket: 1,
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn overlay(&self) -> OverlayKind {
        self.overlay
    }

    /// Ticket of the capture in flight, if any.
    pub fn live_ticket(&self) -> Option<CaptureTicket> {
        match self.state {
            GateState::Capturing { ticket } => Some(ticket),
            _ => None,
        }
    }

    /// The artifact under review.
    pub fn pending(&self) -> Option<&PendingArtifact> {
        match &self.state {
            GateState::Reviewing { artifact } => Some(artifact),
            _ => None,
        }
    }

    pub fn status(&self) -> GateStatus {
        let countdown = match self.state {
            GateState::CountingDown { remaining, .. } => Some(remaining),
            _ => None,
        };
        GateStatus {
            phase: self.state.phase(),
            overlay: self.overlay,
            countdown,
            control_enabled: self.control_enabled(),
            auto_capture: self.overlay.auto_capture(),
        }
    }

    /// Whether `manual_trigger` would do anything right now.
    pub fn control_enabled(&self) -> bool {
        if !self.source_ready {
            return false;
        }
        match self.state {
            GateState::Idle | GateState::Dwelling { .. } => {
                if !self.overlay.auto_capture() {
                    self.last.control_enabled
                } else {
                    match self.config.manual_policy {
                        ManualCapturePolicy::RequireReadiness => self.last.all_green,
                        ManualCapturePolicy::ForceCountdown => true,
                    }
                }
            }
            _ => false,
        }
    }

    /// The single deadline the gate is waiting on.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            GateState::Dwelling { since } => Some(since + self.config.dwell),
            GateState::CountingDown { next_step_at, .. } => Some(next_step_at),
            _ => None,
        }
    }

    /// Mark the video source as usable or not. Without a source the gate
    /// drops back to idle and disables the manual control.
    pub fn set_source_ready(&mut self, ready: bool) -> GateAction {
        let before = self.status();
        self.source_ready = ready;
        if !ready {
            self.last = Readiness::default();
            if matches!(
                self.state,
                GateState::Dwelling { .. } | GateState::CountingDown { .. }
            ) {
                self.state = GateState::Idle;
            }
        }
        self.changed_since(before)
    }

    /// Feed the readiness of the latest analyzed frame.
    pub fn tick(&mut self, now: Instant, readiness: Readiness) -> GateAction {
        let before = self.status();
        self.last = readiness;

        match self.state {
            GateState::Idle => {
                if self.overlay.auto_capture() && readiness.all_green && self.source_ready {
                    debug!(overlay = %self.overlay, "Frame all-green, dwelling");
                    self.state = GateState::Dwelling { since: now };
                }
            }
            GateState::Dwelling { since } => {
                if !readiness.all_green {
                    debug!(overlay = %self.overlay, "Frame dropped out of green during dwell");
                    self.state = GateState::Idle;
                } else if now.saturating_duration_since(since) >= self.config.dwell {
                    if let Some(ticket) = self.start_countdown(now, false) {
                        return GateAction::Fire(ticket);
                    }
                }
            }
            // Countdown is rechecked at its own boundaries; capture and review
            // ignore sensors entirely.
            GateState::CountingDown { .. }
            | GateState::Capturing { .. }
            | GateState::Reviewing { .. } => {}
        }

        self.changed_since(before)
    }

    /// Advance timers. Call when `next_deadline` has passed.
    pub fn poll_timer(&mut self, now: Instant) -> GateAction {
        let before = self.status();

        match self.state {
            GateState::Dwelling { since } if now >= since + self.config.dwell => {
                if self.last.all_green {
                    if let Some(ticket) = self.start_countdown(now, false) {
                        return GateAction::Fire(ticket);
                    }
                } else {
                    self.state = GateState::Idle;
                }
            }
            GateState::CountingDown {
                remaining,
                next_step_at,
                forced,
            } if now >= next_step_at => {
                let recheck = !forced && self.config.countdown_policy == CountdownPolicy::Recheck;
                if recheck && !self.last.all_green {
                    debug!(
                        overlay = %self.overlay,
                        remaining = remaining,
                        "Countdown aborted, frame no longer all-green"
                    );
                    self.state = GateState::Idle;
                } else if remaining <= 1 {
                    return GateAction::Fire(self.fire());
                } else {
                    self.state = GateState::CountingDown {
                        remaining: remaining - 1,
                        next_step_at: next_step_at + COUNTDOWN_STEP,
                        forced,
                    };
                }
            }
            _ => {}
        }

        self.changed_since(before)
    }

    /// Operator tapped the shutter.
    ///
    /// On auto overlays this skips the dwell but never the countdown. On the
    /// oval it fires immediately once coverage passes. A no-op while a
    /// countdown, capture or review is already under way.
    ///
    /// Under `ForceCountdown` the countdown it starts is never rechecked.
    pub fn manual_trigger(&mut self, now: Instant) -> GateAction {
        if !self.control_enabled() {
            debug!(
                overlay = %self.overlay,
                phase = ?self.state.phase(),
                "Manual capture ignored"
            );
            return GateAction::Unchanged;
        }

        if !self.overlay.auto_capture() {
            return GateAction::Fire(self.fire());
        }

        let forced = self.config.manual_policy == ManualCapturePolicy::ForceCountdown;
        match self.start_countdown(now, forced) {
            Some(ticket) => GateAction::Fire(ticket),
            None => GateAction::Changed,
        }
    }

    /// The encode for `ticket` finished. Returns `false` if the artifact is
    /// stale, in which case it has been dropped.
    pub fn capture_completed(&mut self, ticket: CaptureTicket, artifact: PendingArtifact) -> bool {
        if self.live_ticket() != Some(ticket) {
            debug!(ticket = %ticket, "Discarding stale capture");
            return false;
        }
        self.state = GateState::Reviewing { artifact };
        true
    }

    /// The encode for `ticket` failed. Returns `false` if the ticket is stale.
    pub fn capture_failed(&mut self, ticket: CaptureTicket) -> bool {
        if self.live_ticket() != Some(ticket) {
            return false;
        }
        self.state = GateState::Idle;
        true
    }

    /// Accept the artifact under review.
    pub fn keep(&mut self) -> Option<PendingArtifact> {
        if !matches!(self.state, GateState::Reviewing { .. }) {
            return None;
        }
        match std::mem::replace(&mut self.state, GateState::Idle) {
            GateState::Reviewing { artifact } => Some(artifact),
            _ => None,
        }
    }

    /// Throw away the artifact under review, or abandon a capture in flight.
    pub fn retake(&mut self) -> bool {
        match self.state {
            GateState::Reviewing { .. } | GateState::Capturing { .. } => {
                self.state = GateState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Start over for a new step. Returns the ticket that was in flight so the
    /// caller can abort its encode.
    pub fn reset(&mut self, overlay: OverlayKind) -> Option<CaptureTicket> {
        let in_flight = self.live_ticket();
        self.overlay = overlay;
        self.state = GateState::Idle;
        self.last = Readiness::default();
        in_flight
    }

    fn start_countdown(&mut self, now: Instant, forced: bool) -> Option<CaptureTicket> {
        if self.config.countdown_secs == 0 {
            return Some(self.fire());
        }
        debug!(
            overlay = %self.overlay,
            seconds = self.config.countdown_secs,
            forced = forced,
            "Countdown started"
        );
        self.state = GateState::CountingDown {
            remaining: self.config.countdown_secs,
            next_step_at: now + COUNTDOWN_STEP,
            forced,
        };
        None
    }

    fn fire(&mut self) -> CaptureTicket {
        let ticket = CaptureTicket(self.next_ticket);
        self.next_ticket += 1;
        self.state = GateState::Capturing { ticket };
        debug!(overlay = %self.overlay, ticket = %ticket, "Shutter released");
        ticket
    }

    fn changed_since(&self, before: GateStatus) -> GateAction {
        if self.status() == before {
            GateAction::Unchanged
        } else {
            GateAction::Changed
        }
    }
}
