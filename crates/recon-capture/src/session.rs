//! Capture session loop.
//!
//! One task owns everything with a lifetime: the video source, the analyzer,
//! the gate, and the single in-flight encode. It multiplexes four inputs:
//!
//! 1. operator commands
//! 2. the next video frame (latest-value; stale frames are skipped)
//! 3. the gate's deadline (dwell end or countdown step)
//! 4. completion of the in-flight encode
//!
//! Leaving a step, retaking or shutting down aborts the encode and invalidates
//! its ticket, so a late artifact can never be delivered for the wrong step.
//!
//! Frame analysis and JPEG encoding both run on the blocking pool. Work for an
//! active step is instrumented with that step's `capture_step` span.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument, Span};
use uuid::Uuid;

use recon_models::{CapturedPhoto, CoachSpec, OverlayKind, PendingArtifact, PreviewHandle};
use recon_vision::{FrameAnalysis, FrameAnalyzer, LevelPolicy};

use crate::config::CaptureConfig;
use crate::error::{CaptureError, CaptureResult};
use crate::gate::{CaptureGate, CaptureTicket, GateAction, GateStatus, Readiness};
use crate::logging::StepLogger;
use crate::metrics;
use crate::orientation::OrientationSubscription;
use crate::pipeline::CapturePipeline;
use crate::source::{SourceGuard, VideoFrame, VideoSourceProvider};

const COMMAND_BUFFER: usize = 16;

/// Operator intent.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Start (or restart) a capture step.
    BeginStep { step_name: String, spec: CoachSpec },
    /// Shutter tap.
    ManualCapture,
    /// Accept the photo under review.
    Keep,
    /// Discard the photo under review.
    Retake,
    /// Try to acquire the video source again after it was unavailable.
    RetrySource,
    /// Abandon the current step and release the camera.
    Leave,
    Shutdown,
}

/// What the UI needs to hear about.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Analysis(FrameAnalysis),
    Gate(GateStatus),
    ReviewReady {
        step_name: String,
        preview: PreviewHandle,
    },
    Delivered(CapturedPhoto),
    CaptureFailed {
        reason: String,
    },
    SourceUnavailable {
        reason: String,
    },
    StepCancelled {
        step_name: String,
    },
}

/// Caller's end of a running session.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: mpsc::Receiver<SessionEvent>,
    task: JoinHandle<CaptureResult<()>>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> CaptureResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CaptureError::SessionClosed)
    }

    /// Next event, or `None` once the session has stopped.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn commands(&self) -> mpsc::Sender<SessionCommand> {
        self.commands.clone()
    }

    /// Stop the session and collect whatever events were still queued.
    pub async fn shutdown(mut self) -> CaptureResult<Vec<SessionEvent>> {
        // A closed channel means the loop already exited.
        let _ = self.commands.send(SessionCommand::Shutdown).await;

        let mut remaining = Vec::new();
        while let Some(event) = self.events.recv().await {
            remaining.push(event);
        }

        self.task.await.map_err(|e| {
            warn!(error = %e, "Session task did not finish cleanly");
            CaptureError::SessionClosed
        })??;
        Ok(remaining)
    }
}

/// A guided capture session over one video source.
pub struct CaptureSession {
    id: Uuid,
    config: CaptureConfig,
    analyzer: FrameAnalyzer,
    pipeline: CapturePipeline,
    provider: Arc<dyn VideoSourceProvider>,
    orientation: OrientationSubscription,
}

impl CaptureSession {
    pub fn new(config: CaptureConfig, provider: Arc<dyn VideoSourceProvider>) -> Self {
        let analyzer = FrameAnalyzer::new(config.analyzer.clone())
            .with_level(config.level, LevelPolicy::default());
        let pipeline = CapturePipeline::new(config.pipeline.clone());
        Self {
            id: Uuid::new_v4(),
            config,
            analyzer,
            pipeline,
            provider,
            orientation: OrientationSubscription::detached(),
        }
    }

    pub fn with_orientation(mut self, orientation: OrientationSubscription) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_analyzer(mut self, analyzer: FrameAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Run the session on its own task.
    pub fn spawn(self) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let task = tokio::spawn(self.run(command_rx, event_tx));
        SessionHandle {
            commands: command_tx,
            events: event_rx,
            task,
        }
    }

    /// Drive the session until `Shutdown` or until every command sender is gone.
    pub async fn run(
        self,
        mut commands: mpsc::Receiver<SessionCommand>,
        events: mpsc::Sender<SessionEvent>,
    ) -> CaptureResult<()> {
        info!(
            session_id = %self.id,
            detector = self.analyzer.detector_name(),
            dwell_ms = self.config.gate.dwell.as_millis() as u64,
            countdown_policy = %self.config.gate.countdown_policy,
            manual_policy = %self.config.gate.manual_policy,
            "Capture session started"
        );

        let mut state = SessionLoop {
            id: self.id,
            gate: CaptureGate::new(self.config.gate.clone()),
            analyzer: Arc::new(self.analyzer),
            pipeline: self.pipeline,
            provider: self.provider,
            orientation: self.orientation,
            events,
            step: None,
            source: None,
            in_flight: None,
            last_seq: None,
        };

        loop {
            let deadline = state.gate.next_deadline();
            let span = state.step_span();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => state.handle_command(command).instrument(span).await,
                },
                frame = next_frame(&mut state.source) => {
                    state.handle_frame(frame).instrument(span).await
                }
                _ = sleep_until(deadline) => {
                    let action = state.gate.poll_timer(Instant::now());
                    state.apply(action).instrument(span).await;
                }
                (ticket, joined) = join_capture(&mut state.in_flight) => {
                    state.in_flight = None;
                    state.handle_capture(ticket, joined).instrument(span).await;
                }
            }
        }

        state.close();
        info!(session_id = %self.id, "Capture session stopped");
        Ok(())
    }
}

struct ActiveStep {
    name: String,
    spec: CoachSpec,
    logger: StepLogger,
    span: Span,
}

struct InFlight {
    ticket: CaptureTicket,
    task: JoinHandle<CaptureResult<PendingArtifact>>,
}

struct SessionLoop {
    id: Uuid,
    gate: CaptureGate,
    analyzer: Arc<FrameAnalyzer>,
    pipeline: CapturePipeline,
    provider: Arc<dyn VideoSourceProvider>,
    orientation: OrientationSubscription,
    events: mpsc::Sender<SessionEvent>,
    step: Option<ActiveStep>,
    source: Option<SourceGuard>,
    in_flight: Option<InFlight>,
    last_seq: Option<u64>,
}

impl SessionLoop {
    fn step_span(&self) -> Span {
        self.step
            .as_ref()
            .map(|step| step.span.clone())
            .unwrap_or_else(Span::none)
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::BeginStep { step_name, spec } => {
                self.cancel_step().await;
                let _ = self.gate.reset(spec.overlay);

                let logger = StepLogger::new(&self.id, &step_name);
                let span = logger.create_span();
                span.in_scope(|| logger.log_start(&format!("overlay {}", spec.overlay)));
                self.step = Some(ActiveStep {
                    name: step_name,
                    spec,
                    logger,
                    span,
                });

                self.ensure_source().await;
                self.emit_status().await;
            }
            SessionCommand::ManualCapture => {
                if self.step.is_none() {
                    debug!(session_id = %self.id, "Manual capture without an active step");
                    return;
                }
                let action = self.gate.manual_trigger(Instant::now());
                self.apply(action).await;
            }
            SessionCommand::Keep => {
                let Some(artifact) = self.gate.keep() else {
                    debug!(session_id = %self.id, "Keep without a photo under review");
                    return;
                };
                let photo = artifact.confirm();
                if let Some(step) = self.step.take() {
                    metrics::record_capture(step.spec.overlay.as_str());
                    step.logger.log_completion(&photo.file_name());
                }
                self.emit(SessionEvent::Delivered(photo)).await;
                self.emit_status().await;
            }
            SessionCommand::Retake => {
                if self.gate.retake() {
                    if let Some(step) = &self.step {
                        step.logger.log_progress("retake");
                    }
                    self.drop_stale_capture();
                    self.emit_status().await;
                }
            }
            SessionCommand::RetrySource => {
                self.ensure_source().await;
                self.emit_status().await;
            }
            SessionCommand::Leave => {
                self.cancel_step().await;
                let _ = self.gate.reset(OverlayKind::None);
                self.release_source();
                let _ = self.gate.set_source_ready(false);
                self.emit_status().await;
            }
            // Handled by the loop.
            SessionCommand::Shutdown => {}
        }
    }

    async fn handle_frame(&mut self, frame: CaptureResult<VideoFrame>) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                self.lose_source(&e).await;
                return;
            }
        };

        if let Some(last) = self.last_seq {
            if frame.seq > last + 1 {
                let dropped = frame.seq - last - 1;
                metrics::record_frames_dropped(dropped);
                debug!(session_id = %self.id, dropped = dropped, "Analysis fell behind, frames skipped");
            }
        }
        self.last_seq = Some(frame.seq);

        let overlay = match &self.step {
            Some(step) => step.spec.overlay,
            None => return,
        };

        let seq = frame.seq;
        let roll = self.orientation.roll_degrees();
        let analysis = match self.analyze(frame, overlay, roll).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(session_id = %self.id, seq = seq, error = %e, "Frame analysis failed, skipping tick");
                return;
            }
        };
        metrics::record_frame_analyzed(overlay.as_str());

        let readiness = Readiness::from(&analysis);
        self.emit_lossy(SessionEvent::Analysis(analysis));

        let action = self.gate.tick(Instant::now(), readiness);
        self.apply(action).await;
    }

    async fn analyze(
        &self,
        frame: VideoFrame,
        overlay: OverlayKind,
        roll: Option<f64>,
    ) -> CaptureResult<FrameAnalysis> {
        let analyzer = Arc::clone(&self.analyzer);
        let analysis = tokio::task::spawn_blocking(move || {
            analyzer.analyze_full(&frame.image, overlay, roll)
        })
        .await??;
        Ok(analysis)
    }

    async fn handle_capture(
        &mut self,
        ticket: CaptureTicket,
        joined: Result<CaptureResult<PendingArtifact>, JoinError>,
    ) {
        match joined {
            Ok(Ok(artifact)) => {
                let step_name = artifact.step_name.clone();
                let preview = artifact.preview.clone();
                if self.gate.capture_completed(ticket, artifact) {
                    if let Some(step) = &self.step {
                        step.logger.log_progress("photo ready for review");
                    }
                    self.emit(SessionEvent::ReviewReady { step_name, preview }).await;
                    self.emit_status().await;
                }
            }
            Ok(Err(e)) => self.fail_capture(ticket, e.to_string()).await,
            Err(e) if e.is_cancelled() => {
                debug!(session_id = %self.id, ticket = %ticket, "Encode task cancelled");
            }
            Err(e) => {
                let reason = CaptureError::from(e).to_string();
                if let Some(step) = &self.step {
                    step.logger.log_error(&reason);
                }
                self.fail_capture(ticket, reason).await
            }
        }
    }

    async fn apply(&mut self, action: GateAction) {
        match action {
            GateAction::Unchanged => {}
            GateAction::Changed => self.emit_status().await,
            GateAction::Fire(ticket) => {
                self.emit_status().await;
                self.start_capture(ticket).await;
            }
        }
    }

    async fn start_capture(&mut self, ticket: CaptureTicket) {
        let Some(step_name) = self.step.as_ref().map(|step| step.name.clone()) else {
            let _ = self.gate.capture_failed(ticket);
            return;
        };

        let snapshot = match self.source.as_mut() {
            Some(source) => source.snapshot().await,
            None => Err(CaptureError::SourceClosed),
        };

        match snapshot {
            Ok(image) => {
                debug!(
                    session_id = %self.id,
                    ticket = %ticket,
                    width = image.width(),
                    height = image.height(),
                    "Encoding snapshot"
                );
                let task = self.pipeline.spawn(step_name, image);
                self.in_flight = Some(InFlight { ticket, task });
            }
            Err(e) => self.fail_capture(ticket, e.to_string()).await,
        }
    }

    async fn fail_capture(&mut self, ticket: CaptureTicket, reason: String) {
        if !self.gate.capture_failed(ticket) {
            return;
        }
        metrics::record_capture_failure(&reason);
        if let Some(step) = &self.step {
            step.logger.log_warning(&format!("capture failed: {}", reason));
        }
        self.emit(SessionEvent::CaptureFailed { reason }).await;
        self.emit_status().await;
    }

    /// Abandon the active step, telling the UI if it had not been delivered.
    async fn cancel_step(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.task.abort();
        }
        if let Some(step) = self.step.take() {
            step.logger.log_warning("cancelled before delivery");
            self.emit(SessionEvent::StepCancelled {
                step_name: step.name,
            })
            .await;
        }
    }

    /// Abort the encode if the gate no longer expects its ticket.
    fn drop_stale_capture(&mut self) {
        let live = self.gate.live_ticket();
        if self.in_flight.as_ref().is_some_and(|f| Some(f.ticket) != live) {
            if let Some(in_flight) = self.in_flight.take() {
                debug!(session_id = %self.id, ticket = %in_flight.ticket, "Aborting stale encode");
                in_flight.task.abort();
            }
        }
    }

    async fn ensure_source(&mut self) {
        if self.source.is_some() {
            return;
        }
        match self.provider.acquire().await {
            Ok(source) => {
                info!(session_id = %self.id, "Video source acquired");
                self.source = Some(SourceGuard::new(source));
                self.last_seq = None;
                let _ = self.gate.set_source_ready(true);
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Video source unavailable");
                let _ = self.gate.set_source_ready(false);
                self.emit(SessionEvent::SourceUnavailable {
                    reason: unavailable_reason(e),
                })
                .await;
            }
        }
    }

    async fn lose_source(&mut self, error: &CaptureError) {
        warn!(session_id = %self.id, error = %error, "Video source lost");
        self.release_source();
        let _ = self.gate.set_source_ready(false);
        self.emit(SessionEvent::SourceUnavailable {
            reason: error.to_string(),
        })
        .await;
        self.emit_status().await;
    }

    fn release_source(&mut self) {
        if let Some(mut guard) = self.source.take() {
            guard.release();
            info!(session_id = %self.id, "Video source released");
        }
        self.last_seq = None;
    }

    fn close(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.task.abort();
        }
        self.step = None;
        self.release_source();
    }

    async fn emit_status(&self) {
        self.emit(SessionEvent::Gate(self.gate.status())).await;
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            debug!(session_id = %self.id, "Event receiver dropped");
        }
    }

    /// Per-frame events are dropped rather than stalling the loop.
    fn emit_lossy(&self, event: SessionEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.events.try_send(event) {
            debug!(session_id = %self.id, "Event buffer full, analysis event dropped");
        }
    }
}

fn unavailable_reason(error: CaptureError) -> String {
    match error {
        CaptureError::SourceUnavailable { reason } => reason,
        other => other.to_string(),
    }
}

async fn next_frame(source: &mut Option<SourceGuard>) -> CaptureResult<VideoFrame> {
    match source {
        Some(source) => source.next_frame().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn join_capture(
    in_flight: &mut Option<InFlight>,
) -> (CaptureTicket, Result<CaptureResult<PendingArtifact>, JoinError>) {
    match in_flight {
        Some(in_flight) => {
            let joined = (&mut in_flight.task).await;
            (in_flight.ticket, joined)
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManualCapturePolicy;
    use crate::source::FramePublisher;

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_run_future_is_send() {
        let (_commands, command_rx) = mpsc::channel(1);
        let (event_tx, _events) = mpsc::channel(1);
        let session = CaptureSession::new(CaptureConfig::default(), Arc::new(FramePublisher::new()));
        let run = session.run(command_rx, event_tx);
        assert_send(&run);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SessionEvent::StepCancelled {
            step_name: "Front".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "step_cancelled");
        assert_eq!(json["step_name"], "Front");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_source_then_retry() {
        let publisher = FramePublisher::new();
        publisher.set_available(false);
        let session = CaptureSession::new(CaptureConfig::default(), Arc::new(publisher.clone()));
        let mut handle = session.spawn();

        handle
            .send(SessionCommand::BeginStep {
                step_name: "Front".to_string(),
                spec: CoachSpec::new(OverlayKind::Trapezoid, "Center the car"),
            })
            .await
            .unwrap();

        match handle.next_event().await {
            Some(SessionEvent::SourceUnavailable { reason }) => {
                assert_eq!(reason, "Camera not available")
            }
            other => panic!("expected source unavailable, got {other:?}"),
        }
        match handle.next_event().await {
            Some(SessionEvent::Gate(status)) => assert!(!status.control_enabled),
            other => panic!("expected gate status, got {other:?}"),
        }

        publisher.set_available(true);
        handle.send(SessionCommand::RetrySource).await.unwrap();
        match handle.next_event().await {
            Some(SessionEvent::Gate(status)) => assert_eq!(status.overlay, OverlayKind::Trapezoid),
            other => panic!("expected gate status, got {other:?}"),
        }
        assert_eq!(publisher.active_sources(), 1);

        handle.shutdown().await.unwrap();
        assert_eq!(publisher.acquire_count(), 1);
        assert_eq!(publisher.release_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_releases_source() {
        let publisher = FramePublisher::new();
        let mut handle =
            CaptureSession::new(CaptureConfig::default(), Arc::new(publisher.clone())).spawn();

        handle
            .send(SessionCommand::BeginStep {
                step_name: "VIN".to_string(),
                spec: CoachSpec::new(OverlayKind::Rectangle, "Fill the box with the label"),
            })
            .await
            .unwrap();
        handle.send(SessionCommand::Leave).await.unwrap();

        let mut cancelled = false;
        while let Some(event) = handle.next_event().await {
            if let SessionEvent::StepCancelled { step_name } = &event {
                assert_eq!(step_name, "VIN");
                cancelled = true;
            }
            if cancelled && matches!(event, SessionEvent::Gate(_)) {
                break;
            }
        }
        assert!(cancelled);
        assert_eq!(publisher.active_sources(), 0);

        handle.shutdown().await.unwrap();
        assert_eq!(publisher.release_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_disables_forced_control() {
        let publisher = FramePublisher::new();
        let mut config = CaptureConfig::default();
        config.gate.manual_policy = ManualCapturePolicy::ForceCountdown;
        let mut handle = CaptureSession::new(config, Arc::new(publisher.clone())).spawn();

        handle
            .send(SessionCommand::BeginStep {
                step_name: "Front".to_string(),
                spec: CoachSpec::new(OverlayKind::Trapezoid, "Center the car"),
            })
            .await
            .unwrap();
        match handle.next_event().await {
            Some(SessionEvent::Gate(status)) => assert!(status.control_enabled),
            other => panic!("expected gate status, got {other:?}"),
        }

        handle.send(SessionCommand::Leave).await.unwrap();
        loop {
            match handle.next_event().await {
                Some(SessionEvent::Gate(status)) => {
                    assert!(!status.control_enabled);
                    break;
                }
                Some(SessionEvent::StepCancelled { .. }) => {}
                other => panic!("unexpected event: {other:?}"),
            }
        }

        // A tap with no camera held does nothing.
        handle.send(SessionCommand::ManualCapture).await.unwrap();
        let remaining = handle.shutdown().await.unwrap();
        assert!(remaining.is_empty(), "unexpected events: {remaining:?}");
        assert_eq!(publisher.active_sources(), 0);
    }
}
