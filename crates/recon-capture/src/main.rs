//! Replays still images through a capture session.
//!
//! Usage: `capture-replay <input-dir> <output-dir>`
//!
//! Images in the input directory are matched to the default capture steps in
//! file-name order. Each image is fed to the session as a live video stream
//! until the step captures, and kept photos are written to the output
//! directory along with a `manifest.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::RgbImage;
use tokio::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use recon_capture::{
    CaptureConfig, CaptureSession, FramePublisher, GatePhase, SessionCommand, SessionEvent,
    SessionHandle,
};
use recon_models::{CaptureSequence, CapturedPhoto, CoachResolver};

const FRAME_INTERVAL: Duration = Duration::from_millis(100);
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("recon=info".parse().unwrap())
        .add_directive("ort=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    if let Err(e) = run().await {
        error!("Replay failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(input_dir), Some(output_dir)) = (args.next(), args.next()) else {
        bail!("usage: capture-replay <input-dir> <output-dir>");
    };
    let input_dir = PathBuf::from(input_dir);
    let output_dir = PathBuf::from(output_dir);

    let config = CaptureConfig::from_env();
    let step_timeout = Duration::from_secs(
        std::env::var("RECON_REPLAY_STEP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(15),
    );
    info!("Capture config: {:?}", config);

    let images = list_images(&input_dir)?;
    if images.is_empty() {
        bail!("no images found in {}", input_dir.display());
    }
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let publisher = FramePublisher::new();
    let session = CaptureSession::new(config, Arc::new(publisher.clone()));
    info!(session_id = %session.id(), images = images.len(), "Starting replay");
    let mut handle = session.spawn();

    let resolver = CoachResolver::new();
    let mut sequence = CaptureSequence::default();
    let mut images = images.into_iter();

    while !sequence.is_complete() {
        let Some(step_name) = sequence.current_step().map(str::to_string) else {
            break;
        };
        let Some(path) = images.next() else {
            info!("Out of images, stopping at step '{}'", step_name);
            break;
        };
        let frame = image::open(&path)
            .with_context(|| format!("decoding {}", path.display()))?
            .to_rgb8();
        let spec = resolver.resolve(&step_name);

        handle
            .send(SessionCommand::BeginStep {
                step_name: step_name.clone(),
                spec,
            })
            .await?;

        let photo = replay_step(&mut handle, &publisher, frame, step_timeout).await?;
        match &photo {
            Some(photo) => {
                let target = output_dir.join(photo.file_name());
                tokio::fs::write(&target, &photo.image_bytes)
                    .await
                    .with_context(|| format!("writing {}", target.display()))?;
                info!(step = %step_name, path = %target.display(), "Photo kept");
            }
            None => {
                warn!(step = %step_name, image = %path.display(), "Step timed out, skipping");
            }
        }
        if !advance(&mut sequence, photo) {
            break;
        }
    }

    write_manifest(&output_dir, sequence.photos()).await?;
    let progress = sequence.progress();
    info!(
        saved = progress.saved,
        total = progress.total,
        complete = progress.complete,
        "Replay finished"
    );

    handle.shutdown().await?;
    Ok(())
}

/// Feed one image as a video stream until the step delivers or times out.
async fn replay_step(
    handle: &mut SessionHandle,
    publisher: &FramePublisher,
    frame: RgbImage,
    timeout: Duration,
) -> Result<Option<CapturedPhoto>> {
    let deadline = Instant::now() + timeout;
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                publisher.publish(frame.clone());
            }
            event = handle.next_event() => match event {
                Some(SessionEvent::Gate(status)) => {
                    // Manual-only overlays need a tap once coverage passes.
                    if !status.auto_capture && status.control_enabled && status.phase == GatePhase::Idle {
                        handle.send(SessionCommand::ManualCapture).await?;
                    }
                }
                Some(SessionEvent::ReviewReady { step_name, preview }) => {
                    info!(
                        step = %step_name,
                        preview_width = preview.width,
                        preview_height = preview.height,
                        "Review ready, keeping"
                    );
                    handle.send(SessionCommand::Keep).await?;
                }
                Some(SessionEvent::Delivered(photo)) => return Ok(Some(photo)),
                Some(SessionEvent::CaptureFailed { reason }) => {
                    warn!(reason = %reason, "Capture failed, waiting for the next attempt");
                }
                Some(SessionEvent::SourceUnavailable { reason }) => {
                    bail!("video source unavailable: {}", reason);
                }
                Some(SessionEvent::Analysis(_)) | Some(SessionEvent::StepCancelled { .. }) => {}
                None => bail!("capture session ended unexpectedly"),
            },
        }
    }
}

/// Record the outcome of one step. Returns false when no step is left to replay.
fn advance(sequence: &mut CaptureSequence, photo: Option<CapturedPhoto>) -> bool {
    match photo {
        Some(photo) => sequence.record(photo),
        None => {
            if !sequence.skip() {
                return false;
            }
        }
    }
    !sequence.is_complete()
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    images.sort();
    Ok(images)
}

async fn write_manifest(dir: &Path, photos: &[CapturedPhoto]) -> Result<()> {
    let manifest = serde_json::to_vec_pretty(photos)?;
    let path = dir.join("manifest.json");
    tokio::fs::write(&path, manifest)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recon_models::PreviewHandle;
    use uuid::Uuid;

    fn photo(step: &str) -> CapturedPhoto {
        CapturedPhoto {
            id: Uuid::new_v4(),
            step_name: step.to_string(),
            image_bytes: vec![0xFF, 0xD8],
            preview: PreviewHandle::new(1, 1, vec![0xFF, 0xD8]),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_advance_stops_after_last_step() {
        let mut sequence = CaptureSequence::new(vec!["Any Extra Damage".into()]);

        // More images than steps: only the first one may be kept.
        let mut replayed = 0;
        for _ in 0..5 {
            let step = sequence.current_step().unwrap().to_string();
            replayed += 1;
            if !advance(&mut sequence, Some(photo(&step))) {
                break;
            }
        }
        assert_eq!(replayed, 1);
        assert_eq!(sequence.photos().len(), 1);
        assert!(sequence.is_complete());
    }

    #[test]
    fn test_advance_skips_timeouts_until_last_step() {
        let mut sequence = CaptureSequence::new(vec!["Front".into(), "Rear".into()]);
        assert!(advance(&mut sequence, None));
        assert_eq!(sequence.current_step(), Some("Rear"));
        assert!(!advance(&mut sequence, None));
        assert!(sequence.photos().is_empty());
    }

    #[test]
    fn test_advance_continues_mid_sequence() {
        let mut sequence = CaptureSequence::new(vec!["Front".into(), "Rear".into()]);
        assert!(advance(&mut sequence, Some(photo("Front"))));
        assert!(!advance(&mut sequence, Some(photo("Rear"))));
        assert_eq!(sequence.photos().len(), 2);
    }

    #[test]
    fn test_list_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["02_rear.PNG", "01_front.jpg", "notes.txt", "03_vin.jpeg"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let names: Vec<String> = list_images(dir.path())
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .collect();
        assert_eq!(names, vec!["01_front.jpg", "02_rear.PNG", "03_vin.jpeg"]);
    }

    #[test]
    fn test_list_images_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_images(&dir.path().join("missing")).is_err());
    }
}
