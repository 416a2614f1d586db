//! Video source interfaces.
//!
//! The capture session never talks to a camera directly. A
//! `VideoSourceProvider` hands out a `VideoSource`, and the session wraps it in
//! a `SourceGuard` that releases it exactly once, however the session ends.
//!
//! `FramePublisher` is the in-process implementation: whoever owns the camera
//! (or a file replay) publishes frames into a latest-value slot, and a slow
//! consumer simply skips to the newest one.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{CaptureError, CaptureResult};

/// One full-resolution frame from the source.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Monotonic per-publisher sequence number, starting at 1.
    pub seq: u64,
    pub image: Arc<RgbImage>,
    pub published_at: Instant,
}

/// A live video stream.
///
/// `Sync` because the session holds its source across awaits on a spawned task.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Wait for a frame newer than the last one returned.
    ///
    /// Must be cancel-safe: the session polls it inside `select!`.
    async fn next_frame(&mut self) -> CaptureResult<VideoFrame>;

    /// Full-resolution copy of the current frame.
    async fn snapshot(&mut self) -> CaptureResult<RgbImage>;

    /// Stop the stream. Called once by `SourceGuard`.
    fn release(&mut self);
}

/// Acquires video sources, e.g. by asking for camera permission.
#[async_trait]
pub trait VideoSourceProvider: Send + Sync {
    async fn acquire(&self) -> CaptureResult<Box<dyn VideoSource>>;
}

/// Owns an acquired source and releases it on drop.
pub struct SourceGuard {
    source: Option<Box<dyn VideoSource>>,
}

impl SourceGuard {
    pub fn new(source: Box<dyn VideoSource>) -> Self {
        Self {
            source: Some(source),
        }
    }

    pub async fn next_frame(&mut self) -> CaptureResult<VideoFrame> {
        match self.source.as_mut() {
            Some(source) => source.next_frame().await,
            None => Err(CaptureError::SourceClosed),
        }
    }

    pub async fn snapshot(&mut self) -> CaptureResult<RgbImage> {
        match self.source.as_mut() {
            Some(source) => source.snapshot().await,
            None => Err(CaptureError::SourceClosed),
        }
    }

    /// Release now instead of waiting for drop.
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceGuard")
            .field("held", &self.source.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct PublisherShared {
    tx: watch::Sender<Option<VideoFrame>>,
    seq: AtomicU64,
    available: AtomicBool,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// Producer side of an in-process video source.
///
/// Cloning shares the same stream. The publisher also acts as the
/// `VideoSourceProvider` for the session.
#[derive(Debug, Clone)]
pub struct FramePublisher {
    shared: Arc<PublisherShared>,
}

impl Default for FramePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl FramePublisher {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            shared: Arc::new(PublisherShared {
                tx,
                seq: AtomicU64::new(0),
                available: AtomicBool::new(true),
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }),
        }
    }

    /// Replace the current frame. Returns its sequence number.
    pub fn publish(&self, image: RgbImage) -> u64 {
        let seq = self.shared.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.tx.send_replace(Some(VideoFrame {
            seq,
            image: Arc::new(image),
            published_at: Instant::now(),
        }));
        seq
    }

    /// Simulate the camera being denied or unplugged for new acquisitions.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    pub fn acquire_count(&self) -> usize {
        self.shared.acquired.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.shared.released.load(Ordering::SeqCst)
    }

    /// Sources acquired and not yet released.
    pub fn active_sources(&self) -> usize {
        self.acquire_count() - self.release_count()
    }
}

#[async_trait]
impl VideoSourceProvider for FramePublisher {
    async fn acquire(&self) -> CaptureResult<Box<dyn VideoSource>> {
        if !self.shared.available.load(Ordering::SeqCst) {
            return Err(CaptureError::source_unavailable("Camera not available"));
        }
        self.shared.acquired.fetch_add(1, Ordering::SeqCst);
        debug!(active = self.active_sources(), "Channel video source acquired");
        Ok(Box::new(ChannelVideoSource {
            rx: self.shared.tx.subscribe(),
            last_seq: 0,
            released: false,
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Consumer side of a `FramePublisher`.
pub struct ChannelVideoSource {
    rx: watch::Receiver<Option<VideoFrame>>,
    last_seq: u64,
    released: bool,
    shared: Arc<PublisherShared>,
}

#[async_trait]
impl VideoSource for ChannelVideoSource {
    async fn next_frame(&mut self) -> CaptureResult<VideoFrame> {
        loop {
            if self.released {
                return Err(CaptureError::SourceClosed);
            }
            let latest = self.rx.borrow_and_update().clone();
            if let Some(frame) = latest {
                if frame.seq > self.last_seq {
                    self.last_seq = frame.seq;
                    return Ok(frame);
                }
            }
            self.rx
                .changed()
                .await
                .map_err(|_| CaptureError::SourceClosed)?;
        }
    }

    async fn snapshot(&mut self) -> CaptureResult<RgbImage> {
        if self.released {
            return Err(CaptureError::SourceClosed);
        }
        let current = self.rx.borrow().clone();
        current
            .map(|frame| frame.image.as_ref().clone())
            .ok_or_else(|| CaptureError::source_unavailable("No frame published yet"))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.shared.released.fetch_add(1, Ordering::SeqCst);
        debug!("Channel video source released");
    }
}

impl Drop for ChannelVideoSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(v: u8) -> RgbImage {
        RgbImage::from_pixel(8, 6, Rgb([v, v, v]))
    }

    #[tokio::test]
    async fn test_slow_consumer_sees_only_latest() {
        let publisher = FramePublisher::new();
        let mut source = publisher.acquire().await.unwrap();

        publisher.publish(frame(1));
        publisher.publish(frame(2));
        let seq = publisher.publish(frame(3));

        let latest = source.next_frame().await.unwrap();
        assert_eq!(latest.seq, seq);
        assert_eq!(latest.image.get_pixel(0, 0), &Rgb([3, 3, 3]));

        let snapshot = source.snapshot().await.unwrap();
        assert_eq!(snapshot.dimensions(), (8, 6));
    }

    #[test]
    fn test_next_frame_pends_until_published() {
        let publisher = FramePublisher::new();
        let mut source = tokio_test::block_on(publisher.acquire()).unwrap();

        let mut next = tokio_test::task::spawn(source.next_frame());
        tokio_test::assert_pending!(next.poll());

        publisher.publish(frame(7));
        assert!(next.is_woken());
        let frame = tokio_test::assert_ready_ok!(next.poll());
        assert_eq!(frame.seq, 1);
    }

    #[tokio::test]
    async fn test_frame_published_before_acquire_is_delivered() {
        let publisher = FramePublisher::new();
        publisher.publish(frame(9));
        let mut source = publisher.acquire().await.unwrap();
        assert_eq!(source.next_frame().await.unwrap().seq, 1);
    }

    #[tokio::test]
    async fn test_snapshot_without_frames_fails() {
        let publisher = FramePublisher::new();
        let mut source = publisher.acquire().await.unwrap();
        assert!(matches!(
            source.snapshot().await,
            Err(CaptureError::SourceUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_guard_releases_once() {
        let publisher = FramePublisher::new();
        {
            let mut guard = SourceGuard::new(publisher.acquire().await.unwrap());
            assert_eq!(publisher.active_sources(), 1);
            guard.release();
            guard.release();
            assert!(guard.next_frame().await.is_err());
        }
        assert_eq!(publisher.acquire_count(), 1);
        assert_eq!(publisher.release_count(), 1);

        drop(SourceGuard::new(publisher.acquire().await.unwrap()));
        assert_eq!(publisher.release_count(), 2);
        assert_eq!(publisher.active_sources(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_provider() {
        let publisher = FramePublisher::new();
        publisher.set_available(false);
        assert!(matches!(
            publisher.acquire().await,
            Err(CaptureError::SourceUnavailable { .. })
        ));
        assert_eq!(publisher.acquire_count(), 0);
        assert_eq!(publisher.release_count(), 0);
    }
}
