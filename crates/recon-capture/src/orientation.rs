//! Device orientation feed.
//!
//! Roll readings arrive from whatever owns the motion sensor. The session holds
//! an `OrientationSubscription`; dropping it unsubscribes.

use tokio::sync::watch;

/// Producer of roll readings, in degrees.
#[derive(Debug)]
pub struct OrientationFeed {
    tx: watch::Sender<Option<f64>>,
}

impl Default for OrientationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl OrientationFeed {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn publish_roll(&self, roll_degrees: f64) {
        self.tx.send_replace(Some(roll_degrees));
    }

    /// The sensor stopped reporting.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub fn subscribe(&self) -> OrientationSubscription {
        OrientationSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Latest-value view of an `OrientationFeed`.
#[derive(Debug, Clone)]
pub struct OrientationSubscription {
    rx: watch::Receiver<Option<f64>>,
}

impl OrientationSubscription {
    /// A subscription that never reports, for devices without a motion sensor.
    pub fn detached() -> Self {
        let (_, rx) = watch::channel(None);
        Self { rx }
    }

    pub fn roll_degrees(&self) -> Option<f64> {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_reading_wins() {
        let feed = OrientationFeed::new();
        let sub = feed.subscribe();
        assert_eq!(sub.roll_degrees(), None);

        feed.publish_roll(3.0);
        feed.publish_roll(-9.5);
        assert_eq!(sub.roll_degrees(), Some(-9.5));

        feed.clear();
        assert_eq!(sub.roll_degrees(), None);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let feed = OrientationFeed::new();
        let sub = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);
        drop(sub);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn test_detached_reports_nothing() {
        assert_eq!(OrientationSubscription::detached().roll_degrees(), None);
    }
}
