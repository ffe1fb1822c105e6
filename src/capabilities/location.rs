use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::model::LocationFix;
use crate::{LIVE_DISTANCE_INTERVAL_M, LIVE_TIME_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Accuracy {
    Balanced,
    #[default]
    High,
    BestForNavigation,
}

/// Rate bounds for a live subscription: a fix is delivered no more often
/// than `time_interval` and only after moving `distance_interval_m`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    pub accuracy: Accuracy,
    pub time_interval: Duration,
    pub distance_interval_m: f64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::BestForNavigation,
            time_interval: LIVE_TIME_INTERVAL,
            distance_interval_m: LIVE_DISTANCE_INTERVAL_M,
        }
    }
}

impl WatchConfig {
    #[must_use]
    pub fn validated(mut self) -> Self {
        if self.time_interval < Duration::from_secs(1) {
            self.time_interval = Duration::from_secs(1);
        }
        if !self.distance_interval_m.is_finite() || self.distance_interval_m < 0.0 {
            self.distance_interval_m = 0.0;
        }
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location unavailable: {reason}")]
    Unavailable { reason: String },

    /// The platform returned a reading with absent or non-finite
    /// coordinates. Kept distinct so callers never format a broken link.
    #[error("malformed location fix: {reason}")]
    MalformedFix { reason: String },
}

impl LocationError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// One best-effort reading at the requested accuracy.
    async fn current_fix(&self, accuracy: Accuracy) -> Result<LocationFix, LocationError>;

    /// Open a live subscription delivering fixes at the configured bounds.
    /// The returned stream owns the platform watcher; the provider must
    /// release it when the stream's close signal fires.
    async fn watch(&self, config: WatchConfig) -> Result<LocationStream, LocationError>;
}

/// Handle to an open location subscription.
///
/// Closing is not optional: `close` signals the provider to release the
/// platform watcher, and `Drop` does the same, so a dismissed owner cannot
/// leak the subscription.
#[derive(Debug)]
pub struct LocationStream {
    fixes: mpsc::Receiver<LocationFix>,
    close_tx: watch::Sender<bool>,
}

impl LocationStream {
    /// Provider-side constructor. The returned [`watch::Receiver`] flips to
    /// `true` (or errors out on drop) when the consumer is done; the
    /// provider stops feeding and releases the platform watcher then.
    #[must_use]
    pub fn new(fixes: mpsc::Receiver<LocationFix>) -> (Self, watch::Receiver<bool>) {
        let (close_tx, close_rx) = watch::channel(false);
        (Self { fixes, close_tx }, close_rx)
    }

    /// Next delivered fix; `None` once the subscription has ended.
    pub async fn next_fix(&mut self) -> Option<LocationFix> {
        self.fixes.recv().await
    }

    pub fn close(&mut self) {
        let _ = self.close_tx.send(true);
        self.fixes.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.close_tx.borrow()
    }
}

impl Drop for LocationStream {
    fn drop(&mut self) {
        self.close();
    }
}
