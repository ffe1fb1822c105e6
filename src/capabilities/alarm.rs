use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AlarmError {
    #[error("siren failed to load: {reason}")]
    SirenLoadFailed { reason: String },

    #[error("siren playback failed: {reason}")]
    PlaybackFailed { reason: String },

    #[error("torch not available on this device")]
    TorchUnavailable,

    #[error("haptics not available on this device")]
    HapticsUnavailable,
}

/// Looped siren playback. `stop` must tolerate being called when nothing is
/// playing; releasing an already-released sound is not an error.
#[async_trait]
pub trait Siren: Send + Sync {
    async fn start(&self) -> Result<(), AlarmError>;
    async fn stop(&self) -> Result<(), AlarmError>;
}

/// The camera torch, toggled by the strobe loop.
#[async_trait]
pub trait Torch: Send + Sync {
    async fn set_enabled(&self, on: bool) -> Result<(), AlarmError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VibrationPattern {
    /// Alternating wait/vibrate segments in milliseconds.
    pub segments_ms: Vec<u64>,
    pub repeat: bool,
}

impl VibrationPattern {
    /// The alarm pattern: half-second pulses, repeating until cancelled.
    #[must_use]
    pub fn alarm() -> Self {
        Self {
            segments_ms: vec![500, 500, 500, 500],
            repeat: true,
        }
    }

    #[must_use]
    pub fn single(duration_ms: u64) -> Self {
        Self {
            segments_ms: vec![0, duration_ms],
            repeat: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackKind {
    Warning,
    Error,
    Success,
}

#[async_trait]
pub trait Haptics: Send + Sync {
    async fn vibrate(&self, pattern: &VibrationPattern) -> Result<(), AlarmError>;
    async fn cancel_vibration(&self) -> Result<(), AlarmError>;
    /// One-shot haptic notification feedback.
    async fn notify(&self, kind: FeedbackKind) -> Result<(), AlarmError>;
}
