use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::permissions::Capability;

/// Opaque handle to a captured asset; the bytes never enter this core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaUri(pub String);

impl MediaUri {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("{capability} permission denied")]
    PermissionDenied { capability: Capability },

    #[error("capture failed: {reason}")]
    CaptureFailed { reason: String },

    #[error("save to library failed: {reason}")]
    SaveFailed { reason: String },

    #[error("capture cancelled")]
    Cancelled,
}

/// Photo/video capture through the device camera pipeline.
#[async_trait]
pub trait MediaCapture: Send + Sync {
    async fn capture_photo(&self) -> Result<MediaUri, MediaError>;
    /// Record a clip of at most `max_duration`.
    async fn record_clip(&self, max_duration: Duration) -> Result<MediaUri, MediaError>;
}

/// The device media library; assets land in a fixed album.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    async fn save_to_album(&self, uri: &MediaUri, album: &str) -> Result<MediaUri, MediaError>;
}
