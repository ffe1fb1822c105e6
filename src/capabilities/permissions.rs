use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Device capabilities the app may need to ask the OS for. Partial grants
/// are possible, so every check is per-capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Camera,
    Microphone,
    Location,
    Contacts,
    MediaLibrary,
}

impl Capability {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Microphone => "microphone",
            Self::Location => "location",
            Self::Contacts => "contacts",
            Self::MediaLibrary => "media library",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
    DeniedPermanently,
    NotDetermined,
}

impl PermissionStatus {
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }

    #[must_use]
    pub const fn can_request(self) -> bool {
        matches!(self, Self::NotDetermined | Self::Denied)
    }

    #[must_use]
    pub const fn should_show_settings_prompt(self) -> bool {
        matches!(self, Self::DeniedPermanently)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PermissionError {
    #[error("{capability} permission denied")]
    Denied { capability: Capability },

    #[error("permission check failed: {reason}")]
    CheckFailed { reason: String },
}

impl PermissionError {
    /// Which capability failed, for a targeted user-facing message.
    #[must_use]
    pub const fn capability(&self) -> Option<Capability> {
        match self {
            Self::Denied { capability } => Some(*capability),
            Self::CheckFailed { .. } => None,
        }
    }
}

/// Shell-implemented permission access. `check` is passive; `request`
/// surfaces the OS prompt.
#[async_trait]
pub trait Permissions: Send + Sync {
    async fn check(&self, capability: Capability) -> Result<PermissionStatus, PermissionError>;
    async fn request(&self, capability: Capability) -> Result<PermissionStatus, PermissionError>;
}

/// Session-scoped gate over [`Permissions`].
///
/// Caches the outcome per capability so the OS prompt fires at most once
/// per capability per app session; [`PermissionGate::refresh`] drops a
/// cached entry when the user revisits the OS settings screen.
pub struct PermissionGate {
    provider: Arc<dyn Permissions>,
    cache: Mutex<HashMap<Capability, PermissionStatus>>,
}

impl PermissionGate {
    #[must_use]
    pub fn new(provider: Arc<dyn Permissions>) -> Self {
        Self {
            provider,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the status of one capability, prompting at most once.
    pub async fn status(&self, capability: Capability) -> Result<PermissionStatus, PermissionError> {
        let mut cache = self.cache.lock().await;
        if let Some(status) = cache.get(&capability) {
            return Ok(*status);
        }

        let mut status = self.provider.check(capability).await?;
        if !status.is_granted() && status.can_request() {
            debug!(capability = capability.name(), "requesting permission");
            status = self.provider.request(capability).await?;
        }

        cache.insert(capability, status);
        Ok(status)
    }

    /// Verify every required capability independently. On the first denial
    /// the failing capability is named so the caller can show a targeted
    /// message instead of a generic failure.
    pub async fn ensure(&self, required: &[Capability]) -> Result<(), PermissionError> {
        for &capability in required {
            let status = self.status(capability).await?;
            if !status.is_granted() {
                return Err(PermissionError::Denied { capability });
            }
        }
        Ok(())
    }

    /// Forget a cached outcome, e.g. after the user returned from settings.
    pub async fn refresh(&self, capability: Capability) {
        self.cache.lock().await.remove(&capability);
    }
}
